// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NetlinkError {
    #[error("Address family is not valid for this operation")]
    InvalidAddressFamily,

    #[error("Nexthop IP not provided")]
    NoNexthopIp,

    #[error("Nexthop interface index not provided")]
    NoIfIndex,

    #[error("MPLS label not provided")]
    NoLabel,

    #[error("MPLS label {0} out of range")]
    InvalidLabel(u32),

    #[error("Loopback interface index not provided for POP")]
    NoLoopbackIndex,

    #[error("Unknown label action")]
    UnknownLabelAction,

    #[error("Message does not fit in the netlink buffer")]
    MessageBufferExhausted,

    #[error("Malformed message: {0}")]
    Malformed(&'static str),

    #[error("Netlink IO failure: {0}")]
    Io(String),

    #[error("Kernel rejected the request: errno {0}")]
    KernelError(i32),
}
