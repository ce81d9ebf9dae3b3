// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid prefix length {0} for this address family")]
    InvalidPrefixLength(u8),

    #[error("Malformed prefix '{0}'")]
    MalformedPrefix(String),
}
