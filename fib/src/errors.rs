// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FibError {
    #[error("Invalid socket path '{0}'")]
    InvalidPath(String),

    #[error("Insufficient permissions")]
    PermError,

    #[error("Internal failure: {0}")]
    Internal(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Agent transport failure: {0}")]
    AgentTransport(String),

    #[error("Agent rejected the request: {0}")]
    AgentRejected(String),
}
