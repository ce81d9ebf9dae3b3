// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The fib reconciler: consumes route and interface snapshots, keeps the
//! in-memory route database, and programs the downstream forwarding agent
//! with incremental deltas or full syncs.

mod client;
pub mod config;
pub mod ctl;
mod errors;
mod fibio;
mod interfaces;
pub mod perf;
mod process;
mod test;

// re-exports
pub use client::{AGENT_CONN_TIMEOUT, AGENT_PROC_TIMEOUT};
pub use config::{FibConfig, FibConfigBuilder, DEFAULT_AGENT_PORT};
pub use ctl::FibCtlSender;
pub use errors::FibError;
pub use fibio::{start_fib, FibHandle, DEFAULT_DECISION_PUB_PATH, DEFAULT_LINKMON_PUB_PATH};
pub use process::FibCounters;
