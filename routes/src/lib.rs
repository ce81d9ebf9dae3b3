// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Logical route model shared by the fib reconciler and the netlink encoder.

mod db;
mod display;
mod errors;
mod msg;
mod nexthop;
mod perf;
mod prefix;
mod route;

// re-exports
pub use db::{InterfaceDatabase, InterfaceInfo, RouteDatabase, RouteDatabaseDelta, find_delta};
pub use errors::RouteError;
pub use msg::{AgentRequest, AgentResponse, FIB_CLIENT_ID};
pub use nexthop::{LabelAction, MplsLabel, NextHop, best_nexthops, MAX_MPLS_LABEL};
pub use perf::{PerfEvent, PerfEvents, add_perf_event, total_duration_ms};
pub use prefix::Prefix;
pub use route::{
    AddressFamily, MplsRoute, Route, RouteDest, RouteKind, RouteScope, UnicastRoute, ROUTE_PROTO_ID,
};
