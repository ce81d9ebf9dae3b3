// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Byte-exact construction of rtnetlink route messages: IPv4/IPv6 unicast
//! and MPLS label routes, with multipath next-hop groups and MPLS
//! push/swap/php/pop encodings.

pub mod consts;
mod errors;
mod message;
mod parse;
mod route;
#[cfg(target_os = "linux")]
mod sock;

// re-exports
pub use errors::NetlinkError;
pub use message::{NetlinkMessage, MAX_NL_PAYLOAD_SIZE};
pub use parse::parse_route_message;
pub use route::{encode_label, RouteMessage};
#[cfg(target_os = "linux")]
pub use sock::NetlinkSocket;
