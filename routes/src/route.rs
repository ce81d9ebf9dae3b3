// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route objects: the control-plane snapshot entries and the richer route
//! description consumed by the netlink encoder.

use serde::{Deserialize, Serialize};

use crate::nexthop::{MplsLabel, NextHop};
use crate::prefix::Prefix;

/// Protocol tag stamped on routes this agent originates.
pub const ROUTE_PROTO_ID: u8 = 99;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum AddressFamily {
    Inet,
    Inet6,
    Mpls,
}

#[derive(Debug, Default, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RouteKind {
    #[default]
    Unicast,
    Multicast,
    Broadcast,
    Anycast,
    Local,
}

#[derive(Debug, Default, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RouteScope {
    #[default]
    Universe,
    Site,
    Link,
    Host,
}

/// What a route keys on: an IP prefix, or the incoming MPLS label.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RouteDest {
    Prefix(Prefix),
    Label(MplsLabel),
}

/// Full description of a forwarding entry, the unit the netlink encoder
/// works on. Deletes carry no next-hops.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub dest: RouteDest,
    pub kind: RouteKind,
    pub protocol_id: u8,
    pub scope: RouteScope,
    pub flags: Option<u32>,
    pub nexthops: Vec<NextHop>,
}

impl Route {
    #[must_use]
    pub fn unicast(dest: Prefix, nexthops: Vec<NextHop>) -> Self {
        Self {
            dest: RouteDest::Prefix(dest),
            kind: RouteKind::Unicast,
            protocol_id: ROUTE_PROTO_ID,
            scope: RouteScope::Universe,
            flags: None,
            nexthops,
        }
    }

    #[must_use]
    pub fn mpls(label: MplsLabel, nexthops: Vec<NextHop>) -> Self {
        Self {
            dest: RouteDest::Label(label),
            kind: RouteKind::Unicast,
            protocol_id: ROUTE_PROTO_ID,
            scope: RouteScope::Universe,
            flags: None,
            nexthops,
        }
    }

    /// Address family, derived from the destination so the two can never
    /// disagree.
    #[must_use]
    pub fn family(&self) -> AddressFamily {
        match &self.dest {
            RouteDest::Prefix(p) if p.is_ipv4() => AddressFamily::Inet,
            RouteDest::Prefix(_) => AddressFamily::Inet6,
            RouteDest::Label(_) => AddressFamily::Mpls,
        }
    }
}

/// A unicast route as published by the decision module.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnicastRoute {
    pub dest: Prefix,
    pub nexthops: Vec<NextHop>,
    #[serde(default)]
    pub do_not_install: bool,
}

impl UnicastRoute {
    #[must_use]
    pub fn new(dest: Prefix, nexthops: Vec<NextHop>) -> Self {
        Self {
            dest,
            nexthops,
            do_not_install: false,
        }
    }
}

/// An MPLS route as published by the decision module, keyed by the incoming
/// top-of-stack label.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MplsRoute {
    pub label: MplsLabel,
    pub nexthops: Vec<NextHop>,
}

impl MplsRoute {
    #[must_use]
    pub fn new(label: MplsLabel, nexthops: Vec<NextHop>) -> Self {
        Self { label, nexthops }
    }
}

impl From<&UnicastRoute> for Route {
    fn from(route: &UnicastRoute) -> Self {
        Route::unicast(route.dest, route.nexthops.clone())
    }
}

impl From<&MplsRoute> for Route {
    fn from(route: &MplsRoute) -> Self {
        Route::mpls(route.label, route.nexthops.clone())
    }
}
