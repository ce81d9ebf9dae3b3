// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route and interface snapshot databases and the snapshot delta engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::nexthop::{MplsLabel, NextHop, best_nexthops};
use crate::perf::PerfEvents;
use crate::prefix::Prefix;
use crate::route::{MplsRoute, UnicastRoute};

/// Status of one interface as reported by the link monitor.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub is_up: bool,
    pub ifindex: u32,
}

/// Full interface snapshot published by the link monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceDatabase {
    pub node_name: String,
    pub interfaces: BTreeMap<String, InterfaceInfo>,
    #[serde(default)]
    pub perf_events: Option<PerfEvents>,
}

/// Full route snapshot published by the decision module, and the shape the
/// reconciler keeps in memory. Unicast routes key by destination prefix,
/// MPLS routes by incoming label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteDatabase {
    pub node_name: String,
    pub unicast: BTreeMap<Prefix, UnicastRoute>,
    pub mpls: BTreeMap<MplsLabel, MplsRoute>,
    #[serde(default)]
    pub perf_events: Option<PerfEvents>,
}

impl RouteDatabase {
    #[must_use]
    pub fn new(node_name: &str) -> Self {
        Self {
            node_name: node_name.to_owned(),
            ..Default::default()
        }
    }

    pub fn add_unicast(&mut self, route: UnicastRoute) {
        self.unicast.insert(route.dest, route);
    }

    pub fn add_mpls(&mut self, route: MplsRoute) {
        self.mpls.insert(route.label, route);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.unicast.len() + self.mpls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unicast.is_empty() && self.mpls.is_empty()
    }

    /// Split off the entries marked as not-to-install. The returned database
    /// is kept for introspection only; `self` retains the installable set.
    #[must_use]
    pub fn partition_uninstallable(&mut self) -> RouteDatabase {
        let mut out = RouteDatabase::new(&self.node_name);
        self.unicast.retain(|dest, route| {
            if route.do_not_install {
                out.unicast.insert(*dest, route.clone());
                false
            } else {
                true
            }
        });
        out
    }

    /// Drop next-hops that egress over any of the given interfaces and
    /// report what changed. A route whose selected best set shrinks or
    /// shifts produces an update carrying the new best set; a route left
    /// with no next-hops at all produces a delete and is removed. Next-hops
    /// without an interface name (MPLS pop-and-lookup) are always retained.
    pub fn filter_affected_interfaces(&mut self, affected: &HashSet<String>) -> RouteDatabaseDelta {
        let mut delta = RouteDatabaseDelta::default();
        if affected.is_empty() {
            return delta;
        }

        let survives = |nh: &NextHop| match &nh.ifname {
            Some(name) => !affected.contains(name),
            None => true,
        };

        self.unicast.retain(|dest, route| {
            let valid: Vec<NextHop> = route.nexthops.iter().filter(|nh| survives(nh)).cloned().collect();
            let prev_best = best_nexthops(&route.nexthops);
            let valid_best = best_nexthops(&valid);
            route.nexthops = valid;
            if !valid_best.is_empty() && valid_best != prev_best {
                delta
                    .unicast_to_update
                    .push(UnicastRoute::new(*dest, valid_best));
            }
            if route.nexthops.is_empty() {
                delta.unicast_to_delete.push(*dest);
                false
            } else {
                true
            }
        });

        self.mpls.retain(|label, route| {
            let valid: Vec<NextHop> = route.nexthops.iter().filter(|nh| survives(nh)).cloned().collect();
            let prev_best = best_nexthops(&route.nexthops);
            let valid_best = best_nexthops(&valid);
            route.nexthops = valid;
            if !valid_best.is_empty() && valid_best != prev_best {
                delta.mpls_to_update.push(MplsRoute::new(*label, valid_best));
            }
            if route.nexthops.is_empty() {
                delta.mpls_to_delete.push(*label);
                false
            } else {
                true
            }
        });

        delta
    }

    /// Apply a snapshot delta to this database. Updates replace whole
    /// entries, deletes remove them.
    pub fn apply_delta(&mut self, delta: &RouteDatabaseDelta) {
        for route in &delta.unicast_to_update {
            self.unicast.insert(route.dest, route.clone());
        }
        for dest in &delta.unicast_to_delete {
            self.unicast.remove(dest);
        }
        for route in &delta.mpls_to_update {
            self.mpls.insert(route.label, route.clone());
        }
        for label in &delta.mpls_to_delete {
            self.mpls.remove(label);
        }
    }
}

/// The add/update/delete sets that transform one snapshot into the next.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RouteDatabaseDelta {
    pub unicast_to_update: Vec<UnicastRoute>,
    pub unicast_to_delete: Vec<Prefix>,
    pub mpls_to_update: Vec<MplsRoute>,
    pub mpls_to_delete: Vec<MplsLabel>,
}

impl RouteDatabaseDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unicast_to_update.is_empty()
            && self.unicast_to_delete.is_empty()
            && self.mpls_to_update.is_empty()
            && self.mpls_to_delete.is_empty()
    }
}

/// Compute the delta that turns `old_db` into `new_db`. A route lands in the
/// update set when it is new or when its selected best next-hops changed;
/// the update entries carry the full next-hop set (the agent-facing side
/// trims them to best). Destinations absent from the new snapshot land in
/// the delete set.
#[must_use]
pub fn find_delta(new_db: &RouteDatabase, old_db: &RouteDatabase) -> RouteDatabaseDelta {
    let mut delta = RouteDatabaseDelta::default();

    for (dest, route) in &new_db.unicast {
        match old_db.unicast.get(dest) {
            None => delta.unicast_to_update.push(route.clone()),
            Some(prev) => {
                if best_nexthops(&route.nexthops) != best_nexthops(&prev.nexthops) {
                    delta.unicast_to_update.push(route.clone());
                }
            }
        }
    }
    for dest in old_db.unicast.keys() {
        if !new_db.unicast.contains_key(dest) {
            delta.unicast_to_delete.push(*dest);
        }
    }

    for (label, route) in &new_db.mpls {
        match old_db.mpls.get(label) {
            None => delta.mpls_to_update.push(route.clone()),
            Some(prev) => {
                if best_nexthops(&route.nexthops) != best_nexthops(&prev.nexthops) {
                    delta.mpls_to_update.push(route.clone());
                }
            }
        }
    }
    for label in old_db.mpls.keys() {
        if !new_db.mpls.contains_key(label) {
            delta.mpls_to_delete.push(*label);
        }
    }

    delta
}
