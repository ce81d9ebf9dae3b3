// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Module that implements Display for route objects

use std::fmt::Display;

use crate::db::RouteDatabaseDelta;
use crate::nexthop::{LabelAction, NextHop};
use crate::prefix::Prefix;
use crate::route::{MplsRoute, UnicastRoute};

impl Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address(), self.length())
    }
}

impl Display for LabelAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelAction::Push(labels) => {
                write!(f, "push ")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        write!(f, "/")?;
                    }
                    write!(f, "{label}")?;
                }
                Ok(())
            }
            LabelAction::Swap(label) => write!(f, "swap {label}"),
            LabelAction::Php => write!(f, "php"),
            LabelAction::PopAndLookup => write!(f, "pop"),
        }
    }
}

impl Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(gateway) = self.gateway {
            write!(f, " via {gateway}")?;
        }
        if let Some(ifname) = &self.ifname {
            write!(f, " dev {ifname}")?;
        } else if let Some(ifindex) = self.ifindex {
            write!(f, " interface {ifindex}")?;
        }
        if self.weight != 0 {
            write!(f, " weight {}", self.weight)?;
        }
        if let Some(action) = &self.label_action {
            write!(f, " {action}")?;
        }
        Ok(())
    }
}

impl Display for UnicastRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{} next-hops]", self.dest, self.nexthops.len())?;
        for nh in &self.nexthops {
            write!(f, "{nh}")?;
        }
        Ok(())
    }
}

impl Display for MplsRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "label {} [{} next-hops]", self.label, self.nexthops.len())?;
        for nh in &self.nexthops {
            write!(f, "{nh}")?;
        }
        Ok(())
    }
}

impl Display for RouteDatabaseDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} unicast updates, {} unicast deletes, {} mpls updates, {} mpls deletes",
            self.unicast_to_update.len(),
            self.unicast_to_delete.len(),
            self.mpls_to_update.len(),
            self.mpls_to_delete.len()
        )
    }
}
