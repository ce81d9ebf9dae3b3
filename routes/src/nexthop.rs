// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Next-hop objects and best-path selection.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// MPLS labels are 20-bit values carried in 32 bits.
pub type MplsLabel = u32;

/// Largest value an MPLS label may take.
pub const MAX_MPLS_LABEL: MplsLabel = (1 << 20) - 1;

/// The label operation a next-hop performs on a packet. Push carries the
/// stack to prepend (outermost first), swap the replacement label. Php and
/// pop-and-lookup carry no label of their own.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum LabelAction {
    Push(Vec<MplsLabel>),
    Swap(MplsLabel),
    Php,
    PopAndLookup,
}

/// A single next-hop of a route. `ifname` identifies the link for
/// interface-driven filtering; pop-and-lookup next-hops carry none and are
/// never filtered out.
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct NextHop {
    pub gateway: Option<IpAddr>,
    pub ifindex: Option<u32>,
    pub ifname: Option<String>,
    pub weight: u8,
    pub label_action: Option<LabelAction>,
}

impl NextHop {
    #[must_use]
    pub fn new(gateway: Option<IpAddr>, ifindex: Option<u32>) -> Self {
        Self {
            gateway,
            ifindex,
            ..Default::default()
        }
    }
    #[must_use]
    pub fn with_ifname(mut self, ifname: &str) -> Self {
        self.ifname = Some(ifname.to_owned());
        self
    }
    #[must_use]
    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }
    #[must_use]
    pub fn with_action(mut self, action: LabelAction) -> Self {
        self.label_action = Some(action);
        self
    }

    /// Ordering key used to make best-path selection deterministic:
    /// interface index first, then the gateway octets (IPv4 mapped into the
    /// IPv6 space so both families compare consistently).
    fn sort_key(&self) -> (u32, [u8; 16]) {
        let gw = match self.gateway {
            Some(IpAddr::V4(a)) => a.to_ipv6_mapped().octets(),
            Some(IpAddr::V6(a)) => a.octets(),
            None => [0u8; 16],
        };
        (self.ifindex.unwrap_or(0), gw)
    }
}

/// Select the next-hops a route actually programs: all entries tied at the
/// maximum ECMP weight, in `(ifindex, gateway)` order. The sorted rendering
/// makes set comparison a plain `Vec` equality.
#[must_use]
pub fn best_nexthops(nexthops: &[NextHop]) -> Vec<NextHop> {
    let Some(max) = nexthops.iter().map(|nh| nh.weight).max() else {
        return Vec::new();
    };
    let mut best: Vec<NextHop> = nexthops
        .iter()
        .filter(|nh| nh.weight == max)
        .cloned()
        .collect();
    best.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    best
}
