// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Numeric constants of the rtnetlink route protocol. Values match the
//! kernel uapi headers (linux/netlink.h, linux/rtnetlink.h, linux/lwtunnel.h,
//! linux/mpls_iptunnel.h).

use routes::RouteKind;

/* message types */
pub const NLMSG_ERROR: u16 = 2;
pub const RTM_NEWROUTE: u16 = 24;
pub const RTM_DELROUTE: u16 = 25;

/* nlmsghdr flags */
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_CREATE: u16 = 0x400;

/* address families */
pub const AF_INET: u8 = 2;
pub const AF_INET6: u8 = 10;
pub const AF_MPLS: u8 = 28;

/* rtmsg fields */
pub const RT_TABLE_MAIN: u8 = 254;
pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RTN_UNICAST: u8 = 1;
pub const RTN_LOCAL: u8 = 2;
pub const RTN_BROADCAST: u8 = 3;
pub const RTN_ANYCAST: u8 = 4;
pub const RTN_MULTICAST: u8 = 5;
pub const RTM_F_NOTIFY: u32 = 0x100;

/* route attributes */
pub const RTA_DST: u16 = 1;
pub const RTA_OIF: u16 = 4;
pub const RTA_GATEWAY: u16 = 5;
pub const RTA_MULTIPATH: u16 = 9;
pub const RTA_VIA: u16 = 18;
pub const RTA_NEWDST: u16 = 19;
pub const RTA_ENCAP_TYPE: u16 = 21;
pub const RTA_ENCAP: u16 = 22;

/* MPLS encapsulation */
pub const LWTUNNEL_ENCAP_MPLS: u16 = 1;
pub const MPLS_IPTUNNEL_DST: u16 = 1;

/* fixed header sizes */
pub const NLMSG_HDRLEN: usize = 16;
pub const RTMSG_LEN: usize = 12;
pub const RTATTR_HDRLEN: usize = 4;
pub const RTNH_LEN: usize = 8;

/* MPLS label packing */
pub const LABEL_SIZE_BITS: u8 = 20;
pub const LABEL_SHIFT: u32 = 12;
pub const LABEL_BOS_SHIFT: u32 = 8;

/// Netlink attributes align on 4-byte boundaries.
#[must_use]
pub const fn nl_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Map a route kind to the kernel rtm_type value.
#[must_use]
pub fn rtn_type(kind: RouteKind) -> u8 {
    match kind {
        RouteKind::Unicast => RTN_UNICAST,
        RouteKind::Local => RTN_LOCAL,
        RouteKind::Broadcast => RTN_BROADCAST,
        RouteKind::Anycast => RTN_ANYCAST,
        RouteKind::Multicast => RTN_MULTICAST,
    }
}

/// Map a kernel rtm_type back to the route kind.
#[must_use]
pub fn route_kind(rtn: u8) -> Option<RouteKind> {
    match rtn {
        RTN_UNICAST => Some(RouteKind::Unicast),
        RTN_LOCAL => Some(RouteKind::Local),
        RTN_BROADCAST => Some(RouteKind::Broadcast),
        RTN_ANYCAST => Some(RouteKind::Anycast),
        RTN_MULTICAST => Some(RouteKind::Multicast),
        _ => None,
    }
}
