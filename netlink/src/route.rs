// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route message encoder: turns a logical [`Route`] into RTM_NEWROUTE /
//! RTM_DELROUTE wire bytes, including multipath next-hop groups with MPLS
//! push/swap/php/pop encodings.

use routes::{
    LabelAction, MplsLabel, NextHop, Route, RouteDest, RouteKind, RouteScope, MAX_MPLS_LABEL,
};
use std::net::IpAddr;
#[allow(unused)]
use tracing::{debug, error, warn};

use crate::consts::{
    nl_align, rtn_type, AF_INET, AF_INET6, AF_MPLS, LABEL_BOS_SHIFT, LABEL_SHIFT, LABEL_SIZE_BITS,
    LWTUNNEL_ENCAP_MPLS, MPLS_IPTUNNEL_DST, NLM_F_ACK, NLM_F_CREATE, NLM_F_REPLACE, NLM_F_REQUEST,
    RTATTR_HDRLEN, RTA_DST, RTA_ENCAP, RTA_ENCAP_TYPE, RTA_GATEWAY, RTA_MULTIPATH, RTA_NEWDST,
    RTA_OIF, RTA_VIA, RTM_DELROUTE, RTM_F_NOTIFY, RTM_NEWROUTE, RT_SCOPE_UNIVERSE, RT_TABLE_MAIN,
};
use crate::errors::NetlinkError;
use crate::message::{MultipathBuffer, NetlinkMessage};

/// Pack a 20-bit MPLS label into the 32-bit big-endian wire entry, setting
/// the bottom-of-stack bit when asked. Out-of-range labels are refused.
pub fn encode_label(label: MplsLabel, bos: bool) -> Result<[u8; 4], NetlinkError> {
    if label > MAX_MPLS_LABEL {
        error!("Invalid MPLS label {label:#x}");
        return Err(NetlinkError::InvalidLabel(label));
    }
    let mut entry = label << LABEL_SHIFT;
    if bos {
        entry |= 1 << LABEL_BOS_SHIFT;
    }
    Ok(entry.to_be_bytes())
}

fn ip_octets(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(a) => a.octets().to_vec(),
        IpAddr::V6(a) => a.octets().to_vec(),
    }
}

/* RTA_VIA payload: one family octet followed by the address */
fn via_bytes(addr: &IpAddr) -> Vec<u8> {
    let mut via = Vec::with_capacity(17);
    match addr {
        IpAddr::V4(a) => {
            via.push(AF_INET);
            via.extend_from_slice(&a.octets());
        }
        IpAddr::V6(a) => {
            via.push(AF_INET6);
            via.extend_from_slice(&a.octets());
        }
    }
    via
}

/// Builder of a single kernel-bound route request.
pub struct RouteMessage {
    msg: NetlinkMessage,
}

#[allow(clippy::new_without_default)]
impl RouteMessage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            msg: NetlinkMessage::new(),
        }
    }

    /// The finished wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.msg.as_bytes()
    }

    pub fn set_sequence(&mut self, seq: u32) {
        self.msg.set_sequence(seq);
    }
    pub fn set_pid(&mut self, pid: u32) {
        self.msg.set_pid(pid);
    }

    fn init(&mut self, msg_type: u16, rt_flags: u32, route: &Route) {
        let mut flags = NLM_F_REQUEST | NLM_F_ACK;
        if msg_type != RTM_DELROUTE {
            flags |= NLM_F_CREATE;
        }
        if route.kind != RouteKind::Multicast {
            flags |= NLM_F_REPLACE;
        }
        self.msg.init(msg_type, flags);

        self.msg.set_rtm_table(RT_TABLE_MAIN);
        self.msg.set_rtm_protocol(route.protocol_id);
        self.msg.set_rtm_scope(RT_SCOPE_UNIVERSE);
        self.msg.set_rtm_type(rtn_type(route.kind));
        self.msg.set_rtm_src_len(0);
        self.msg.set_rtm_tos(0);
        self.msg.set_rtm_flags(rt_flags | route.flags.unwrap_or(0));
    }

    /// Encode an IP route add/replace.
    pub fn add_route(&mut self, route: &Route) -> Result<(), NetlinkError> {
        let RouteDest::Prefix(prefix) = route.dest else {
            error!("Address family is not AF_INET or AF_INET6");
            return Err(NetlinkError::InvalidAddressFamily);
        };
        debug!("Adding route: {}", prefix);

        self.init(RTM_NEWROUTE, RTM_F_NOTIFY, route);
        self.msg.set_rtm_family(if prefix.is_ipv4() { AF_INET } else { AF_INET6 });
        self.msg.set_rtm_dst_len(prefix.length());
        self.msg.add_attribute(RTA_DST, &prefix.address_octets())?;
        self.add_nexthops(route)
    }

    /// Encode an IP route delete: destination only, no next-hops.
    pub fn delete_route(&mut self, route: &Route) -> Result<(), NetlinkError> {
        let RouteDest::Prefix(prefix) = route.dest else {
            return Err(NetlinkError::InvalidAddressFamily);
        };
        debug!("Deleting route: {}", prefix);

        self.init(RTM_DELROUTE, RTM_F_NOTIFY, route);
        self.msg.set_rtm_family(if prefix.is_ipv4() { AF_INET } else { AF_INET6 });
        self.msg.set_rtm_dst_len(prefix.length());
        self.msg.add_attribute(RTA_DST, &prefix.address_octets())
    }

    /// Encode an MPLS label route add/replace.
    pub fn add_label_route(&mut self, route: &Route) -> Result<(), NetlinkError> {
        let RouteDest::Label(label) = route.dest else {
            return Err(NetlinkError::InvalidAddressFamily);
        };
        debug!("Adding MPLS route for label {label}");

        self.init(RTM_NEWROUTE, 0, route);
        self.msg.set_rtm_family(AF_MPLS);
        self.msg.set_rtm_dst_len(LABEL_SIZE_BITS);
        self.msg.set_rtm_flags(0);
        self.msg.add_attribute(RTA_DST, &encode_label(label, true)?)?;
        self.add_nexthops(route)
    }

    /// Encode an MPLS label route delete.
    pub fn delete_label_route(&mut self, route: &Route) -> Result<(), NetlinkError> {
        let RouteDest::Label(label) = route.dest else {
            return Err(NetlinkError::InvalidAddressFamily);
        };
        debug!("Deleting MPLS route for label {label}");

        self.init(RTM_DELROUTE, 0, route);
        self.msg.set_rtm_family(AF_MPLS);
        self.msg.set_rtm_dst_len(LABEL_SIZE_BITS);
        self.msg.set_rtm_flags(0);
        self.msg.add_attribute(RTA_DST, &encode_label(label, true)?)
    }

    /* Assemble the multipath group in the scratch buffer and copy its
    payload into the message as one RTA_MULTIPATH attribute. */
    fn add_nexthops(&mut self, route: &Route) -> Result<(), NetlinkError> {
        if route.nexthops.is_empty() {
            return Ok(());
        }
        let mut mp = MultipathBuffer::new();
        for nh in &route.nexthops {
            match &nh.label_action {
                None => add_ip_nexthop(&mut mp, nh, route)?,
                Some(LabelAction::Push(labels)) => add_push_nexthop(&mut mp, nh, labels)?,
                Some(LabelAction::Swap(_)) | Some(LabelAction::Php) => {
                    add_swap_or_php_nexthop(&mut mp, nh)?;
                }
                Some(LabelAction::PopAndLookup) => add_pop_nexthop(&mut mp, nh)?,
            }
        }
        self.msg.add_attribute(RTA_MULTIPATH, mp.payload())
    }
}

/* Plain IP next-hop: RTA_GATEWAY, unless the route is multicast or
link-scoped in which case the entry carries the interface alone. */
fn add_ip_nexthop(
    mp: &mut MultipathBuffer,
    nh: &NextHop,
    route: &Route,
) -> Result<(), NetlinkError> {
    let ifindex = nh.ifindex.ok_or(NetlinkError::NoIfIndex)?;
    let rtnh = mp.begin_nexthop(ifindex)?;

    let Some(gateway) = nh.gateway else {
        if route.kind == RouteKind::Multicast || route.scope == RouteScope::Link {
            return Ok(());
        }
        error!("Nexthop IP not provided");
        return Err(NetlinkError::NoNexthopIp);
    };
    let octets = ip_octets(&gateway);
    mp.add_sub_attribute(RTA_GATEWAY, &octets)?;
    mp.grow_rtnh(rtnh, (octets.len() + RTATTR_HDRLEN) as u16);
    Ok(())
}

/* Swap: RTA_NEWDST with the replacement label (bottom of stack), then
RTA_VIA. Php: RTA_VIA alone. */
fn add_swap_or_php_nexthop(mp: &mut MultipathBuffer, nh: &NextHop) -> Result<(), NetlinkError> {
    let ifindex = nh.ifindex.ok_or(NetlinkError::NoIfIndex)?;
    let rtnh = mp.begin_nexthop(ifindex)?;

    let prev = mp.rta_len();
    if let Some(LabelAction::Swap(label)) = &nh.label_action {
        mp.add_sub_attribute(RTA_NEWDST, &encode_label(*label, true)?)?;
    }
    mp.grow_rtnh(rtnh, (mp.rta_len() - prev) as u16);

    let Some(gateway) = nh.gateway else {
        error!("Nexthop IP not provided");
        return Err(NetlinkError::NoNexthopIp);
    };
    let via = via_bytes(&gateway);
    mp.add_sub_attribute(RTA_VIA, &via)?;
    mp.grow_rtnh(rtnh, (via.len() + RTATTR_HDRLEN) as u16);
    Ok(())
}

/* Pop-and-lookup: RTA_OIF naming the loopback interface. */
fn add_pop_nexthop(mp: &mut MultipathBuffer, nh: &NextHop) -> Result<(), NetlinkError> {
    let Some(ifindex) = nh.ifindex else {
        error!("Loopback interface index not provided for POP");
        return Err(NetlinkError::NoLoopbackIndex);
    };
    let rtnh = mp.begin_nexthop(ifindex)?;
    let oif = (ifindex as i32).to_ne_bytes();
    mp.add_sub_attribute(RTA_OIF, &oif)?;
    mp.grow_rtnh(rtnh, (oif.len() + RTATTR_HDRLEN) as u16);
    Ok(())
}

/* Push: RTA_ENCAP nesting the packed label stack, RTA_ENCAP_TYPE, then
RTA_GATEWAY. The last pushed label carries the bottom-of-stack bit. */
fn add_push_nexthop(
    mp: &mut MultipathBuffer,
    nh: &NextHop,
    labels: &[MplsLabel],
) -> Result<(), NetlinkError> {
    let ifindex = nh.ifindex.ok_or(NetlinkError::NoIfIndex)?;
    let rtnh = mp.begin_nexthop(ifindex)?;

    let prev = mp.rta_len();
    let encap = mp.add_sub_attribute(RTA_ENCAP, &[])?;

    if labels.is_empty() {
        error!("Labels not provided for PUSH action");
        return Err(NetlinkError::NoLabel);
    }
    let mut stack = Vec::with_capacity(labels.len() * 4);
    for (i, label) in labels.iter().enumerate() {
        let bos = i == labels.len() - 1;
        stack.extend_from_slice(&encode_label(*label, bos)?);
    }
    mp.add_sub_attribute(MPLS_IPTUNNEL_DST, &stack)?;
    mp.patch_attr_len(encap, (nl_align(mp.rta_len()) - prev) as u16);

    mp.add_sub_attribute(RTA_ENCAP_TYPE, &LWTUNNEL_ENCAP_MPLS.to_ne_bytes())?;
    mp.grow_rtnh(rtnh, (mp.rta_len() - prev) as u16);

    let Some(gateway) = nh.gateway else {
        error!("Nexthop IP not provided");
        return Err(NetlinkError::NoNexthopIp);
    };
    let octets = ip_octets(&gateway);
    mp.add_sub_attribute(RTA_GATEWAY, &octets)?;
    mp.grow_rtnh(rtnh, (octets.len() + RTATTR_HDRLEN) as u16);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use routes::Prefix;
    use std::str::FromStr;

    fn gw(s: &str) -> Option<IpAddr> {
        Some(IpAddr::from_str(s).expect("Bad address"))
    }

    fn u16_at(buf: &[u8], off: usize) -> u16 {
        u16::from_ne_bytes([buf[off], buf[off + 1]])
    }
    fn u32_at(buf: &[u8], off: usize) -> u32 {
        u32::from_ne_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
    }

    #[test]
    fn test_ipv4_unicast_add_is_byte_exact() {
        let prefix = Prefix::from_str("10.0.0.0/24").expect("Bad prefix");
        let route = Route::unicast(prefix, vec![NextHop::new(gw("192.0.2.1"), Some(3))]);

        let mut msg = RouteMessage::new();
        msg.add_route(&route).expect("encode");
        let b = msg.as_bytes();

        // nlmsghdr
        assert_eq!(b.len(), 56);
        assert_eq!(u32_at(b, 0), 56);
        assert_eq!(u16_at(b, 4), RTM_NEWROUTE);
        assert_eq!(
            u16_at(b, 6),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE
        );

        // rtmsg
        assert_eq!(b[16], AF_INET);
        assert_eq!(b[17], 24); /* dst_len */
        assert_eq!(b[20], RT_TABLE_MAIN);
        assert_eq!(b[21], routes::ROUTE_PROTO_ID);
        assert_eq!(b[22], RT_SCOPE_UNIVERSE);
        assert_eq!(b[23], 1); /* RTN_UNICAST */
        assert_eq!(u32_at(b, 24), RTM_F_NOTIFY);

        // RTA_DST
        assert_eq!(u16_at(b, 28), 8);
        assert_eq!(u16_at(b, 30), RTA_DST);
        assert_eq!(&b[32..36], &[10, 0, 0, 0]);

        // RTA_MULTIPATH with one rtnexthop{ifindex 3} + RTA_GATEWAY
        assert_eq!(u16_at(b, 36), 20);
        assert_eq!(u16_at(b, 38), RTA_MULTIPATH);
        assert_eq!(u16_at(b, 40), 16); /* rtnh_len */
        assert_eq!(b[42], 0); /* rtnh_flags */
        assert_eq!(b[43], 0); /* rtnh_hops */
        assert_eq!(u32_at(b, 44), 3); /* rtnh_ifindex */
        assert_eq!(u16_at(b, 48), 8);
        assert_eq!(u16_at(b, 50), RTA_GATEWAY);
        assert_eq!(&b[52..56], &[192, 0, 2, 1]);
    }

    #[test]
    fn test_mpls_push_encoding() {
        let nh = NextHop::new(gw("192.0.2.1"), Some(3))
            .with_action(LabelAction::Push(vec![200, 300]));
        let route = Route::mpls(100, vec![nh]);

        let mut msg = RouteMessage::new();
        msg.add_label_route(&route).expect("encode");
        let b = msg.as_bytes();

        // rtmsg: AF_MPLS, dst_len 20, flags zeroed
        assert_eq!(b[16], AF_MPLS);
        assert_eq!(b[17], 20);
        assert_eq!(u32_at(b, 24), 0);

        // RTA_DST: label 100, bottom of stack
        assert_eq!(u16_at(b, 28), 8);
        assert_eq!(u16_at(b, 30), RTA_DST);
        assert_eq!(&b[32..36], &((100u32 << 12) | (1 << 8)).to_be_bytes());

        // RTA_MULTIPATH: rtnh + ENCAP{IPTUNNEL_DST} + ENCAP_TYPE + GATEWAY
        assert_eq!(u16_at(b, 36), 44);
        assert_eq!(u16_at(b, 38), RTA_MULTIPATH);
        let nh_off = 40;
        assert_eq!(u16_at(b, nh_off), 40); /* rtnh_len */
        assert_eq!(u32_at(b, nh_off + 4), 3);

        // RTA_ENCAP nests the packed stack: 200 (bos=0), 300 (bos=1)
        assert_eq!(u16_at(b, nh_off + 8), 16);
        assert_eq!(u16_at(b, nh_off + 10), RTA_ENCAP);
        assert_eq!(u16_at(b, nh_off + 12), 12);
        assert_eq!(u16_at(b, nh_off + 14), MPLS_IPTUNNEL_DST);
        assert_eq!(&b[nh_off + 16..nh_off + 20], &(200u32 << 12).to_be_bytes());
        assert_eq!(
            &b[nh_off + 20..nh_off + 24],
            &((300u32 << 12) | (1 << 8)).to_be_bytes()
        );

        // RTA_ENCAP_TYPE = LWTUNNEL_ENCAP_MPLS
        assert_eq!(u16_at(b, nh_off + 24), 6);
        assert_eq!(u16_at(b, nh_off + 26), RTA_ENCAP_TYPE);
        assert_eq!(u16_at(b, nh_off + 28), LWTUNNEL_ENCAP_MPLS);

        // RTA_GATEWAY
        assert_eq!(u16_at(b, nh_off + 32), 8);
        assert_eq!(u16_at(b, nh_off + 34), RTA_GATEWAY);
        assert_eq!(&b[nh_off + 36..nh_off + 40], &[192, 0, 2, 1]);
    }

    #[test]
    fn test_mpls_php_encoding() {
        let nh = NextHop::new(gw("192.0.2.1"), Some(3)).with_action(LabelAction::Php);
        let route = Route::mpls(100, vec![nh]);

        let mut msg = RouteMessage::new();
        msg.add_label_route(&route).expect("encode");
        let b = msg.as_bytes();

        // one rtnexthop, RTA_VIA only: 1 family octet + 4 address octets
        let nh_off = 40;
        assert_eq!(u16_at(b, nh_off), 17); /* 8 + 9, unpadded */
        assert_eq!(u16_at(b, nh_off + 8), 9);
        assert_eq!(u16_at(b, nh_off + 10), RTA_VIA);
        assert_eq!(b[nh_off + 12], AF_INET);
        assert_eq!(&b[nh_off + 13..nh_off + 17], &[192, 0, 2, 1]);
        // no RTA_NEWDST anywhere in the group
        assert_eq!(u16_at(b, 38), RTA_MULTIPATH);
        assert_eq!(u16_at(b, 36), 24); /* 4 + rtnh 8 + padded via 12 */
    }

    #[test]
    fn test_mpls_swap_encoding() {
        let nh = NextHop::new(gw("2001:db8::1"), Some(7)).with_action(LabelAction::Swap(400));
        let route = Route::mpls(100, vec![nh]);

        let mut msg = RouteMessage::new();
        msg.add_label_route(&route).expect("encode");
        let b = msg.as_bytes();

        let nh_off = 40;
        // RTA_NEWDST with the swap label, bottom of stack
        assert_eq!(u16_at(b, nh_off + 8), 8);
        assert_eq!(u16_at(b, nh_off + 10), RTA_NEWDST);
        assert_eq!(
            &b[nh_off + 12..nh_off + 16],
            &((400u32 << 12) | (1 << 8)).to_be_bytes()
        );
        // RTA_VIA with a 17-byte v6 payload
        assert_eq!(u16_at(b, nh_off + 16), 21);
        assert_eq!(u16_at(b, nh_off + 18), RTA_VIA);
        assert_eq!(b[nh_off + 20], AF_INET6);
        // rtnh_len: 8 + 8 (newdst) + 21 (via, unpadded)
        assert_eq!(u16_at(b, nh_off), 37);
    }

    #[test]
    fn test_mpls_pop_encoding() {
        let nh = NextHop::new(None, Some(1)).with_action(LabelAction::PopAndLookup);
        let route = Route::mpls(100, vec![nh]);

        let mut msg = RouteMessage::new();
        msg.add_label_route(&route).expect("encode");
        let b = msg.as_bytes();

        let nh_off = 40;
        assert_eq!(u16_at(b, nh_off), 16);
        assert_eq!(u32_at(b, nh_off + 4), 1);
        assert_eq!(u16_at(b, nh_off + 8), 8);
        assert_eq!(u16_at(b, nh_off + 10), RTA_OIF);
        assert_eq!(u32_at(b, nh_off + 12), 1);
    }

    #[test]
    fn test_delete_carries_no_nexthops() {
        let prefix = Prefix::from_str("10.0.0.0/24").expect("Bad prefix");
        let route = Route::unicast(prefix, vec![NextHop::new(gw("192.0.2.1"), Some(3))]);

        let mut msg = RouteMessage::new();
        msg.delete_route(&route).expect("encode");
        let b = msg.as_bytes();

        assert_eq!(u16_at(b, 4), RTM_DELROUTE);
        // no CREATE on delete
        assert_eq!(u16_at(b, 6), NLM_F_REQUEST | NLM_F_ACK | NLM_F_REPLACE);
        // header + RTA_DST only
        assert_eq!(b.len(), 36);
    }

    #[test]
    fn test_multicast_routes_are_not_replaced() {
        let prefix = Prefix::from_str("224.0.0.0/4").expect("Bad prefix");
        let mut route = Route::unicast(prefix, vec![NextHop::new(None, Some(3))]);
        route.kind = RouteKind::Multicast;

        let mut msg = RouteMessage::new();
        msg.add_route(&route).expect("encode");
        let b = msg.as_bytes();
        assert_eq!(u16_at(b, 6), NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE);
        // gateway-less nexthop is allowed for multicast: bare rtnexthop
        assert_eq!(u16_at(b, 40), 8);
    }

    #[test]
    fn test_link_scope_allows_missing_gateway() {
        let prefix = Prefix::from_str("10.0.0.0/24").expect("Bad prefix");
        let mut route = Route::unicast(prefix, vec![NextHop::new(None, Some(3))]);
        route.scope = RouteScope::Link;
        assert!(RouteMessage::new().add_route(&route).is_ok());
    }

    #[test]
    fn test_error_paths() {
        let prefix = Prefix::from_str("10.0.0.0/24").expect("Bad prefix");

        // unicast nexthop without a gateway
        let route = Route::unicast(prefix, vec![NextHop::new(None, Some(3))]);
        assert_eq!(
            RouteMessage::new().add_route(&route),
            Err(NetlinkError::NoNexthopIp)
        );

        // MPLS destination through the IP entry point
        let route = Route::mpls(100, vec![]);
        assert_eq!(
            RouteMessage::new().add_route(&route),
            Err(NetlinkError::InvalidAddressFamily)
        );

        // POP without a loopback index
        let nh = NextHop::new(None, None).with_action(LabelAction::PopAndLookup);
        let route = Route::mpls(100, vec![nh]);
        assert_eq!(
            RouteMessage::new().add_label_route(&route),
            Err(NetlinkError::NoLoopbackIndex)
        );

        // PUSH with an empty stack
        let nh = NextHop::new(gw("192.0.2.1"), Some(3)).with_action(LabelAction::Push(vec![]));
        let route = Route::mpls(100, vec![nh]);
        assert_eq!(
            RouteMessage::new().add_label_route(&route),
            Err(NetlinkError::NoLabel)
        );

        // out-of-range label is refused, not clamped
        assert_eq!(
            encode_label(1 << 20, true),
            Err(NetlinkError::InvalidLabel(1 << 20))
        );
    }

    #[test]
    fn test_oversized_route_exhausts_buffer() {
        let prefix = Prefix::from_str("10.0.0.0/24").expect("Bad prefix");
        let hops: Vec<NextHop> = (0..300)
            .map(|i| NextHop::new(gw("192.0.2.1"), Some(i)))
            .collect();
        let route = Route::unicast(prefix, hops);
        assert_eq!(
            RouteMessage::new().add_route(&route),
            Err(NetlinkError::MessageBufferExhausted)
        );
    }
}
