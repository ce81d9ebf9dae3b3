// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Decode route netlink messages back into logical routes. Used by tests to
//! close the encode/parse round trip and by the socket path to read route
//! notifications.

use routes::{LabelAction, MplsLabel, NextHop, Prefix, Route, RouteDest, RouteScope};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::consts::{
    nl_align, route_kind, AF_INET, AF_INET6, AF_MPLS, LABEL_SHIFT, LWTUNNEL_ENCAP_MPLS,
    MPLS_IPTUNNEL_DST, NLMSG_HDRLEN, RTATTR_HDRLEN, RTA_DST, RTA_ENCAP, RTA_ENCAP_TYPE,
    RTA_GATEWAY, RTA_MULTIPATH, RTA_NEWDST, RTA_OIF, RTA_VIA, RTMSG_LEN, RTM_F_NOTIFY, RTNH_LEN,
};
use crate::errors::NetlinkError;

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_ne_bytes([buf[off], buf[off + 1]])
}
fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn decode_label(entry: &[u8]) -> MplsLabel {
    u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) >> LABEL_SHIFT
}

fn parse_address(data: &[u8]) -> Result<IpAddr, NetlinkError> {
    match data.len() {
        4 => {
            let octets: [u8; 4] = data.try_into().map_err(|_| NetlinkError::Malformed("address"))?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = data.try_into().map_err(|_| NetlinkError::Malformed("address"))?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(NetlinkError::Malformed("unexpected address length")),
    }
}

fn parse_dest(family: u8, dst_len: u8, data: &[u8]) -> Result<RouteDest, NetlinkError> {
    match family {
        AF_INET | AF_INET6 => {
            let addr = parse_address(data)?;
            let prefix = Prefix::new(addr, dst_len)
                .map_err(|_| NetlinkError::Malformed("bad prefix length"))?;
            Ok(RouteDest::Prefix(prefix))
        }
        AF_MPLS => {
            if data.len() < 4 {
                return Err(NetlinkError::Malformed("short label entry"));
            }
            Ok(RouteDest::Label(decode_label(data)))
        }
        _ => Err(NetlinkError::InvalidAddressFamily),
    }
}

/* Per-entry attribute soup; the shape of what was collected decides the
label action. */
#[derive(Default)]
struct NexthopAttrs {
    gateway: Option<IpAddr>,
    via: Option<IpAddr>,
    newdst: Option<MplsLabel>,
    push: Option<Vec<MplsLabel>>,
    oif: bool,
}

fn parse_encap(data: &[u8]) -> Result<Vec<MplsLabel>, NetlinkError> {
    let mut labels = Vec::new();
    let mut off = 0;
    while off + RTATTR_HDRLEN <= data.len() {
        let attr_len = u16_at(data, off) as usize;
        if attr_len < RTATTR_HDRLEN || off + attr_len > data.len() {
            return Err(NetlinkError::Malformed("bad encap attribute"));
        }
        let attr_type = u16_at(data, off + 2);
        let payload = &data[off + RTATTR_HDRLEN..off + attr_len];
        if attr_type == MPLS_IPTUNNEL_DST {
            let mut entry = 0;
            while entry + 4 <= payload.len() {
                labels.push(decode_label(&payload[entry..entry + 4]));
                entry += 4;
            }
        }
        off += nl_align(attr_len);
    }
    Ok(labels)
}

fn parse_multipath(data: &[u8]) -> Result<Vec<NextHop>, NetlinkError> {
    let mut nexthops = Vec::new();
    let mut off = 0;
    while off + RTNH_LEN <= data.len() {
        let rtnh_len = u16_at(data, off) as usize;
        if rtnh_len < RTNH_LEN || off + rtnh_len > data.len() {
            return Err(NetlinkError::Malformed("bad rtnexthop length"));
        }
        let ifindex = u32_at(data, off + 4);

        let mut attrs = NexthopAttrs::default();
        let mut sub = off + RTNH_LEN;
        let end = off + rtnh_len;
        while sub + RTATTR_HDRLEN <= end {
            let attr_len = u16_at(data, sub) as usize;
            if attr_len < RTATTR_HDRLEN || sub + attr_len > end {
                return Err(NetlinkError::Malformed("bad nexthop attribute"));
            }
            let attr_type = u16_at(data, sub + 2);
            let payload = &data[sub + RTATTR_HDRLEN..sub + attr_len];
            match attr_type {
                RTA_GATEWAY => attrs.gateway = Some(parse_address(payload)?),
                RTA_VIA => {
                    if payload.len() < 5 {
                        return Err(NetlinkError::Malformed("short via"));
                    }
                    attrs.via = Some(parse_address(&payload[1..])?);
                }
                RTA_NEWDST => {
                    if payload.len() < 4 {
                        return Err(NetlinkError::Malformed("short newdst"));
                    }
                    attrs.newdst = Some(decode_label(payload));
                }
                RTA_ENCAP => attrs.push = Some(parse_encap(payload)?),
                RTA_ENCAP_TYPE => {
                    if payload.len() < 2 || u16_at(payload, 0) != LWTUNNEL_ENCAP_MPLS {
                        return Err(NetlinkError::UnknownLabelAction);
                    }
                }
                RTA_OIF => attrs.oif = true,
                _ => {}
            }
            sub += nl_align(attr_len);
        }

        let label_action = if let Some(labels) = attrs.push {
            Some(LabelAction::Push(labels))
        } else if let Some(label) = attrs.newdst {
            Some(LabelAction::Swap(label))
        } else if attrs.via.is_some() {
            Some(LabelAction::Php)
        } else if attrs.oif {
            Some(LabelAction::PopAndLookup)
        } else {
            None
        };

        nexthops.push(NextHop {
            gateway: attrs.gateway.or(attrs.via),
            ifindex: Some(ifindex),
            ifname: None,
            weight: 0,
            label_action,
        });
        off += nl_align(rtnh_len);
    }
    Ok(nexthops)
}

/// Decode a route message built by [`crate::RouteMessage`] (or received from
/// the kernel) into its message type and logical route.
pub fn parse_route_message(buf: &[u8]) -> Result<(u16, Route), NetlinkError> {
    if buf.len() < NLMSG_HDRLEN + RTMSG_LEN {
        return Err(NetlinkError::Malformed("short message"));
    }
    let nlmsg_len = u32_at(buf, 0) as usize;
    if nlmsg_len < NLMSG_HDRLEN + RTMSG_LEN || nlmsg_len > buf.len() {
        return Err(NetlinkError::Malformed("bad message length"));
    }
    let msg_type = u16_at(buf, 4);

    let family = buf[NLMSG_HDRLEN];
    let dst_len = buf[NLMSG_HDRLEN + 1];
    let protocol_id = buf[NLMSG_HDRLEN + 5];
    let rtm_type = buf[NLMSG_HDRLEN + 7];
    let rtm_flags = u32_at(buf, NLMSG_HDRLEN + 8);

    let mut dest = None;
    let mut nexthops = Vec::new();
    let mut off = NLMSG_HDRLEN + RTMSG_LEN;
    while off + RTATTR_HDRLEN <= nlmsg_len {
        let attr_len = u16_at(buf, off) as usize;
        if attr_len < RTATTR_HDRLEN || off + attr_len > nlmsg_len {
            return Err(NetlinkError::Malformed("bad attribute length"));
        }
        let attr_type = u16_at(buf, off + 2);
        let payload = &buf[off + RTATTR_HDRLEN..off + attr_len];
        match attr_type {
            RTA_DST => dest = Some(parse_dest(family, dst_len, payload)?),
            RTA_MULTIPATH => nexthops = parse_multipath(payload)?,
            _ => {}
        }
        off += nl_align(attr_len);
    }

    let dest = dest.ok_or(NetlinkError::Malformed("missing destination"))?;
    let kind = route_kind(rtm_type).ok_or(NetlinkError::Malformed("unknown route type"))?;
    let flags = match rtm_flags & !RTM_F_NOTIFY {
        0 => None,
        value => Some(value),
    };

    Ok((
        msg_type,
        Route {
            dest,
            kind,
            protocol_id,
            scope: RouteScope::Universe,
            flags,
            nexthops,
        },
    ))
}
