// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fixed-size aligned buffers for building netlink messages. The layout
//! written here is what the kernel reads: `struct nlmsghdr` + `struct rtmsg`
//! followed by a chain of 4-byte aligned `rtattr` TLVs. A separate scratch
//! buffer assembles the `RTA_MULTIPATH` next-hop group before it is copied
//! into the message as a single attribute.

use crate::consts::{nl_align, NLMSG_HDRLEN, RTATTR_HDRLEN, RTA_MULTIPATH, RTMSG_LEN, RTNH_LEN};
use crate::errors::NetlinkError;

/// Size of the static message buffer; a route that does not fit is refused.
pub const MAX_NL_PAYLOAD_SIZE: usize = 4096;

/* nlmsghdr field offsets */
const OFF_NLMSG_LEN: usize = 0;
const OFF_NLMSG_TYPE: usize = 4;
const OFF_NLMSG_FLAGS: usize = 6;
const OFF_NLMSG_SEQ: usize = 8;
const OFF_NLMSG_PID: usize = 12;

/* rtmsg field offsets, relative to buffer start */
const OFF_RTM_FAMILY: usize = NLMSG_HDRLEN;
const OFF_RTM_DST_LEN: usize = NLMSG_HDRLEN + 1;
const OFF_RTM_SRC_LEN: usize = NLMSG_HDRLEN + 2;
const OFF_RTM_TOS: usize = NLMSG_HDRLEN + 3;
const OFF_RTM_TABLE: usize = NLMSG_HDRLEN + 4;
const OFF_RTM_PROTOCOL: usize = NLMSG_HDRLEN + 5;
const OFF_RTM_SCOPE: usize = NLMSG_HDRLEN + 6;
const OFF_RTM_TYPE: usize = NLMSG_HDRLEN + 7;
const OFF_RTM_FLAGS: usize = NLMSG_HDRLEN + 8;

/// A route netlink message under construction. Field values are written
/// native-endian at their kernel struct offsets.
pub struct NetlinkMessage {
    buf: [u8; MAX_NL_PAYLOAD_SIZE],
}

#[allow(clippy::new_without_default)]
impl NetlinkMessage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_NL_PAYLOAD_SIZE],
        }
    }

    fn put_u16(&mut self, off: usize, value: u16) {
        self.buf[off..off + 2].copy_from_slice(&value.to_ne_bytes());
    }
    fn put_u32(&mut self, off: usize, value: u32) {
        self.buf[off..off + 4].copy_from_slice(&value.to_ne_bytes());
    }
    fn get_u32(&self, off: usize) -> u32 {
        u32::from_ne_bytes([
            self.buf[off],
            self.buf[off + 1],
            self.buf[off + 2],
            self.buf[off + 3],
        ])
    }

    /// Start a fresh message: header length covers nlmsghdr + rtmsg, all
    /// other fields zero until set.
    pub fn init(&mut self, msg_type: u16, flags: u16) {
        self.buf.fill(0);
        self.put_u32(OFF_NLMSG_LEN, (NLMSG_HDRLEN + RTMSG_LEN) as u32);
        self.put_u16(OFF_NLMSG_TYPE, msg_type);
        self.put_u16(OFF_NLMSG_FLAGS, flags);
    }

    #[must_use]
    pub fn nlmsg_len(&self) -> usize {
        self.get_u32(OFF_NLMSG_LEN) as usize
    }

    pub fn set_sequence(&mut self, seq: u32) {
        self.put_u32(OFF_NLMSG_SEQ, seq);
    }
    pub fn set_pid(&mut self, pid: u32) {
        self.put_u32(OFF_NLMSG_PID, pid);
    }

    pub fn set_rtm_family(&mut self, family: u8) {
        self.buf[OFF_RTM_FAMILY] = family;
    }
    pub fn set_rtm_dst_len(&mut self, dst_len: u8) {
        self.buf[OFF_RTM_DST_LEN] = dst_len;
    }
    pub fn set_rtm_src_len(&mut self, src_len: u8) {
        self.buf[OFF_RTM_SRC_LEN] = src_len;
    }
    pub fn set_rtm_tos(&mut self, tos: u8) {
        self.buf[OFF_RTM_TOS] = tos;
    }
    pub fn set_rtm_table(&mut self, table: u8) {
        self.buf[OFF_RTM_TABLE] = table;
    }
    pub fn set_rtm_protocol(&mut self, protocol: u8) {
        self.buf[OFF_RTM_PROTOCOL] = protocol;
    }
    pub fn set_rtm_scope(&mut self, scope: u8) {
        self.buf[OFF_RTM_SCOPE] = scope;
    }
    pub fn set_rtm_type(&mut self, rtm_type: u8) {
        self.buf[OFF_RTM_TYPE] = rtm_type;
    }
    pub fn set_rtm_flags(&mut self, flags: u32) {
        self.put_u32(OFF_RTM_FLAGS, flags);
    }

    /// Append a TLV attribute to the message. The attribute records its
    /// unpadded length; the message length advances by the padded size.
    pub fn add_attribute(&mut self, rta_type: u16, data: &[u8]) -> Result<(), NetlinkError> {
        let off = nl_align(self.nlmsg_len());
        let attr_len = RTATTR_HDRLEN + data.len();
        if off + nl_align(attr_len) > MAX_NL_PAYLOAD_SIZE {
            return Err(NetlinkError::MessageBufferExhausted);
        }
        self.put_u16(off, attr_len as u16);
        self.put_u16(off + 2, rta_type);
        self.buf[off + RTATTR_HDRLEN..off + attr_len].copy_from_slice(data);
        self.put_u32(OFF_NLMSG_LEN, (off + nl_align(attr_len)) as u32);
        Ok(())
    }

    /// The finished wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.nlmsg_len()]
    }
}

/// Scratch buffer holding an `RTA_MULTIPATH` container while its
/// `rtnexthop` entries are assembled. Offset 0 carries the container's own
/// rtattr header so the length bookkeeping mirrors the wire layout.
pub(crate) struct MultipathBuffer {
    buf: [u8; MAX_NL_PAYLOAD_SIZE],
}

impl MultipathBuffer {
    pub(crate) fn new() -> Self {
        let mut mp = Self {
            buf: [0u8; MAX_NL_PAYLOAD_SIZE],
        };
        mp.set_rta_len(RTATTR_HDRLEN);
        mp.buf[2..4].copy_from_slice(&RTA_MULTIPATH.to_ne_bytes());
        mp
    }

    pub(crate) fn rta_len(&self) -> usize {
        u16::from_ne_bytes([self.buf[0], self.buf[1]]) as usize
    }
    fn set_rta_len(&mut self, len: usize) {
        self.buf[0..2].copy_from_slice(&(len as u16).to_ne_bytes());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rta_len() == RTATTR_HDRLEN
    }

    /// Open a new `rtnexthop` entry and return its offset. The entry starts
    /// with only its fixed header accounted for; sub-attributes grow it.
    pub(crate) fn begin_nexthop(&mut self, ifindex: u32) -> Result<usize, NetlinkError> {
        let off = nl_align(self.rta_len());
        if off + RTNH_LEN > MAX_NL_PAYLOAD_SIZE {
            return Err(NetlinkError::MessageBufferExhausted);
        }
        self.buf[off..off + 2].copy_from_slice(&(RTNH_LEN as u16).to_ne_bytes());
        self.buf[off + 2] = 0; /* rtnh_flags */
        self.buf[off + 3] = 0; /* rtnh_hops */
        self.buf[off + 4..off + 8].copy_from_slice(&(ifindex as i32).to_ne_bytes());
        self.set_rta_len(off + RTNH_LEN);
        Ok(off)
    }

    /// Append a sub-attribute inside the container and return its offset.
    /// Grows the container length by the padded size; the enclosing
    /// `rtnexthop` length is the caller's to maintain.
    pub(crate) fn add_sub_attribute(
        &mut self,
        rta_type: u16,
        data: &[u8],
    ) -> Result<usize, NetlinkError> {
        let off = nl_align(self.rta_len());
        let attr_len = RTATTR_HDRLEN + data.len();
        if off + nl_align(attr_len) > MAX_NL_PAYLOAD_SIZE {
            return Err(NetlinkError::MessageBufferExhausted);
        }
        self.buf[off..off + 2].copy_from_slice(&(attr_len as u16).to_ne_bytes());
        self.buf[off + 2..off + 4].copy_from_slice(&rta_type.to_ne_bytes());
        self.buf[off + RTATTR_HDRLEN..off + attr_len].copy_from_slice(data);
        self.set_rta_len(off + nl_align(attr_len));
        Ok(off)
    }

    /// Rewrite the recorded length of an already-appended attribute; used to
    /// close the nested `RTA_ENCAP` container once its content is in place.
    pub(crate) fn patch_attr_len(&mut self, attr_off: usize, len: u16) {
        self.buf[attr_off..attr_off + 2].copy_from_slice(&len.to_ne_bytes());
    }

    /// Grow the length of the `rtnexthop` entry at the given offset.
    pub(crate) fn grow_rtnh(&mut self, rtnh_off: usize, delta: u16) {
        let len = u16::from_ne_bytes([self.buf[rtnh_off], self.buf[rtnh_off + 1]]);
        self.buf[rtnh_off..rtnh_off + 2].copy_from_slice(&(len + delta).to_ne_bytes());
    }

    /// Payload of the container: everything after its rtattr header.
    pub(crate) fn payload(&self) -> &[u8] {
        &self.buf[RTATTR_HDRLEN..self.rta_len()]
    }
}
