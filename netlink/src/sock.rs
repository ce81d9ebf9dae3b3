// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel-facing send path: a raw NETLINK_ROUTE socket that ships a
//! built route message and waits for the kernel's ACK.

use std::io;
use std::mem;
use std::os::fd::RawFd;
#[allow(unused)]
use tracing::{debug, error, warn};

use crate::consts::{NLMSG_ERROR, NLMSG_HDRLEN};
use crate::errors::NetlinkError;
use crate::route::RouteMessage;

const RECV_BUF_SIZE: usize = 4096;

/// A sequence-numbered NETLINK_ROUTE socket.
pub struct NetlinkSocket {
    fd: RawFd,
    seq: u32,
}

impl NetlinkSocket {
    pub fn new() -> Result<Self, NetlinkError> {
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW, libc::NETLINK_ROUTE) };
        if fd < 0 {
            return Err(NetlinkError::Io(io::Error::last_os_error().to_string()));
        }

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let rc = unsafe {
            libc::bind(
                fd,
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(NetlinkError::Io(err.to_string()));
        }
        Ok(Self { fd, seq: 0 })
    }

    /// Send one route message and block until the kernel acknowledges it.
    /// A negative errno in the ACK surfaces as [`NetlinkError::KernelError`].
    pub fn send_route(&mut self, msg: &mut RouteMessage) -> Result<(), NetlinkError> {
        self.seq = self.seq.wrapping_add(1);
        msg.set_sequence(self.seq);
        msg.set_pid(0);

        let bytes = msg.as_bytes();
        let mut kernel: libc::sockaddr_nl = unsafe { mem::zeroed() };
        kernel.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let rc = unsafe {
            libc::sendto(
                self.fd,
                bytes.as_ptr().cast(),
                bytes.len(),
                0,
                std::ptr::addr_of!(kernel).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(NetlinkError::Io(io::Error::last_os_error().to_string()));
        }
        self.wait_for_ack()
    }

    fn wait_for_ack(&mut self) -> Result<(), NetlinkError> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        let rc = unsafe { libc::recv(self.fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
        if rc < 0 {
            return Err(NetlinkError::Io(io::Error::last_os_error().to_string()));
        }
        let received = rc as usize;
        if received < NLMSG_HDRLEN + 4 {
            return Err(NetlinkError::Malformed("short ack"));
        }
        let msg_type = u16::from_ne_bytes([buf[4], buf[5]]);
        if msg_type != NLMSG_ERROR {
            return Err(NetlinkError::Malformed("unexpected ack type"));
        }
        // NLMSG_ERROR payload starts with the errno (0 on success)
        let errno = i32::from_ne_bytes([
            buf[NLMSG_HDRLEN],
            buf[NLMSG_HDRLEN + 1],
            buf[NLMSG_HDRLEN + 2],
            buf[NLMSG_HDRLEN + 3],
        ]);
        if errno != 0 {
            warn!("Kernel rejected route request: errno {}", -errno);
            return Err(NetlinkError::KernelError(-errno));
        }
        Ok(())
    }
}

impl Drop for NetlinkSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
