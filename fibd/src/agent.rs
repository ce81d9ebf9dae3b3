// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel-backed forwarding agent: answers the reconciler's RPC and
//! programs routes straight into the kernel FIB through netlink. The same
//! wire protocol a hardware agent would speak, with the host as the ASIC.

use chrono::Local;
use netlink::{NetlinkError, RouteMessage};
use routes::{AgentRequest, AgentResponse, MplsLabel, MplsRoute, Prefix, Route, UnicastRoute};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
#[allow(unused)]
use tracing::{debug, error, info, warn};

pub(crate) fn run_agent(port: u16) {
    let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind the agent port {port}: {e}");
            std::process::exit(1);
        }
    };
    let alive_since = Local::now().timestamp();
    info!("Forwarding agent listening on port {port}");

    let mut fib = KernelFib::new();
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => serve_connection(&mut stream, alive_since, &mut fib),
            Err(e) => error!("Failed to accept a connection: {e}"),
        }
    }
}

/* One reconciler connection at a time; it re-dials after failures. */
fn serve_connection(stream: &mut TcpStream, alive_since: i64, fib: &mut KernelFib) {
    info!("Reconciler connected");
    loop {
        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).is_err() {
            info!("Reconciler disconnected");
            return;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        if stream.read_exact(&mut payload).is_err() {
            return;
        }

        let response = match serde_json::from_slice::<AgentRequest>(&payload) {
            Ok(AgentRequest::AliveSince) => AgentResponse::AliveSince(alive_since),
            Ok(request) => fib.apply(&request),
            Err(e) => AgentResponse::Error(format!("bad request: {e}")),
        };

        let data = match serde_json::to_vec(&response) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize response: {e}");
                return;
            }
        };
        let mut frame = Vec::with_capacity(data.len() + 4);
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&data);
        if stream.write_all(&frame).is_err() {
            return;
        }
    }
}

/// Kernel FIB programming state: the set of destinations we installed, so
/// that a sync can withdraw what the new snapshot no longer carries.
struct KernelFib {
    unicast: BTreeSet<Prefix>,
    mpls: BTreeSet<MplsLabel>,
    #[cfg(target_os = "linux")]
    sock: Option<netlink::NetlinkSocket>,
}

impl KernelFib {
    fn new() -> Self {
        Self {
            unicast: BTreeSet::new(),
            mpls: BTreeSet::new(),
            #[cfg(target_os = "linux")]
            sock: None,
        }
    }

    fn apply(&mut self, request: &AgentRequest) -> AgentResponse {
        let result = match request {
            AgentRequest::AddUnicastRoutes { routes, .. } => self.add_unicast(routes),
            AgentRequest::DeleteUnicastRoutes { prefixes, .. } => self.delete_unicast(prefixes),
            AgentRequest::SyncFib { routes, .. } => self.sync_unicast(routes),
            AgentRequest::AddMplsRoutes { routes, .. } => self.add_mpls(routes),
            AgentRequest::DeleteMplsRoutes { labels, .. } => self.delete_mpls(labels),
            AgentRequest::SyncMplsFib { routes, .. } => self.sync_mpls(routes),
            AgentRequest::AliveSince => Ok(()),
        };
        match result {
            Ok(()) => AgentResponse::Ok,
            Err(e) => AgentResponse::Error(e.to_string()),
        }
    }

    fn add_unicast(&mut self, routes: &[UnicastRoute]) -> Result<(), NetlinkError> {
        for route in routes {
            let mut msg = RouteMessage::new();
            match msg.add_route(&Route::from(route)) {
                Ok(()) => {
                    self.send(&mut msg)?;
                    self.unicast.insert(route.dest);
                }
                // a bad route is skipped, not fatal
                Err(e) => error!("Skipping route {}: {e}", route.dest),
            }
        }
        Ok(())
    }

    fn delete_unicast(&mut self, prefixes: &[Prefix]) -> Result<(), NetlinkError> {
        for prefix in prefixes {
            let mut msg = RouteMessage::new();
            match msg.delete_route(&Route::unicast(*prefix, vec![])) {
                Ok(()) => {
                    self.send(&mut msg)?;
                    self.unicast.remove(prefix);
                }
                Err(e) => error!("Skipping route delete {prefix}: {e}"),
            }
        }
        Ok(())
    }

    fn sync_unicast(&mut self, routes: &[UnicastRoute]) -> Result<(), NetlinkError> {
        let wanted: BTreeSet<Prefix> = routes.iter().map(|r| r.dest).collect();
        let stale: Vec<Prefix> = self.unicast.difference(&wanted).copied().collect();
        self.delete_unicast(&stale)?;
        self.add_unicast(routes)
    }

    fn add_mpls(&mut self, routes: &[MplsRoute]) -> Result<(), NetlinkError> {
        for route in routes {
            let mut msg = RouteMessage::new();
            match msg.add_label_route(&Route::from(route)) {
                Ok(()) => {
                    self.send(&mut msg)?;
                    self.mpls.insert(route.label);
                }
                Err(e) => error!("Skipping MPLS route {}: {e}", route.label),
            }
        }
        Ok(())
    }

    fn delete_mpls(&mut self, labels: &[MplsLabel]) -> Result<(), NetlinkError> {
        for label in labels {
            let mut msg = RouteMessage::new();
            match msg.delete_label_route(&Route::mpls(*label, vec![])) {
                Ok(()) => {
                    self.send(&mut msg)?;
                    self.mpls.remove(label);
                }
                Err(e) => error!("Skipping MPLS route delete {label}: {e}"),
            }
        }
        Ok(())
    }

    fn sync_mpls(&mut self, routes: &[MplsRoute]) -> Result<(), NetlinkError> {
        let wanted: BTreeSet<MplsLabel> = routes.iter().map(|r| r.label).collect();
        let stale: Vec<MplsLabel> = self.mpls.difference(&wanted).copied().collect();
        self.delete_mpls(&stale)?;
        self.add_mpls(routes)
    }

    #[cfg(target_os = "linux")]
    fn send(&mut self, msg: &mut RouteMessage) -> Result<(), NetlinkError> {
        if self.sock.is_none() {
            self.sock = Some(netlink::NetlinkSocket::new()?);
        }
        match self.sock.as_mut() {
            Some(sock) => sock.send_route(msg),
            None => Ok(()),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn send(&mut self, msg: &mut RouteMessage) -> Result<(), NetlinkError> {
        debug!("No netlink on this platform; built {} bytes", msg.as_bytes().len());
        Ok(())
    }
}
