// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Client to the downstream forwarding agent. One lazily-built stream
//! connection; each call is a length-prefixed JSON frame answered
//! synchronously. Any transport failure drops the connection so the next
//! call rebuilds it.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Local};
use routes::{AgentRequest, AgentResponse, MplsRoute, Prefix, UnicastRoute, FIB_CLIENT_ID};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::errors::FibError;

/// Timeout for building the agent connection.
pub const AGENT_CONN_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout for one agent call, connection included.
pub const AGENT_PROC_TIMEOUT: Duration = Duration::from_secs(10);

/* frames larger than this are junk, not routes */
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Stats for the agent client.
#[derive(Debug, Default, Clone)]
pub(crate) struct AgentClientStats {
    pub(crate) last_conn_time: Option<DateTime<Local>>, /* last successful connect */
    pub(crate) calls: u64,
    pub(crate) call_failures: u64,
}

pub(crate) struct AgentClient {
    port: u16,
    sock: Option<TcpStream>,
    pub(crate) stats: AgentClientStats,
}

impl AgentClient {
    pub(crate) fn new(port: u16) -> Self {
        Self {
            port,
            sock: None,
            stats: AgentClientStats::default(),
        }
    }

    /// Drop the current connection; the next call reconnects.
    pub(crate) fn disconnect(&mut self) {
        if let Some(sock) = self.sock.take() {
            debug!(
                "Dropping agent connection (up since {:?})",
                self.stats.last_conn_time
            );
            let _ = sock.shutdown(std::net::Shutdown::Both);
        }
    }

    /* Reuse the existing connection if any, else build a fresh one. */
    fn ensure_connected(&mut self) -> Result<(), FibError> {
        if self.sock.is_some() {
            return Ok(());
        }
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let sock = TcpStream::connect_timeout(&addr, AGENT_CONN_TIMEOUT)
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;
        sock.set_read_timeout(Some(AGENT_PROC_TIMEOUT))
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;
        sock.set_write_timeout(Some(AGENT_PROC_TIMEOUT))
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;
        sock.set_nodelay(true)
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;
        info!("Connected to forwarding agent at {addr}");
        self.stats.last_conn_time = Some(Local::now());
        self.sock = Some(sock);
        Ok(())
    }

    fn call(&mut self, request: &AgentRequest) -> Result<AgentResponse, FibError> {
        self.stats.calls += 1;
        match self.do_call(request) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.stats.call_failures += 1;
                self.disconnect();
                Err(e)
            }
        }
    }

    fn do_call(&mut self, request: &AgentRequest) -> Result<AgentResponse, FibError> {
        self.ensure_connected()?;
        let Some(sock) = self.sock.as_mut() else {
            return Err(FibError::Internal("No agent connection"));
        };

        let payload =
            serde_json::to_vec(request).map_err(|e| FibError::AgentTransport(e.to_string()))?;
        let mut frame = BytesMut::with_capacity(payload.len() + 4);
        frame.put_u32_le(payload.len() as u32);
        frame.put_slice(&payload);
        sock.write_all(&frame)
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;

        let mut len_buf = [0u8; 4];
        sock.read_exact(&mut len_buf)
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(FibError::AgentTransport(format!("oversized frame: {len}")));
        }
        let mut payload = vec![0u8; len];
        sock.read_exact(&mut payload)
            .map_err(|e| FibError::AgentTransport(e.to_string()))?;

        match serde_json::from_slice::<AgentResponse>(&payload) {
            Ok(AgentResponse::Error(e)) => Err(FibError::AgentRejected(e)),
            Ok(response) => Ok(response),
            Err(e) => Err(FibError::AgentTransport(e.to_string())),
        }
    }

    fn expect_ok(&mut self, request: &AgentRequest) -> Result<(), FibError> {
        match self.call(request)? {
            AgentResponse::Ok => Ok(()),
            _ => Err(FibError::AgentTransport("unexpected response".to_owned())),
        }
    }

    pub(crate) fn add_unicast_routes(&mut self, routes: Vec<UnicastRoute>) -> Result<(), FibError> {
        self.expect_ok(&AgentRequest::AddUnicastRoutes {
            client_id: FIB_CLIENT_ID,
            routes,
        })
    }

    pub(crate) fn delete_unicast_routes(&mut self, prefixes: Vec<Prefix>) -> Result<(), FibError> {
        self.expect_ok(&AgentRequest::DeleteUnicastRoutes {
            client_id: FIB_CLIENT_ID,
            prefixes,
        })
    }

    pub(crate) fn sync_fib(&mut self, routes: Vec<UnicastRoute>) -> Result<(), FibError> {
        self.expect_ok(&AgentRequest::SyncFib {
            client_id: FIB_CLIENT_ID,
            routes,
        })
    }

    pub(crate) fn add_mpls_routes(&mut self, routes: Vec<MplsRoute>) -> Result<(), FibError> {
        self.expect_ok(&AgentRequest::AddMplsRoutes {
            client_id: FIB_CLIENT_ID,
            routes,
        })
    }

    pub(crate) fn delete_mpls_routes(&mut self, labels: Vec<u32>) -> Result<(), FibError> {
        self.expect_ok(&AgentRequest::DeleteMplsRoutes {
            client_id: FIB_CLIENT_ID,
            labels,
        })
    }

    pub(crate) fn sync_mpls_fib(&mut self, routes: Vec<MplsRoute>) -> Result<(), FibError> {
        self.expect_ok(&AgentRequest::SyncMplsFib {
            client_id: FIB_CLIENT_ID,
            routes,
        })
    }

    /// Epoch the agent came up at; a change means the agent restarted.
    pub(crate) fn alive_since(&mut self) -> Result<i64, FibError> {
        match self.call(&AgentRequest::AliveSince)? {
            AgentResponse::AliveSince(epoch) => Ok(epoch),
            _ => Err(FibError::AgentTransport("unexpected response".to_owned())),
        }
    }
}
