// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fib IO: the single-threaded event loop that owns all reconciler state.
//! Publications arrive on unix datagram sockets, control requests on a
//! channel, and timers drive the sync state machine.

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use routes::{InterfaceDatabase, RouteDatabase};
use std::fs;
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{channel, Receiver, Sender};
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::config::FibConfig;
use crate::ctl::{FibCtlMsg, FibCtlSender};
use crate::errors::FibError;
use crate::process::FibEngine;

// capacity of the fib control channel. This should have very little impact
// on performance.
const CTL_CHANNEL_CAPACITY: usize = 100;

pub const DEFAULT_DECISION_PUB_PATH: &str = "/var/run/fibd/decision.sock";
pub const DEFAULT_LINKMON_PUB_PATH: &str = "/var/run/fibd/linkmon.sock";

pub(crate) const DECSOCK: Token = Token(0);
pub(crate) const LNKSOCK: Token = Token(1);

/* one publication datagram at most */
const PUB_BUF_SIZE: usize = 256 * 1024;

/* the loop never sleeps longer than this, so ctl messages stay responsive */
const MAX_POLL_WAIT: Duration = Duration::from_secs(1);

pub struct FibHandle {
    pub ctl: Sender<FibCtlMsg>,
    pub handle: Option<JoinHandle<()>>,
}

impl FibHandle {
    /// Terminate the fib IO loop / thread
    ///
    /// # Errors
    /// Fails if the channel has been dropped or the thread cannot be joined
    pub fn finish(&mut self) -> Result<(), FibError> {
        debug!("Requesting fib IO to stop..");
        self.ctl
            .try_send(FibCtlMsg::Finish)
            .map_err(|_| FibError::Internal("Error sending over ctl channel"))?;

        let handle = self.handle.take();
        if let Some(handle) = handle {
            debug!("Waiting for the fib IO to terminate..");
            handle
                .join()
                .map_err(|_| FibError::Internal("Error joining thread"))?;
            debug!("Fib IO ended successfully");
            Ok(())
        } else {
            Err(FibError::Internal("No handle"))
        }
    }

    #[must_use]
    pub fn get_ctl_tx(&self) -> FibCtlSender {
        FibCtlSender::new(self.ctl.clone())
    }
}

fn open_unix_sock(path: &Path) -> Result<UnixDatagram, FibError> {
    let _ = std::fs::remove_file(path);
    let sock = UnixDatagram::bind(path)
        .map_err(|_| FibError::InvalidPath(path.display().to_string()))?;
    let mut perms = fs::metadata(path)
        .map_err(|_| FibError::Internal("Failure retrieving socket metadata"))?
        .permissions();
    perms.set_mode(0o777);
    fs::set_permissions(path, perms).map_err(|_| FibError::PermError)?;
    sock.set_nonblocking(true)
        .map_err(|_| FibError::Internal("Failure setting non-blocking socket"))?;
    Ok(sock)
}

/// `Fibio` is the fib IO loop state.
pub(crate) struct Fibio {
    pub(crate) run: bool,
    pub(crate) poller: Poll,
    pub(crate) decision_sock: UnixDatagram,
    pub(crate) linkmon_sock: UnixDatagram,
    pub(crate) ctl_tx: Sender<FibCtlMsg>,
    pub(crate) ctl_rx: Receiver<FibCtlMsg>,
}

impl Fibio {
    fn new(config: &FibConfig) -> Result<Fibio, FibError> {
        /* create unix socks for the decision and link-monitor publications.
        An unusable path is fatal: without publications there is no fib. */
        let decision_sock = open_unix_sock(&config.decision_pub_path)?;
        let linkmon_sock = open_unix_sock(&config.linkmon_pub_path)?;

        /* internal ctl channel */
        let (ctl_tx, ctl_rx) = channel::<FibCtlMsg>(CTL_CHANNEL_CAPACITY);

        /* create poller and register both publication sockets */
        let poller = Poll::new().map_err(|_| FibError::Internal("Poll creation failed"))?;
        let decision_fd = decision_sock.as_raw_fd();
        poller
            .registry()
            .register(&mut SourceFd(&decision_fd), DECSOCK, Interest::READABLE)
            .map_err(|_| FibError::Internal("Failed to register decision sock"))?;
        let linkmon_fd = linkmon_sock.as_raw_fd();
        poller
            .registry()
            .register(&mut SourceFd(&linkmon_fd), LNKSOCK, Interest::READABLE)
            .map_err(|_| FibError::Internal("Failed to register link-monitor sock"))?;

        Ok(Fibio {
            run: true,
            poller,
            decision_sock,
            linkmon_sock,
            ctl_tx,
            ctl_rx,
        })
    }
}

#[allow(clippy::missing_errors_doc)]
pub fn start_fib(config: FibConfig) -> Result<FibHandle, FibError> {
    let mut fibio = Fibio::new(&config)?;
    let ctl_tx = fibio.ctl_tx.clone();
    let node_name = config.node_name.clone();

    let fib_loop = move || {
        info!(
            "Fib listening for decision publications at {}",
            config.decision_pub_path.display()
        );
        info!(
            "Fib listening for interface publications at {}",
            config.linkmon_pub_path.display()
        );
        let mut events = Events::with_capacity(64);
        let mut buf = vec![0u8; PUB_BUF_SIZE];

        /* the engine owns every piece of reconciler state */
        let mut engine = FibEngine::new(config);

        info!("Entering fib IO loop....");
        while fibio.run {
            let timeout = poll_timeout(&engine);
            if let Err(e) = fibio.poller.poll(&mut events, Some(timeout)) {
                error!("Poller error!: {e}");
                continue;
            }

            /* events on the publication sockets */
            for event in &events {
                match event.token() {
                    DECSOCK => {
                        drain_decision_sock(&fibio.decision_sock, &mut buf, &node_name, &mut engine);
                    }
                    LNKSOCK => {
                        drain_linkmon_sock(&fibio.linkmon_sock, &mut buf, &node_name, &mut engine);
                    }
                    _ => {}
                }
            }

            /* handle control-channel messages */
            handle_ctl_msg(&mut fibio, &mut engine);

            /* fire due timers */
            engine.tick();
        }
    };
    let handle = thread::Builder::new()
        .name("fib".to_string())
        .spawn(fib_loop)
        .map_err(|_| FibError::Internal("Failure spawning thread"))?;

    Ok(FibHandle {
        ctl: ctl_tx,
        handle: Some(handle),
    })
}

fn poll_timeout(engine: &FibEngine) -> Duration {
    match engine.next_deadline() {
        Some(at) => at
            .saturating_duration_since(Instant::now())
            .min(MAX_POLL_WAIT),
        None => MAX_POLL_WAIT,
    }
}

/* Publications from a node other than ours are warned about and dropped. */
fn drain_decision_sock(
    sock: &UnixDatagram,
    buf: &mut [u8],
    node_name: &str,
    engine: &mut FibEngine,
) {
    while let Ok((len, _peer)) = sock.recv_from(buf) {
        match serde_json::from_slice::<RouteDatabase>(&buf[..len]) {
            Ok(db) if db.node_name == node_name => engine.process_route_db(db),
            Ok(db) => warn!("Received publication from unknown node {}", db.node_name),
            Err(e) => error!("Error processing decision publication: {e}"),
        }
    }
}

fn drain_linkmon_sock(
    sock: &UnixDatagram,
    buf: &mut [u8],
    node_name: &str,
    engine: &mut FibEngine,
) {
    while let Ok((len, _peer)) = sock.recv_from(buf) {
        match serde_json::from_slice::<InterfaceDatabase>(&buf[..len]) {
            Ok(db) if db.node_name == node_name => engine.process_interface_db(db),
            Ok(db) => warn!("Received interface updates from unknown node {}", db.node_name),
            Err(e) => error!("Error processing link monitor publication: {e}"),
        }
    }
}

fn handle_ctl_msg(fibio: &mut Fibio, engine: &mut FibEngine) {
    loop {
        match fibio.ctl_rx.try_recv() {
            Ok(FibCtlMsg::Finish) => {
                info!("Fib IO loop asked to stop");
                fibio.run = false;
            }
            Ok(FibCtlMsg::RouteDbGet(reply)) => {
                let _ = reply.send(engine.route_db.clone());
            }
            Ok(FibCtlMsg::RouteDbUninstallableGet(reply)) => {
                let _ = reply.send(engine.do_not_install_db.clone());
            }
            Ok(FibCtlMsg::PerfDbGet(reply)) => {
                let _ = reply.send(engine.perf.dump());
            }
            Ok(FibCtlMsg::CountersGet(reply)) => {
                let _ = reply.send(engine.counters());
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                fibio.run = false;
                break;
            }
        }
    }
}
