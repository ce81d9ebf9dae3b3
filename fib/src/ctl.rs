// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control channel for the fib reconciler: shutdown plus the introspection
//! requests (route database, perf traces, uninstallable set, counters).

use routes::RouteDatabase;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::errors::FibError;
use crate::perf::PerfDatabase;
use crate::process::FibCounters;

pub(crate) type FibCtlReplyTx<T> = oneshot::Sender<T>;

pub enum FibCtlMsg {
    Finish,
    RouteDbGet(FibCtlReplyTx<RouteDatabase>),
    RouteDbUninstallableGet(FibCtlReplyTx<RouteDatabase>),
    PerfDbGet(FibCtlReplyTx<PerfDatabase>),
    CountersGet(FibCtlReplyTx<FibCounters>),
}

/// An object to send control messages to the fib reconciler.
#[derive(Clone)]
pub struct FibCtlSender(Sender<FibCtlMsg>);

impl FibCtlSender {
    pub(crate) fn new(tx: Sender<FibCtlMsg>) -> Self {
        Self(tx)
    }

    async fn request<T, F>(&mut self, build: F) -> Result<T, FibError>
    where
        F: FnOnce(FibCtlReplyTx<T>) -> FibCtlMsg,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.0
            .send(build(reply_tx))
            .await
            .map_err(|_| FibError::Internal("Failed to send ctl request"))?;
        reply_rx
            .await
            .map_err(|_| FibError::Internal("Failed to receive ctl reply"))
    }

    /// Fetch the current installable route database.
    pub async fn route_db_get(&mut self) -> Result<RouteDatabase, FibError> {
        self.request(FibCtlMsg::RouteDbGet).await
    }

    /// Fetch the routes partitioned off as not-to-install.
    pub async fn route_db_uninstallable_get(&mut self) -> Result<RouteDatabase, FibError> {
        self.request(FibCtlMsg::RouteDbUninstallableGet).await
    }

    /// Fetch the ring of recent convergence traces.
    pub async fn perf_db_get(&mut self) -> Result<PerfDatabase, FibError> {
        self.request(FibCtlMsg::PerfDbGet).await
    }

    /// Fetch the reconciler counters.
    pub async fn counters_get(&mut self) -> Result<FibCounters, FibError> {
        self.request(FibCtlMsg::CountersGet).await
    }
}
