// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Main processing functions of the fib reconciler: snapshot ingestion,
//! delta apply, full sync, liveness probing and the timer state machine.

use backoff::ExponentialBackoff;
use routes::{
    best_nexthops, find_delta, InterfaceDatabase, MplsLabel, MplsRoute, Prefix, RouteDatabase,
    RouteDatabaseDelta, UnicastRoute,
};
use std::time::{Duration, Instant};
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::client::AgentClient;
use crate::config::FibConfig;
use crate::errors::FibError;
use crate::interfaces::InterfaceTracker;
use crate::perf::PerfStore;

/// Backoff window for failed full syncs.
pub(crate) const SYNC_BACKOFF_INITIAL: Duration = Duration::from_millis(8);
pub(crate) const SYNC_BACKOFF_MAX: Duration = Duration::from_millis(4096);

/* key prefix for the ordered-fib duration export */
const FIB_TIME_MARKER: &str = "fibtime:";

/// Counters dumped over the ctl channel.
#[derive(Debug, Default, Clone)]
pub struct FibCounters {
    pub route_db_received: u64,
    pub interface_db_received: u64,
    pub delta_applies: u64,
    pub full_syncs: u64,
    pub transport_failures: u64,
    pub unicast_routes: usize,
    pub mpls_routes: usize,
    pub sync_pending: bool,
    pub dirty: bool,
    pub agent_calls: u64,
    pub agent_call_failures: u64,
}

/// All reconciler state. Owned by the IO loop thread; nothing here is
/// shared.
pub(crate) struct FibEngine {
    pub(crate) config: FibConfig,
    pub(crate) route_db: RouteDatabase,
    pub(crate) do_not_install_db: RouteDatabase,
    tracker: InterfaceTracker,
    pub(crate) dirty: bool,
    backoff: ExponentialBackoff,
    client: AgentClient,
    latest_alive_since: i64,
    pub(crate) perf: PerfStore,
    counters: FibCounters,

    /* timer deadlines; the IO loop polls up to the nearest one */
    pub(crate) sync_at: Option<Instant>,
    health_at: Option<Instant>,
    periodic_at: Option<Instant>,
}

impl FibEngine {
    pub(crate) fn new(config: FibConfig) -> Self {
        let now = Instant::now();
        let sync_at = Some(now + config.cold_start_duration);
        let health_at = (!config.dryrun).then(|| now + config.health_check_interval);
        let periodic_at = (!config.dryrun && config.enable_fib_sync)
            .then(|| now + config.platform_sync_interval);
        Self {
            route_db: RouteDatabase::new(&config.node_name),
            do_not_install_db: RouteDatabase::new(&config.node_name),
            tracker: InterfaceTracker::new(),
            dirty: false,
            backoff: ExponentialBackoff::new(SYNC_BACKOFF_INITIAL, SYNC_BACKOFF_MAX),
            client: AgentClient::new(config.agent_port),
            latest_alive_since: 0,
            perf: PerfStore::new(&config.node_name),
            counters: FibCounters::default(),
            sync_at,
            health_at,
            periodic_at,
            config,
        }
    }

    /// Nearest timer deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        [self.sync_at, self.health_at, self.periodic_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fire whatever timers are due.
    pub(crate) fn tick(&mut self) {
        let now = Instant::now();
        if self.sync_at.is_some_and(|at| at <= now) {
            self.sync_at = None;
            self.run_sync_timer();
        }
        if self.health_at.is_some_and(|at| at <= now) {
            self.health_at = Some(now + self.config.health_check_interval);
            self.keep_alive_check();
        }
        if self.periodic_at.is_some_and(|at| at <= now) {
            self.periodic_at = Some(now + self.config.platform_sync_interval);
            if self.sync_at.is_none() {
                self.sync_route_db();
            }
        }
    }

    /// Ingest a decision snapshot: partition the uninstallable routes,
    /// compute the delta against the current database, commit the snapshot
    /// and apply the delta.
    pub(crate) fn process_route_db(&mut self, mut new_db: RouteDatabase) {
        debug!(
            "Processing new routes from decision: {} unicast and {} mpls routes",
            new_db.unicast.len(),
            new_db.mpls.len()
        );
        self.counters.route_db_received += 1;
        self.perf.note_arrival(new_db.perf_events.take(), "FIB_ROUTE_DB_RECVD");

        let do_not_install = new_db.partition_uninstallable();
        let delta = find_delta(&new_db, &self.route_db);
        self.route_db = new_db;
        self.do_not_install_db = do_not_install;
        self.update_routes(delta);
    }

    /// Ingest an interface snapshot: drop next-hops over freshly-down links
    /// and apply whatever delta that produces.
    pub(crate) fn process_interface_db(&mut self, mut db: InterfaceDatabase) {
        self.counters.interface_db_received += 1;
        self.perf.note_arrival(db.perf_events.take(), "FIB_INTF_DB_RECEIVED");

        let affected = self.tracker.process(&db);
        let delta = self.route_db.filter_affected_interfaces(&affected);
        self.update_routes(delta);
    }

    /// Apply a delta to the agent, unless a pending or required full sync
    /// supersedes it.
    pub(crate) fn update_routes(&mut self, delta: RouteDatabaseDelta) {
        info!("Processing route delta: {delta}");

        /* the agent programs best next-hops only */
        let unicast_updates = with_best_unicast(&delta.unicast_to_update);
        let mpls_updates = with_best_mpls(&delta.mpls_to_update);

        if self.config.dryrun {
            info!("Skipping programming of routes in dryrun mode");
            log_route_programming(
                &unicast_updates,
                &delta.unicast_to_delete,
                &mpls_updates,
                &delta.mpls_to_delete,
            );
            self.finish_programming();
            return;
        }
        if self.sync_at.is_some() {
            info!("Pending full sync is scheduled, skip delta sync for now...");
            return;
        }
        if self.dirty {
            info!("Previous route programming failed, skip delta sync to enforce full fib sync...");
            self.schedule_sync_debounced();
            return;
        }

        self.counters.delta_applies += 1;
        self.perf.mark("FIB_DEBOUNCE");
        match self.apply_delta_to_agent(
            unicast_updates,
            delta.unicast_to_delete,
            mpls_updates,
            delta.mpls_to_delete,
        ) {
            Ok(()) => {
                self.dirty = false;
                self.finish_programming();
                info!("Done processing route add/update");
            }
            Err(e) => {
                error!("Failed to program route delta at the agent: {e}");
                self.counters.transport_failures += 1;
                self.client.disconnect();
                self.dirty = true;
                self.schedule_sync_debounced();
            }
        }
    }

    /* Deletes go out before adds to avoid transient traffic duplication. */
    fn apply_delta_to_agent(
        &mut self,
        unicast_updates: Vec<UnicastRoute>,
        unicast_deletes: Vec<Prefix>,
        mpls_updates: Vec<MplsRoute>,
        mpls_deletes: Vec<MplsLabel>,
    ) -> Result<(), FibError> {
        if !unicast_deletes.is_empty() {
            self.client.delete_unicast_routes(unicast_deletes)?;
        }
        if !unicast_updates.is_empty() {
            self.client.add_unicast_routes(unicast_updates)?;
        }
        if self.config.enable_segment_routing {
            if !mpls_deletes.is_empty() {
                self.client.delete_mpls_routes(mpls_deletes)?;
            }
            if !mpls_updates.is_empty() {
                self.client.add_mpls_routes(mpls_updates)?;
            }
        }
        Ok(())
    }

    /// Replace the whole agent FIB with the current database. Returns
    /// whether the sync succeeded.
    pub(crate) fn sync_route_db(&mut self) -> bool {
        info!(
            "Syncing latest route database with the agent: {} unicast, {} mpls routes",
            self.route_db.unicast.len(),
            self.route_db.mpls.len()
        );
        let unicast: Vec<UnicastRoute> = self
            .route_db
            .unicast
            .values()
            .map(|r| UnicastRoute::new(r.dest, best_nexthops(&r.nexthops)))
            .collect();
        let mpls: Vec<MplsRoute> = self
            .route_db
            .mpls
            .values()
            .map(|r| MplsRoute::new(r.label, best_nexthops(&r.nexthops)))
            .collect();

        if self.config.dryrun {
            info!("Skipping programming of routes in dryrun mode");
            log_route_programming(&unicast, &[], &mpls, &[]);
            self.finish_programming();
            return true;
        }

        self.counters.full_syncs += 1;
        self.perf.mark("FIB_DEBOUNCE");
        if let Err(e) = self.client.sync_fib(unicast) {
            return self.sync_failed(&e);
        }
        if self.config.enable_segment_routing {
            if let Err(e) = self.client.sync_mpls_fib(mpls) {
                return self.sync_failed(&e);
            }
        }
        self.dirty = false;
        self.finish_programming();
        info!("Done syncing latest route database with the agent");
        true
    }

    fn sync_failed(&mut self, e: &FibError) -> bool {
        error!("Failed to sync route database with the agent: {e}");
        self.counters.transport_failures += 1;
        self.client.disconnect();
        self.dirty = true;
        false
    }

    /* The sync timer wraps the full sync with the backoff bookkeeping. */
    fn run_sync_timer(&mut self) {
        if self.sync_route_db() {
            self.backoff.report_success();
        } else {
            self.backoff.report_error();
            self.sync_at = Some(Instant::now() + self.backoff.time_remaining());
        }
    }

    /// Schedule an immediate full sync unless one is already pending.
    pub(crate) fn schedule_sync_debounced(&mut self) {
        if self.sync_at.is_none() {
            self.sync_at = Some(Instant::now());
        }
    }

    /// Probe the agent liveness epoch; a change means the agent restarted
    /// and its FIB needs a full resync. A probe failure only resets the
    /// connection.
    pub(crate) fn keep_alive_check(&mut self) {
        match self.client.alive_since() {
            Ok(alive_since) => {
                if alive_since != self.latest_alive_since {
                    warn!("Forwarding agent seems to have restarted. Performing full route DB sync ...");
                    self.dirty = true;
                    self.backoff.report_success();
                    self.schedule_sync_debounced();
                }
                self.latest_alive_since = alive_since;
            }
            Err(e) => {
                error!("Failed to probe the forwarding agent: {e}");
                self.counters.transport_failures += 1;
                self.client.disconnect();
            }
        }
    }

    /* Close out a successful programming pass: complete the pending perf
    trace and export the programming duration when ordered fib is on. */
    fn finish_programming(&mut self) {
        let Some(duration_ms) = self.perf.log_and_store() else {
            return;
        };
        if self.config.enable_ordered_fib {
            if let Some(store) = &self.config.store {
                let key = format!("{FIB_TIME_MARKER}{}", self.config.node_name);
                if let Err(e) = store.store(&key, &duration_ms.to_string()) {
                    warn!("Failed to persist programming duration: {e}");
                }
            }
        }
    }

    pub(crate) fn counters(&self) -> FibCounters {
        let mut counters = self.counters.clone();
        counters.unicast_routes = self.route_db.unicast.len();
        counters.mpls_routes = self.route_db.mpls.len();
        counters.sync_pending = self.sync_at.is_some();
        counters.dirty = self.dirty;
        counters.agent_calls = self.client.stats.calls;
        counters.agent_call_failures = self.client.stats.call_failures;
        counters
    }
}

fn with_best_unicast(routes: &[UnicastRoute]) -> Vec<UnicastRoute> {
    routes
        .iter()
        .map(|r| UnicastRoute::new(r.dest, best_nexthops(&r.nexthops)))
        .collect()
}

fn with_best_mpls(routes: &[MplsRoute]) -> Vec<MplsRoute> {
    routes
        .iter()
        .map(|r| MplsRoute::new(r.label, best_nexthops(&r.nexthops)))
        .collect()
}

/* dryrun rendering of what would have been programmed */
fn log_route_programming(
    unicast_updates: &[UnicastRoute],
    unicast_deletes: &[Prefix],
    mpls_updates: &[MplsRoute],
    mpls_deletes: &[MplsLabel],
) {
    debug!("Unicast routes to add/update");
    for route in unicast_updates {
        debug!("> {route}");
    }
    debug!("Unicast routes to delete");
    for prefix in unicast_deletes {
        debug!("> {prefix}");
    }
    debug!("Mpls routes to add/update");
    for route in mpls_updates {
        debug!("> {route}");
    }
    debug!("Mpls routes to delete");
    for label in mpls_deletes {
        debug!("> {label}");
    }
}
