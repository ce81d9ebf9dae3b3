// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounded ring of convergence traces. A trace rides in on a snapshot, gets
//! marked as it moves through the reconciler and lands here once the routes
//! have been programmed.

use routes::{add_perf_event, total_duration_ms, PerfEvents};
use std::collections::VecDeque;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, info, warn};

/// How many completed traces the ring retains.
pub const PERF_BUFFER_SIZE: usize = 10;

/// Traces longer than this are considered clock skew and dropped.
pub const CONVERGENCE_MAX_DURATION: Duration = Duration::from_secs(3);

/// Reply shape of the perf introspection request.
#[derive(Debug, Clone, Default)]
pub struct PerfDatabase {
    pub node_name: String,
    pub events: Vec<PerfEvents>,
}

pub(crate) struct PerfStore {
    node_name: String,
    pending: Option<PerfEvents>,
    db: VecDeque<PerfEvents>,
    recent_create_ts: i64,
}

impl PerfStore {
    pub(crate) fn new(node_name: &str) -> Self {
        Self {
            node_name: node_name.to_owned(),
            pending: None,
            db: VecDeque::with_capacity(PERF_BUFFER_SIZE),
            recent_create_ts: 0,
        }
    }

    /// Adopt the trace that came with a snapshot, replacing any pending one:
    /// convergence is measured against the newest data.
    pub(crate) fn note_arrival(&mut self, events: Option<PerfEvents>, mark: &str) {
        if let Some(mut events) = events {
            add_perf_event(&mut events, &self.node_name, mark);
            self.pending = Some(events);
        }
    }

    /// Mark the pending trace, if any.
    pub(crate) fn mark(&mut self, mark: &str) {
        if let Some(events) = self.pending.as_mut() {
            add_perf_event(events, &self.node_name, mark);
        }
    }

    /// Close the pending trace after a successful programming pass. Stale
    /// and implausible traces are dropped. Returns the total duration of a
    /// trace that was accepted into the ring.
    pub(crate) fn log_and_store(&mut self) -> Option<i64> {
        let mut events = self.pending.take()?;
        if events.events.is_empty() {
            return None;
        }

        let create_ts = events.events[0].unix_ts_ms;
        if self.recent_create_ts >= create_ts {
            warn!(
                "Ignoring perf event with old create timestamp {create_ts}, expected > {}",
                self.recent_create_ts
            );
            return None;
        }
        self.recent_create_ts = create_ts;

        add_perf_event(&mut events, &self.node_name, "ROUTES_PROGRAMMED");

        let duration_ms = total_duration_ms(&events);
        if duration_ms < 0 || duration_ms > CONVERGENCE_MAX_DURATION.as_millis() as i64 {
            warn!("Ignoring perf event with bad total duration {duration_ms}ms");
            return None;
        }

        while self.db.len() >= PERF_BUFFER_SIZE {
            self.db.pop_front();
        }
        self.db.push_back(events);
        info!("Route convergence performance. Duration={duration_ms}ms");
        Some(duration_ms)
    }

    pub(crate) fn dump(&self) -> PerfDatabase {
        PerfDatabase {
            node_name: self.node_name.clone(),
            events: self.db.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_lands_in_ring_once_programmed() {
        let mut store = PerfStore::new("node1");
        let mut events = PerfEvents::default();
        add_perf_event(&mut events, "node1", "DECISION_RECEIVED");

        store.note_arrival(Some(events), "FIB_ROUTE_DB_RECVD");
        store.mark("FIB_DEBOUNCE");
        let duration = store.log_and_store();
        assert!(duration.is_some());

        let db = store.dump();
        assert_eq!(db.events.len(), 1);
        assert_eq!(db.events[0].events.len(), 4);
        assert_eq!(db.events[0].events.last().map(|e| e.event_name.as_str()),
            Some("ROUTES_PROGRAMMED"));
    }

    #[test]
    fn test_stale_traces_are_dropped() {
        let mut store = PerfStore::new("node1");
        let mut events = PerfEvents::default();
        add_perf_event(&mut events, "node1", "DECISION_RECEIVED");

        store.note_arrival(Some(events.clone()), "FIB_ROUTE_DB_RECVD");
        assert!(store.log_and_store().is_some());

        // same creation timestamp again: stale
        store.note_arrival(Some(events), "FIB_ROUTE_DB_RECVD");
        assert!(store.log_and_store().is_none());
        assert_eq!(store.dump().events.len(), 1);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut store = PerfStore::new("node1");
        for i in 0..(PERF_BUFFER_SIZE + 5) {
            let mut events = PerfEvents::default();
            events.events.push(routes::PerfEvent {
                node_name: "node1".to_owned(),
                event_name: "DECISION_RECEIVED".to_owned(),
                // strictly increasing but within the plausible window
                unix_ts_ms: chrono::Local::now().timestamp_millis() - 100 + i as i64,
            });
            store.note_arrival(Some(events), "FIB_ROUTE_DB_RECVD");
            store.log_and_store();
        }
        assert_eq!(store.dump().events.len(), PERF_BUFFER_SIZE);
    }
}
