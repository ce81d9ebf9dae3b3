// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Convergence trace events carried along route and interface snapshots.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// One named mark in a convergence trace, stamped in unix milliseconds.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PerfEvent {
    pub node_name: String,
    pub event_name: String,
    pub unix_ts_ms: i64,
}

/// An ordered trace of marks accumulated while an update travels through the
/// modules. Each module appends its own marks.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PerfEvents {
    pub events: Vec<PerfEvent>,
}

/// Append a mark with the current wall-clock time.
pub fn add_perf_event(events: &mut PerfEvents, node_name: &str, event_name: &str) {
    events.events.push(PerfEvent {
        node_name: node_name.to_owned(),
        event_name: event_name.to_owned(),
        unix_ts_ms: Local::now().timestamp_millis(),
    });
}

/// Wall time covered by a trace, first mark to last. Zero for traces with
/// fewer than two marks; negative when the marks are out of order.
#[must_use]
pub fn total_duration_ms(events: &PerfEvents) -> i64 {
    match (events.events.first(), events.events.last()) {
        (Some(first), Some(last)) => last.unix_ts_ms - first.unix_ts_ms,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_accumulate_in_order() {
        let mut events = PerfEvents::default();
        add_perf_event(&mut events, "node1", "DECISION_RECEIVED");
        add_perf_event(&mut events, "node1", "FIB_ROUTE_DB_RECVD");
        assert_eq!(events.events.len(), 2);
        assert!(total_duration_ms(&events) >= 0);
        assert_eq!(events.events[0].event_name, "DECISION_RECEIVED");
    }
}
