// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface up/down tracking

use ahash::RandomState;
use routes::InterfaceDatabase;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Remembers the last reported status of every interface so that a new
/// snapshot can be reduced to the set of links that just went down.
pub(crate) struct InterfaceTracker {
    status: HashMap<String, bool, RandomState>,
}

impl InterfaceTracker {
    pub(crate) fn new() -> Self {
        Self {
            status: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    /// Ingest a snapshot and return the interfaces that transitioned from
    /// up to down.
    pub(crate) fn process(&mut self, db: &InterfaceDatabase) -> HashSet<String> {
        let mut affected = HashSet::new();
        for (name, info) in &db.interfaces {
            let was_up = self.status.get(name).copied().unwrap_or(false);
            self.status.insert(name.clone(), info.is_up);
            if was_up && !info.is_up {
                info!("Interface {name} went DOWN from UP state");
                affected.insert(name.clone());
            }
        }
        affected
    }
}
