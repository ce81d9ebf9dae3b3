// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fib reconciler configuration

use config_store::StoreSender;
use derive_builder::Builder;
use std::path::PathBuf;
use std::time::Duration;

use crate::fibio::{DEFAULT_DECISION_PUB_PATH, DEFAULT_LINKMON_PUB_PATH};

/// Port the forwarding agent listens on.
pub const DEFAULT_AGENT_PORT: u16 = 5909;

/// Delay between start-up and the first full sync.
pub const DEFAULT_COLD_START_DURATION: Duration = Duration::from_secs(10);

/// How often the agent liveness probe runs.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// How often the periodic full sync runs when enabled.
pub const DEFAULT_PLATFORM_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Struct to configure the fib reconciler. N.B we derive a builder type
/// `FibConfigBuilder` and provide defaults for each field.
#[derive(Builder, Debug)]
pub struct FibConfig {
    #[builder(setter(into), default = "node".to_string())]
    pub node_name: String,

    #[builder(default = DEFAULT_AGENT_PORT)]
    pub agent_port: u16,

    /// Suppress every external side effect; state is still tracked and the
    /// would-be programming is logged.
    #[builder(default = false)]
    pub dryrun: bool,

    /// Run a periodic full sync in addition to the failure-driven one.
    #[builder(default = false)]
    pub enable_fib_sync: bool,

    /// Program MPLS routes to the agent.
    #[builder(default = false)]
    pub enable_segment_routing: bool,

    /// Persist per-node programming duration into the key/value store.
    #[builder(default = false)]
    pub enable_ordered_fib: bool,

    #[builder(default = DEFAULT_COLD_START_DURATION)]
    pub cold_start_duration: Duration,

    #[builder(setter(into), default = DEFAULT_DECISION_PUB_PATH.to_string().into())]
    pub decision_pub_path: PathBuf,

    #[builder(setter(into), default = DEFAULT_LINKMON_PUB_PATH.to_string().into())]
    pub linkmon_pub_path: PathBuf,

    #[builder(default = DEFAULT_HEALTH_CHECK_INTERVAL)]
    pub health_check_interval: Duration,

    #[builder(default = DEFAULT_PLATFORM_SYNC_INTERVAL)]
    pub platform_sync_interval: Duration,

    /// Key/value store used by the ordered-fib duration export.
    #[builder(default = None, setter(strip_option))]
    pub store: Option<StoreSender>,
}
