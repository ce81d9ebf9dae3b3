// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! fibd daemon entry point: wires the persistent store and the fib
//! reconciler together, or serves the kernel-backed forwarding agent.

mod agent;

use clap::{Parser, Subcommand};
use config_store::{start_store, StoreConf};
use fib::{start_fib, FibConfigBuilder, DEFAULT_AGENT_PORT};
use fib::{DEFAULT_DECISION_PUB_PATH, DEFAULT_LINKMON_PUB_PATH};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fibd", about = "FIB reconciliation agent")]
struct Args {
    /// Node identity; publications from other nodes are dropped.
    #[arg(long, default_value = "node")]
    node_name: String,

    /// Port of the downstream forwarding agent.
    #[arg(long, default_value_t = DEFAULT_AGENT_PORT)]
    agent_port: u16,

    /// Log the would-be programming instead of doing it.
    #[arg(long)]
    dryrun: bool,

    /// Run a periodic full sync.
    #[arg(long)]
    enable_fib_sync: bool,

    /// Program MPLS routes.
    #[arg(long)]
    enable_segment_routing: bool,

    /// Persist per-node programming duration into the store.
    #[arg(long)]
    enable_ordered_fib: bool,

    /// Delay before the first full sync, in seconds.
    #[arg(long, default_value_t = 10)]
    cold_start_secs: u64,

    #[arg(long, default_value = DEFAULT_DECISION_PUB_PATH)]
    decision_sock: PathBuf,

    #[arg(long, default_value = DEFAULT_LINKMON_PUB_PATH)]
    linkmon_sock: PathBuf,

    #[arg(long, default_value = "/var/run/fibd/store.json")]
    store_path: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the kernel-backed forwarding agent on --agent-port.
    Agent,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if matches!(args.command, Some(Command::Agent)) {
        agent::run_agent(args.agent_port);
        return;
    }

    info!("Starting fibd");

    let mut store_conf = StoreConf::new(&args.store_path);
    store_conf.dryrun = args.dryrun;
    let mut store_handle = match start_store(store_conf) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start the persistent store: {e}");
            std::process::exit(1);
        }
    };

    let mut builder = FibConfigBuilder::default();
    builder
        .node_name(args.node_name)
        .agent_port(args.agent_port)
        .dryrun(args.dryrun)
        .enable_fib_sync(args.enable_fib_sync)
        .enable_segment_routing(args.enable_segment_routing)
        .enable_ordered_fib(args.enable_ordered_fib)
        .cold_start_duration(Duration::from_secs(args.cold_start_secs))
        .decision_pub_path(args.decision_sock)
        .linkmon_pub_path(args.linkmon_sock)
        .store(store_handle.sender());
    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            error!("Bad configuration: {e}");
            std::process::exit(1);
        }
    };

    let mut fib_handle = match start_fib(config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start the fib reconciler: {e}");
            std::process::exit(1);
        }
    };

    info!("fibd initialized successfully");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {e}");
    }
    info!("Shutting down");
    if let Err(e) = fib_handle.finish() {
        error!("Failed to stop the fib reconciler: {e}");
    }
    if let Err(e) = store_handle.finish() {
        error!("Failed to stop the persistent store: {e}");
    }
}
