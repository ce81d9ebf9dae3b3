// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fib reconciler tests

#![cfg(test)]

pub mod fake_agent {
    use routes::{AgentRequest, AgentResponse};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};
    use tracing::debug;

    /// A forwarding agent good enough for the reconciler to talk to: it
    /// records every request, answers liveness probes with a settable epoch
    /// and can be told to hang up to simulate a crashed agent.
    pub struct FakeAgent {
        pub port: u16,
        calls: Arc<Mutex<Vec<String>>>,
        pub alive_since: Arc<AtomicI64>,
        pub fail: Arc<AtomicBool>,
    }

    impl FakeAgent {
        pub fn start() -> FakeAgent {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
            let port = listener.local_addr().expect("addr").port();
            let calls: Arc<Mutex<Vec<String>>> = Arc::default();
            let alive_since = Arc::new(AtomicI64::new(1000));
            let fail = Arc::new(AtomicBool::new(false));

            let srv_calls = calls.clone();
            let srv_alive = alive_since.clone();
            let srv_fail = fail.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    serve_connection(&mut stream, &srv_calls, &srv_alive, &srv_fail);
                }
            });

            FakeAgent {
                port,
                calls,
                alive_since,
                fail,
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("poisoned").clone()
        }

        /// Wait until the named call shows up at least `count` times.
        pub fn wait_for_calls(&self, name: &str, count: usize, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if self.calls().iter().filter(|c| c.as_str() == name).count() >= count {
                    return true;
                }
                thread::sleep(Duration::from_millis(10));
            }
            false
        }
    }

    fn request_name(request: &AgentRequest) -> &'static str {
        match request {
            AgentRequest::AddUnicastRoutes { .. } => "add_unicast",
            AgentRequest::DeleteUnicastRoutes { .. } => "delete_unicast",
            AgentRequest::SyncFib { .. } => "sync_fib",
            AgentRequest::AddMplsRoutes { .. } => "add_mpls",
            AgentRequest::DeleteMplsRoutes { .. } => "delete_mpls",
            AgentRequest::SyncMplsFib { .. } => "sync_mpls_fib",
            AgentRequest::AliveSince => "alive_since",
        }
    }

    fn serve_connection(
        stream: &mut TcpStream,
        calls: &Arc<Mutex<Vec<String>>>,
        alive: &Arc<AtomicI64>,
        fail: &Arc<AtomicBool>,
    ) {
        loop {
            let mut len_buf = [0u8; 4];
            if stream.read_exact(&mut len_buf).is_err() {
                return;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            if stream.read_exact(&mut payload).is_err() {
                return;
            }
            if fail.load(Ordering::SeqCst) {
                debug!("Fake agent hanging up on purpose");
                return;
            }
            let Ok(request) = serde_json::from_slice::<AgentRequest>(&payload) else {
                return;
            };
            calls
                .lock()
                .expect("poisoned")
                .push(request_name(&request).to_owned());

            let response = match request {
                AgentRequest::AliveSince => {
                    AgentResponse::AliveSince(alive.load(Ordering::SeqCst))
                }
                _ => AgentResponse::Ok,
            };
            let data = serde_json::to_vec(&response).expect("serialize");
            let mut frame = Vec::with_capacity(data.len() + 4);
            frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
            frame.extend_from_slice(&data);
            if stream.write_all(&frame).is_err() {
                return;
            }
        }
    }
}

mod tests {
    use super::fake_agent::FakeAgent;
    use crate::config::FibConfigBuilder;
    use crate::fibio::start_fib;
    use crate::process::FibCounters;
    use routes::{
        InterfaceDatabase, InterfaceInfo, NextHop, Prefix, RouteDatabase, UnicastRoute,
    };
    use std::future::Future;
    use std::net::IpAddr;
    use std::os::unix::net::UnixDatagram;
    use std::path::{Path, PathBuf};
    use std::str::FromStr;
    use std::time::Duration;

    fn sock_path(test: &str, role: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fibtest_{}_{test}_{role}.sock", std::process::id()))
    }

    fn base_config(test: &str) -> FibConfigBuilder {
        let mut builder = FibConfigBuilder::default();
        builder
            .node_name("node1")
            .cold_start_duration(Duration::from_millis(50))
            .health_check_interval(Duration::from_millis(100))
            .decision_pub_path(sock_path(test, "decision"))
            .linkmon_pub_path(sock_path(test, "linkmon"));
        builder
    }

    fn publish(path: &Path, payload: &[u8]) {
        let sock = UnixDatagram::unbound().expect("socket");
        sock.send_to(payload, path).expect("send publication");
    }

    fn nh(gw: &str, ifindex: u32, ifname: &str) -> NextHop {
        NextHop::new(Some(IpAddr::from_str(gw).expect("Bad address")), Some(ifindex))
            .with_ifname(ifname)
    }

    fn route_db(node: &str, routes: &[(&str, Vec<NextHop>, bool)]) -> Vec<u8> {
        let mut db = RouteDatabase::new(node);
        for (dest, hops, do_not_install) in routes {
            let mut route =
                UnicastRoute::new(Prefix::from_str(dest).expect("Bad prefix"), hops.clone());
            route.do_not_install = *do_not_install;
            db.add_unicast(route);
        }
        serde_json::to_vec(&db).expect("serialize")
    }

    fn interface_db(node: &str, interfaces: &[(&str, bool, u32)]) -> Vec<u8> {
        let mut db = InterfaceDatabase {
            node_name: node.to_owned(),
            ..Default::default()
        };
        for (name, is_up, ifindex) in interfaces {
            db.interfaces.insert(
                (*name).to_owned(),
                InterfaceInfo {
                    is_up: *is_up,
                    ifindex: *ifindex,
                },
            );
        }
        serde_json::to_vec(&db).expect("serialize")
    }

    async fn wait_until<F, Fut>(mut probe: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if probe().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dryrun_ingestion_and_introspection() {
        let config = base_config("dryrun")
            .dryrun(true)
            .build()
            .expect("config");
        let decision_path = config.decision_pub_path.clone();
        let linkmon_path = config.linkmon_pub_path.clone();

        let mut handle = start_fib(config).expect("start fib");
        let mut ctl = handle.get_ctl_tx();

        // one installable route, one marked do-not-install
        publish(
            &decision_path,
            &route_db(
                "node1",
                &[
                    ("10.0.0.0/24", vec![nh("192.0.2.1", 3, "eth0")], false),
                    ("10.9.0.0/16", vec![nh("192.0.2.1", 3, "eth0")], true),
                ],
            ),
        );
        // a publication from a foreign node must be dropped
        publish(
            &decision_path,
            &route_db("node9", &[("10.1.0.0/24", vec![nh("192.0.2.1", 3, "eth0")], false)]),
        );

        let probe_ctl = ctl.clone();
        assert!(
            wait_until(
                move || {
                    let mut ctl = probe_ctl.clone();
                    async move { ctl.route_db_get().await.map(|db| db.unicast.len()) == Ok(1) }
                },
                Duration::from_secs(5)
            )
            .await
        );

        let installable = ctl.route_db_get().await.expect("route db");
        assert!(installable
            .unicast
            .contains_key(&Prefix::from_str("10.0.0.0/24").expect("Bad prefix")));

        let uninstallable = ctl.route_db_uninstallable_get().await.expect("uninstallable");
        assert_eq!(uninstallable.unicast.len(), 1);
        assert!(uninstallable
            .unicast
            .contains_key(&Prefix::from_str("10.9.0.0/16").expect("Bad prefix")));

        let counters = ctl.counters_get().await.expect("counters");
        assert_eq!(counters.route_db_received, 1);

        // the only next-hop egresses over eth0; when it goes down the route
        // must disappear from the database
        publish(&linkmon_path, &interface_db("node1", &[("eth0", true, 3)]));
        publish(&linkmon_path, &interface_db("node1", &[("eth0", false, 3)]));

        let probe_ctl = ctl.clone();
        assert!(
            wait_until(
                move || {
                    let mut ctl = probe_ctl.clone();
                    async move { ctl.route_db_get().await.map(|db| db.unicast.is_empty()) == Ok(true) }
                },
                Duration::from_secs(5)
            )
            .await
        );

        handle.finish().expect("finish");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_delta_and_agent_restart() {
        let agent = FakeAgent::start();
        let config = base_config("agent")
            .agent_port(agent.port)
            .enable_segment_routing(true)
            .build()
            .expect("config");
        let decision_path = config.decision_pub_path.clone();

        let mut handle = start_fib(config).expect("start fib");
        let mut ctl = handle.get_ctl_tx();

        // cold start plus the first liveness probe both end in a full sync
        assert!(agent.wait_for_calls("sync_fib", 2, Duration::from_secs(5)));
        assert!(agent.wait_for_calls("sync_mpls_fib", 1, Duration::from_secs(5)));

        // wait for a clean steady state (cold-start sync plus the sync the
        // first liveness probe forces) before exercising the delta path
        let probe_ctl = ctl.clone();
        assert!(
            wait_until(
                move || {
                    let mut ctl = probe_ctl.clone();
                    async move {
                        ctl.counters_get()
                            .await
                            .map(|c: FibCounters| c.full_syncs >= 2 && !c.dirty && !c.sync_pending)
                            == Ok(true)
                    }
                },
                Duration::from_secs(5)
            )
            .await
        );

        // first snapshot: plain adds
        publish(
            &decision_path,
            &route_db(
                "node1",
                &[
                    ("10.0.0.0/24", vec![nh("192.0.2.1", 3, "eth0")], false),
                    ("10.0.1.0/24", vec![nh("192.0.2.2", 4, "eth1")], false),
                ],
            ),
        );
        assert!(agent.wait_for_calls("add_unicast", 1, Duration::from_secs(5)));

        // second snapshot: one route withdrawn, one replaced; the delete
        // must be issued before the add
        publish(
            &decision_path,
            &route_db("node1", &[("10.0.0.0/24", vec![nh("192.0.2.9", 7, "eth2")], false)]),
        );
        assert!(agent.wait_for_calls("delete_unicast", 1, Duration::from_secs(5)));
        assert!(agent.wait_for_calls("add_unicast", 2, Duration::from_secs(5)));
        let calls = agent.calls();
        let last_delete = calls.iter().rposition(|c| c == "delete_unicast").expect("delete");
        let last_add = calls.iter().rposition(|c| c == "add_unicast").expect("add");
        assert!(last_delete < last_add);

        // agent restart: the liveness epoch changes and a full sync follows
        let syncs_before = calls.iter().filter(|c| c.as_str() == "sync_fib").count();
        agent.alive_since.store(2000, std::sync::atomic::Ordering::SeqCst);
        assert!(agent.wait_for_calls("sync_fib", syncs_before + 1, Duration::from_secs(5)));

        let counters = ctl.counters_get().await.expect("counters");
        assert_eq!(counters.unicast_routes, 1);
        assert!(counters.full_syncs >= 2);

        handle.finish().expect("finish");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_sync_backs_off_and_recovers() {
        let agent = FakeAgent::start();
        agent.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        let config = base_config("backoff")
            .agent_port(agent.port)
            .build()
            .expect("config");
        let mut handle = start_fib(config).expect("start fib");
        let ctl = handle.get_ctl_tx();

        // every sync attempt fails: the reconciler goes dirty and keeps a
        // retry pending
        let probe_ctl = ctl.clone();
        assert!(
            wait_until(
                move || {
                    let mut ctl = probe_ctl.clone();
                    async move {
                        ctl.counters_get()
                            .await
                            .map(|c| c.dirty && c.sync_pending && c.transport_failures > 0)
                            == Ok(true)
                    }
                },
                Duration::from_secs(5)
            )
            .await
        );

        // let the agent come back: the backed-off sync must succeed and
        // clear the dirty state
        agent.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        let probe_ctl = ctl.clone();
        assert!(
            wait_until(
                move || {
                    let mut ctl = probe_ctl.clone();
                    async move {
                        ctl.counters_get()
                            .await
                            .map(|c| !c.dirty && !c.sync_pending && c.full_syncs > 0)
                            == Ok(true)
                    }
                },
                Duration::from_secs(10)
            )
            .await
        );
        assert!(agent.wait_for_calls("sync_fib", 1, Duration::from_secs(5)));

        handle.finish().expect("finish");
    }
}
