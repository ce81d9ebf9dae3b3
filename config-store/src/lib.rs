// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A small key/value store persisted to a single file. Writers go through
//! an event-loop thread that debounces disk saves with an exponential
//! backoff timer; the file is replaced atomically on every save.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, warn};

use backoff::ExponentialBackoff;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("The store loop is gone")]
    ChannelClosed,

    #[error("No reply from the store loop")]
    NoReply,

    #[error("Failure spawning the store thread")]
    SpawnFailure,
}

/// The serialized shape of the store file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreDatabase {
    pub key_vals: HashMap<String, String, RandomState>,
}

enum StoreCtlMsg {
    Store(String, String, Sender<StoreResponse>),
    Load(String, Sender<StoreResponse>),
    Erase(String, Sender<StoreResponse>),
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResponse {
    pub success: bool,
    pub data: Option<String>,
}

/// Store configuration. A zero initial backoff disables debouncing: every
/// successful store/erase saves to disk before replying.
#[derive(Debug, Clone)]
pub struct StoreConf {
    pub path: PathBuf,
    pub save_initial_backoff: Duration,
    pub save_max_backoff: Duration,
    pub dryrun: bool,
}

impl StoreConf {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            save_initial_backoff: Duration::from_millis(100),
            save_max_backoff: Duration::from_secs(5),
            dryrun: false,
        }
    }
}

/// Cloneable handle used to issue requests to the store loop.
#[derive(Debug, Clone)]
pub struct StoreSender(Sender<StoreCtlMsg>);

impl StoreSender {
    fn request<F>(&self, build: F) -> Result<StoreResponse, StoreError>
    where
        F: FnOnce(Sender<StoreResponse>) -> StoreCtlMsg,
    {
        let (reply_tx, reply_rx) = channel();
        self.0
            .send(build(reply_tx))
            .map_err(|_| StoreError::ChannelClosed)?;
        reply_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| StoreError::NoReply)
    }

    /// Store a value under a key, replacing any previous value.
    pub fn store(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.request(|tx| StoreCtlMsg::Store(key.to_owned(), value.to_owned(), tx))
            .map(|_| ())
    }

    /// Load the value stored under a key.
    pub fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.request(|tx| StoreCtlMsg::Load(key.to_owned(), tx))
            .map(|response| response.data)
    }

    /// Erase a key. Returns whether the key existed.
    pub fn erase(&self, key: &str) -> Result<bool, StoreError> {
        self.request(|tx| StoreCtlMsg::Erase(key.to_owned(), tx))
            .map(|response| response.success)
    }
}

/// Handle owning the store loop thread.
pub struct StoreHandle {
    tx: Sender<StoreCtlMsg>,
    handle: Option<JoinHandle<()>>,
}

impl StoreHandle {
    #[must_use]
    pub fn sender(&self) -> StoreSender {
        StoreSender(self.tx.clone())
    }

    /// Stop the store loop; a final synchronous save runs before the thread
    /// exits.
    pub fn finish(&mut self) -> Result<(), StoreError> {
        debug!("Requesting persistent store to stop..");
        self.tx
            .send(StoreCtlMsg::Finish)
            .map_err(|_| StoreError::ChannelClosed)?;
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| StoreError::ChannelClosed)?;
        }
        Ok(())
    }
}

struct PersistentStore {
    conf: StoreConf,
    db: StoreDatabase,
    backoff: Option<ExponentialBackoff>,
    save_at: Option<Instant>,
}

impl PersistentStore {
    fn new(conf: StoreConf) -> Self {
        let backoff = if conf.save_initial_backoff.is_zero() && conf.save_max_backoff.is_zero() {
            None
        } else {
            Some(ExponentialBackoff::new(
                conf.save_initial_backoff,
                conf.save_max_backoff,
            ))
        };
        let mut store = Self {
            conf,
            db: StoreDatabase::default(),
            backoff,
            save_at: None,
        };
        if !store.load_database_from_disk() {
            error!(
                "Failed to load config-database from file: {}",
                store.conf.path.display()
            );
        }
        store
    }

    /* Loads never schedule a save; successful stores and erases do. With
    debouncing off the save happens before the reply is sent. */
    fn handle_request(&mut self, msg: StoreCtlMsg) {
        match msg {
            StoreCtlMsg::Store(key, data, tx) => {
                self.db.key_vals.insert(key, data);
                self.schedule_save();
                let _ = tx.send(StoreResponse {
                    success: true,
                    data: None,
                });
            }
            StoreCtlMsg::Load(key, tx) => {
                let data = self.db.key_vals.get(&key).cloned();
                let _ = tx.send(StoreResponse {
                    success: data.is_some(),
                    data,
                });
            }
            StoreCtlMsg::Erase(key, tx) => {
                let existed = self.db.key_vals.remove(&key).is_some();
                if existed {
                    self.schedule_save();
                }
                let _ = tx.send(StoreResponse {
                    success: existed,
                    data: None,
                });
            }
            StoreCtlMsg::Finish => {}
        }
    }

    /* Arm the debounced save, or save right away when debouncing is off. */
    fn schedule_save(&mut self) {
        match &self.backoff {
            None => {
                self.save_database_to_disk();
            }
            Some(backoff) => {
                if self.save_at.is_none() {
                    self.save_at = Some(Instant::now() + backoff.time_remaining());
                }
            }
        }
    }

    fn save_database_to_disk(&mut self) -> bool {
        let data = match serde_json::to_vec_pretty(&self.db) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize store database: {e}");
                return false;
            }
        };
        if self.conf.dryrun {
            debug!("Skipping writing to disk in dryrun mode");
            return true;
        }

        info!("Updating database on disk");
        let started = Instant::now();
        match write_file_atomic(&self.conf.path, &data) {
            Ok(()) => {
                info!(
                    "Updated database on disk. Took {}ms",
                    started.elapsed().as_millis()
                );
                true
            }
            Err(e) => {
                error!(
                    "Failed to write data to file '{}': {e}",
                    self.conf.path.display()
                );
                false
            }
        }
    }

    fn load_database_from_disk(&mut self) -> bool {
        if !self.conf.path.exists() {
            info!(
                "Storage file {} doesn't exist. Starting with empty database",
                self.conf.path.display()
            );
            return true;
        }
        let data = match fs::read(&self.conf.path) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to read file contents: {e}");
                return false;
            }
        };
        match serde_json::from_slice::<StoreDatabase>(&data) {
            Ok(db) => {
                self.db = db;
                true
            }
            Err(e) => {
                error!("Failed to decode file content into StoreDatabase: {e}");
                false
            }
        }
    }
}

/* Write-temp-then-rename so readers never observe a partial file. */
fn write_file_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::set_permissions(&tmp, fs::Permissions::from_mode(0o666))?;
    fs::rename(&tmp, path)
}

/// Start the persistent store loop on its own thread.
pub fn start_store(conf: StoreConf) -> Result<StoreHandle, StoreError> {
    let (tx, rx) = channel::<StoreCtlMsg>();
    let store_loop = move || {
        let mut store = PersistentStore::new(conf);
        run_store_loop(&mut store, &rx);
        // final synchronous save on the way out
        store.save_database_to_disk();
        debug!("Persistent store stopped");
    };
    let handle = thread::Builder::new()
        .name("config-store".to_string())
        .spawn(store_loop)
        .map_err(|_| StoreError::SpawnFailure)?;

    Ok(StoreHandle {
        tx,
        handle: Some(handle),
    })
}

fn run_store_loop(store: &mut PersistentStore, rx: &Receiver<StoreCtlMsg>) {
    loop {
        let timeout = store
            .save_at
            .map_or(Duration::from_secs(1), |at| {
                at.saturating_duration_since(Instant::now())
            });
        match rx.recv_timeout(timeout) {
            Ok(StoreCtlMsg::Finish) => break,
            Ok(msg) => store.handle_request(msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        /* fire the debounced save when due */
        let due = store.save_at.is_some_and(|at| at <= Instant::now());
        if due {
            if store.save_database_to_disk() {
                if let Some(b) = store.backoff.as_mut() {
                    b.report_success();
                }
                store.save_at = None;
            } else if let Some(b) = store.backoff.as_mut() {
                b.report_error();
                store.save_at = Some(Instant::now() + b.time_remaining());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conf(name: &str) -> StoreConf {
        let path = std::env::temp_dir().join(format!("store_test_{}_{name}.json", std::process::id()));
        let _ = fs::remove_file(&path);
        let mut conf = StoreConf::new(&path);
        // no debounce: saves happen before the reply, like the unit-test
        // mode of the store
        conf.save_initial_backoff = Duration::ZERO;
        conf.save_max_backoff = Duration::ZERO;
        conf
    }

    #[test]
    fn test_store_load_erase() {
        let conf = test_conf("basic");
        let mut handle = start_store(conf.clone()).expect("start");
        let store = handle.sender();

        store.store("key1", "value1").expect("store");
        assert_eq!(store.load("key1").expect("load"), Some("value1".to_owned()));
        assert_eq!(store.load("missing").expect("load"), None);
        assert!(store.erase("key1").expect("erase"));
        assert!(!store.erase("key1").expect("erase"));

        handle.finish().expect("finish");
        let _ = fs::remove_file(&conf.path);
    }

    #[test]
    fn test_database_survives_restart() {
        let conf = test_conf("restart");
        let mut handle = start_store(conf.clone()).expect("start");
        handle.sender().store("node1", "42").expect("store");
        handle.finish().expect("finish");

        // the file decodes to exactly the acknowledged state
        let data = fs::read(&conf.path).expect("read");
        let db: StoreDatabase = serde_json::from_slice(&data).expect("decode");
        assert_eq!(db.key_vals.get("node1"), Some(&"42".to_owned()));

        let mut handle = start_store(conf.clone()).expect("restart");
        assert_eq!(
            handle.sender().load("node1").expect("load"),
            Some("42".to_owned())
        );
        handle.finish().expect("finish");
        let _ = fs::remove_file(&conf.path);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let conf = test_conf("corrupt");
        fs::write(&conf.path, b"not json at all").expect("write");

        let mut handle = start_store(conf.clone()).expect("start");
        assert_eq!(handle.sender().load("anything").expect("load"), None);
        handle.finish().expect("finish");
        let _ = fs::remove_file(&conf.path);
    }

    #[test]
    fn test_debounced_save_lands_on_disk() {
        let mut conf = test_conf("debounce");
        conf.save_initial_backoff = Duration::from_millis(20);
        conf.save_max_backoff = Duration::from_millis(200);

        let mut handle = start_store(conf.clone()).expect("start");
        handle.sender().store("k", "v").expect("store");

        // the write is debounced; the file shows up within the backoff window
        let deadline = Instant::now() + Duration::from_secs(2);
        while !conf.path.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(conf.path.exists());
        handle.finish().expect("finish");
        let _ = fs::remove_file(&conf.path);
    }
}
