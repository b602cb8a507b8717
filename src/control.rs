use crate::error::{Result, SupervisorError};
use crate::parse::{ProcessConfig, Timings};
use crate::runtime::{Process, ProcessInfo, Supervised};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub type SharedProcess = Arc<dyn Supervised>;

/// Name → process directory.
///
/// The map lock only covers membership. Every per-process call is made after
/// the map lock has been released, so the two lock domains never nest.
pub struct Registry {
    procs: RwLock<HashMap<String, SharedProcess>>,
    timings: Timings,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Timings::default())
    }
}

impl Registry {
    pub fn new(timings: Timings) -> Self {
        Self { procs: RwLock::new(HashMap::new()), timings }
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    async fn lookup(&self, name: &str) -> Option<SharedProcess> {
        self.procs.read().await.get(name).cloned()
    }


    /*
        @@@
        @create();
        . Returns the existing entry untouched when the name is already present.
        . Otherwise builds a Process, starts its supervising task and inserts it; spawning begins in the background.
    */
    pub async fn create(&self, name: &str, config: Arc<ProcessConfig>) -> SharedProcess {
        let mut map = self.procs.write().await;
        if let Some(existing) = map.get(name) {
            debug!(process = name, "already registered");
            return Arc::clone(existing);
        }
        let process: SharedProcess = Process::launch(name, config, self.timings);
        map.insert(name.to_string(), Arc::clone(&process));
        info!(process = name, "registered");
        process
    }

    /// Evicts `name` and tells its supervising task to exit. Does not wait.
    pub async fn remove(&self, name: &str) -> Option<SharedProcess> {
        let removed = self.procs.write().await.remove(name);
        if let Some(process) = &removed {
            process.request_exit();
            info!(process = name, "removed");
        }
        removed
    }

    /// Signals every entry to exit and empties the directory. Does not wait;
    /// the evicted entries are returned for callers that want to.
    pub async fn shutdown(&self) -> Vec<SharedProcess> {
        let mut map = self.procs.write().await;
        for process in map.values() {
            process.request_exit();
        }
        let evicted: Vec<SharedProcess> = std::mem::take(&mut *map).into_values().collect();
        info!(count = evicted.len(), "registry shut down");
        evicted
    }

    /// Resumes a parked process. Unknown or unparked names are ignored.
    pub async fn start_by_name(&self, name: &str) {
        if let Some(process) = self.lookup(name).await {
            if process.is_user_stopped().await {
                process.up().await;
            }
        }
    }

    /// Parks a process. Unknown names are ignored.
    pub async fn stop_by_name(&self, name: &str) {
        if let Some(process) = self.lookup(name).await {
            process.down().await;
        }
    }

    /// Name → state label. Each entry is read under its own lock, so the
    /// result is not atomic across entries.
    pub async fn status_snapshot(&self) -> BTreeMap<String, String> {
        let mut snapshot = BTreeMap::new();
        for process in self.entries().await {
            let state = process.state().await;
            snapshot.insert(process.name().to_string(), state.label().to_string());
        }
        snapshot
    }

    pub async fn details(&self) -> BTreeMap<String, ProcessInfo> {
        let mut details = BTreeMap::new();
        for process in self.entries().await {
            details.insert(process.name().to_string(), process.info().await);
        }
        details
    }

    pub async fn forward_signal(&self, name: &str, signo: i32) -> Result<()> {
        let process = self
            .lookup(name)
            .await
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        process.signal(signo).await
    }

    pub async fn get(&self, name: &str) -> Option<SharedProcess> {
        self.lookup(name).await
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.procs.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.procs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.procs.read().await.is_empty()
    }

    async fn entries(&self) -> Vec<SharedProcess> {
        self.procs.read().await.values().cloned().collect()
    }
}
