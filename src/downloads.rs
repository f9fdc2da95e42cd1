use crate::config::SimulationSettings;
use crate::error::{Error, Result};
use crate::simulator::{self, DownloadJob, IncrementSource, RandomIncrements};
use crate::store::ItemStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ActiveDownload {
    pub index: usize,
    pub run: u64,
    pub started_at: Instant,
    pub cancel: CancellationToken,
}

pub type Downloads = Arc<Mutex<HashMap<u32, ActiveDownload>>>;

#[derive(Clone, Debug, Serialize)]
pub struct ActiveDownloadView {
    pub id: u32,
    pub index: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    Idle,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    AlreadyCompleted,
}

/// Starts at most one simulated download per item id.
pub struct DownloadManager {
    store: Arc<ItemStore>,
    active: Downloads,
    settings: SimulationSettings,
    next_run: AtomicU64,
    closed: AtomicBool,
}

impl DownloadManager {
    pub fn new(store: Arc<ItemStore>, settings: SimulationSettings) -> Self {
        Self {
            store,
            active: Arc::new(Mutex::new(HashMap::new())),
            settings,
            next_run: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.store
    }

    pub fn start(&self, id: u32) -> Result<StartOutcome> {
        let source = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ u64::from(id)),
            None => StdRng::from_entropy(),
        };
        self.start_with(id, RandomIncrements(source))
    }

    pub(crate) fn start_with<S>(&self, id: u32, source: S) -> Result<StartOutcome>
    where
        S: IncrementSource + 'static,
    {
        // Lock order: active table, then store. A task publishes 100 before
        // it drops its entry, so completion must be read under this lock.
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let index = self.store.index_of(id).ok_or(Error::ItemNotFound(id))?;
        let item = self.store.snapshot()[index].clone();

        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if item.is_downloaded() {
            return Ok(StartOutcome::AlreadyCompleted);
        }
        if active.contains_key(&id) {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let run = self.next_run.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        active.insert(
            id,
            ActiveDownload {
                index,
                run,
                started_at: Instant::now(),
                cancel: cancel.clone(),
            },
        );

        let job = DownloadJob {
            id,
            index,
            run,
            tick_interval: self.settings.tick_interval,
            cancel,
        };
        info!("Starting download for {} (ID: {})", item.title, id);
        tokio::spawn(simulator::run_download(
            job,
            source,
            self.store.clone(),
            self.active.clone(),
        ));

        Ok(StartOutcome::Started)
    }

    pub fn phase(&self, id: u32) -> Result<DownloadPhase> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let item = self.store.get(id).ok_or(Error::ItemNotFound(id))?;
        if item.is_downloaded() {
            return Ok(DownloadPhase::Completed);
        }
        if active.contains_key(&id) {
            Ok(DownloadPhase::Running)
        } else {
            Ok(DownloadPhase::Idle)
        }
    }

    pub fn active(&self) -> Vec<ActiveDownloadView> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let mut views: Vec<ActiveDownloadView> = active
            .iter()
            .map(|(id, d)| ActiveDownloadView {
                id: *id,
                index: d.index,
                elapsed_ms: u64::try_from(d.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            })
            .collect();
        views.sort_by_key(|v| v.id);
        views
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Cancels every running task and refuses further starts.
    pub fn shutdown(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        self.closed.store(true, Ordering::SeqCst);
        for download in active.values() {
            download.cancel.cancel();
        }
        info!("Cancelled {} active downloads.", active.len());
    }
}
