//! Simulated download: a randomized, monotonically increasing progress
//! sequence fed into the item store on a fixed tick.

use crate::downloads::Downloads;
use crate::store::ItemStore;
use rand::Rng;
#[cfg(test)]
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const INITIAL_PROGRESS: u8 = 10;
pub const COMPLETE: u8 = 100;
pub const INCREMENT_RANGE: Range<u8> = 10..25;
pub const MAX_STEPS: usize = 100;

// The step cap must never be what ends a download.
const _: () = assert!(
    INITIAL_PROGRESS as usize + INCREMENT_RANGE.start as usize * MAX_STEPS >= COMPLETE as usize
);

pub trait IncrementSource: Send {
    fn next_increment(&mut self) -> u8;
}

pub struct RandomIncrements<R>(pub R);

impl<R: Rng + Send> IncrementSource for RandomIncrements<R> {
    fn next_increment(&mut self) -> u8 {
        self.0.gen_range(INCREMENT_RANGE)
    }
}

/// Replays a fixed list of increments, then falls back to the range minimum.
#[cfg(test)]
pub struct ScriptedIncrements(VecDeque<u8>);

#[cfg(test)]
impl ScriptedIncrements {
    pub fn new(increments: impl IntoIterator<Item = u8>) -> Self {
        Self(increments.into_iter().collect())
    }
}

#[cfg(test)]
impl IncrementSource for ScriptedIncrements {
    fn next_increment(&mut self) -> u8 {
        self.0.pop_front().unwrap_or(INCREMENT_RANGE.start)
    }
}

/// Yields `INITIAL_PROGRESS`, then one value per step until it reaches
/// `COMPLETE` (clamped) or `MAX_STEPS` steps have been taken.
pub struct ProgressSequence<S> {
    source: S,
    current: u8,
    steps: usize,
    started: bool,
    done: bool,
}

impl<S: IncrementSource> ProgressSequence<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: INITIAL_PROGRESS,
            steps: 0,
            started: false,
            done: false,
        }
    }
}

impl<S: IncrementSource> Iterator for ProgressSequence<S> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.current);
        }
        if self.steps >= MAX_STEPS {
            self.done = true;
            return None;
        }

        self.steps += 1;
        let next = self.current.saturating_add(self.source.next_increment());
        if next >= COMPLETE {
            self.current = COMPLETE;
            self.done = true;
        } else {
            self.current = next;
        }
        Some(self.current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    /// Ran out of steps below `COMPLETE`.
    Exhausted,
    Cancelled,
}

/// What one simulator task needs to drive its item.
pub struct DownloadJob {
    pub id: u32,
    pub index: usize,
    pub run: u64,
    pub tick_interval: Duration,
    pub cancel: CancellationToken,
}

pub async fn run_download<S: IncrementSource>(
    job: DownloadJob,
    source: S,
    store: Arc<ItemStore>,
    downloads: Downloads,
) -> DownloadOutcome {
    let outcome = drive(&job, source, &store).await;

    {
        let mut active = downloads.lock().unwrap_or_else(|e| e.into_inner());
        if active.get(&job.id).is_some_and(|d| d.run == job.run) {
            active.remove(&job.id);
        }
    }

    match outcome {
        DownloadOutcome::Completed => info!("Download for item {} complete.", job.id),
        DownloadOutcome::Exhausted => warn!(
            "Download for item {} stopped after {} steps without completing",
            job.id, MAX_STEPS
        ),
        DownloadOutcome::Cancelled => info!("Download for item {} cancelled.", job.id),
    }
    outcome
}

async fn drive<S: IncrementSource>(
    job: &DownloadJob,
    source: S,
    store: &ItemStore,
) -> DownloadOutcome {
    for (step, progress) in ProgressSequence::new(source).enumerate() {
        if step > 0 {
            tokio::select! {
                _ = job.cancel.cancelled() => return DownloadOutcome::Cancelled,
                _ = tokio::time::sleep(job.tick_interval) => {}
            }
        }

        debug!("Item {} progress {}%", job.id, progress);
        if let Err(e) = store.update(job.index, progress) {
            warn!("Dropping download for item {}: {}", job.id, e);
            return DownloadOutcome::Cancelled;
        }
        if progress >= COMPLETE {
            return DownloadOutcome::Completed;
        }
    }
    DownloadOutcome::Exhausted
}
