//! Usage service
//!
//! Owns the background worker that turns raw sample batches into published
//! usage snapshots. Ingestion is fire-and-forget into the worker's queue;
//! the worker validates, persists and recomputes, then publishes one
//! immutable snapshot by swapping a single reference. Readers never lock
//! and never observe a partially built index.

use crate::core::{
    BatteryLevelSeries, Config, DeviceSnapshot, DiffEntry, Result, SampleBatch, SeriesScope,
    SlotIndex,
};
use crate::engine::{assemble_snapshot, Selection, UsageEngine, UsageSnapshot};
use crate::policy::UsagePolicy;
use crate::store::SnapshotStore;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};

enum WorkerCommand {
    Ingest(SampleBatch),
    Prune,
    Sync(oneshot::Sender<()>),
}

/// Handle to the background usage pipeline
pub struct UsageService {
    tx: mpsc::UnboundedSender<WorkerCommand>,
    snapshot_rx: watch::Receiver<Arc<UsageSnapshot>>,
    selection: Mutex<Selection>,
}

impl UsageService {
    /// Load retained history and start the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        store: Box<dyn SnapshotStore + Send>,
        policy: Arc<dyn UsagePolicy + Send + Sync>,
        config: &Config,
    ) -> Result<Self> {
        let engine = UsageEngine::new(policy, config.ranking.clone());
        let retention_ms = config.general.retention_hours as i64 * 3_600_000;

        let mut timeline = store.load_window(0)?;
        trim_front(&mut timeline, retention_ms);

        let initial = if timeline.is_empty() {
            Arc::new(UsageSnapshot::empty())
        } else {
            log::info!("Resuming with {} retained snapshots", timeline.len());
            Arc::new(engine.rebuild(timeline.clone(), 1))
        };
        let generation = initial.generation();

        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let worker = Worker {
            rx,
            store,
            engine,
            publish: snapshot_tx,
            timeline,
            retention_ms,
            generation,
        };
        tokio::spawn(worker.run());

        Ok(Self {
            tx,
            snapshot_rx,
            selection: Mutex::new(Selection::new()),
        })
    }

    /// Queue one raw sample batch. Never blocks.
    pub fn ingest(&self, batch: SampleBatch) {
        if self.tx.send(WorkerCommand::Ingest(batch)).is_err() {
            log::error!("Usage worker is gone; dropping sample");
        }
    }

    /// Ask the worker to apply the retention policy to the store.
    pub fn prune(&self) {
        if self.tx.send(WorkerCommand::Prune).is_err() {
            log::error!("Usage worker is gone; prune skipped");
        }
    }

    /// Wait until every command queued before this call has been processed
    /// and its result published.
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(WorkerCommand::Sync(reply)).is_ok() {
            let _ = done.await;
        }
    }

    /// The currently published snapshot.
    pub fn current(&self) -> Arc<UsageSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch publications; fires whenever a recomputation is adopted.
    pub fn subscribe(&self) -> watch::Receiver<Arc<UsageSnapshot>> {
        self.snapshot_rx.clone()
    }

    pub fn level_series(&self, scope: SeriesScope, day: SlotIndex) -> Option<BatteryLevelSeries> {
        self.current().level_series(scope, day)
    }

    pub fn diff_entries(&self, day: SlotIndex, hour: SlotIndex) -> Vec<DiffEntry> {
        self.current().diff_entries(day, hour)
    }

    pub fn diff_entries_with_hidden(&self, day: SlotIndex, hour: SlotIndex) -> Vec<DiffEntry> {
        self.current().diff_entries_with_hidden(day, hour)
    }

    pub fn is_single_day(&self) -> bool {
        self.current().is_single_day()
    }

    pub fn selection(&self) -> (SlotIndex, SlotIndex) {
        self.selection.lock().unwrap().current()
    }

    /// Move the slot cursor. Invalid moves are rejected and keep the
    /// previous selection.
    pub fn select(&self, day: SlotIndex, hour: SlotIndex) -> Result<()> {
        let day_count = self.current().day_count();
        self.selection.lock().unwrap().select(day, hour, day_count)
    }

    /// Pick a day; the hour resets to the whole-day aggregate.
    pub fn select_day(&self, day: SlotIndex) -> Result<()> {
        let day_count = self.current().day_count();
        self.selection.lock().unwrap().select_day(day, day_count)
    }

    /// Pick an hour window under the currently selected day.
    pub fn select_hour(&self, hour: SlotIndex) -> Result<()> {
        let day_count = self.current().day_count();
        self.selection.lock().unwrap().select_hour(hour, day_count)
    }

    /// Diff entries for the current cursor position.
    pub fn selected_entries(&self) -> Vec<DiffEntry> {
        let (day, hour) = self.selection();
        self.diff_entries(day, hour)
    }

    /// Integer form of the cursor for persistence across restarts.
    pub fn save_selection(&self) -> (i64, i64) {
        self.selection.lock().unwrap().save()
    }

    /// Rebuild the cursor from its integer form, falling back to the
    /// whole-window view when the saved slots no longer exist.
    pub fn restore_selection(&self, raw_day: i64, raw_hour: i64) {
        let day_count = self.current().day_count();
        self.selection
            .lock()
            .unwrap()
            .restore(raw_day, raw_hour, day_count);
    }
}

struct Worker {
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
    store: Box<dyn SnapshotStore + Send>,
    engine: UsageEngine,
    publish: watch::Sender<Arc<UsageSnapshot>>,
    timeline: Vec<DeviceSnapshot>,
    retention_ms: i64,
    generation: u64,
}

impl Worker {
    async fn run(mut self) {
        log::info!("Usage worker started");

        while let Some(first) = self.rx.recv().await {
            // Drain whatever queued up behind `first`: a burst of arrivals
            // triggers exactly one recomputation, not one per batch.
            let mut dirty = false;
            let mut replies = Vec::new();
            let mut next = Some(first);
            while let Some(command) = next {
                match command {
                    WorkerCommand::Ingest(batch) => dirty |= self.apply_ingest(batch),
                    WorkerCommand::Prune => dirty |= self.apply_prune(),
                    WorkerCommand::Sync(reply) => replies.push(reply),
                }
                next = self.rx.try_recv().ok();
            }

            if dirty {
                self.recompute();
            }
            for reply in replies {
                let _ = reply.send(());
            }
        }

        log::info!("Usage worker stopped");
    }

    /// Validate and retain one batch. Returns whether the timeline changed.
    fn apply_ingest(&mut self, batch: SampleBatch) -> bool {
        let snapshot = match assemble_snapshot(self.engine.policy(), &batch) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Dropping invalid sample: {}", e);
                return false;
            }
        };

        if let Some(last) = self.timeline.last() {
            if snapshot.timestamp_ms <= last.timestamp_ms {
                log::warn!(
                    "Dropping out-of-order sample at {} (newest is {})",
                    snapshot.timestamp_ms,
                    last.timestamp_ms
                );
                return false;
            }
        }

        // A store failure is not fatal; the in-memory timeline stays the
        // source of truth for the published view.
        if let Err(e) = self.store.append(&snapshot) {
            log::error!("Failed to persist snapshot at {}: {}", snapshot.timestamp_ms, e);
        }

        self.timeline.push(snapshot);
        trim_front(&mut self.timeline, self.retention_ms);
        true
    }

    /// Apply the retention policy to the store and the in-memory timeline.
    fn apply_prune(&mut self) -> bool {
        let newest = match self.timeline.last() {
            Some(snapshot) => snapshot.timestamp_ms,
            None => return false,
        };
        let cutoff = newest - self.retention_ms;

        match self.store.prune_older_than(cutoff) {
            Ok(removed) if removed > 0 => {
                log::info!("Pruned {} snapshots older than {}", removed, cutoff)
            }
            Ok(_) => {}
            Err(e) => log::error!("Failed to prune store: {}", e),
        }

        let before = self.timeline.len();
        trim_front(&mut self.timeline, self.retention_ms);
        self.timeline.len() != before
    }

    fn recompute(&mut self) {
        self.generation += 1;
        let snapshot = self.engine.rebuild(self.timeline.clone(), self.generation);

        // Adopt a run only if it started after the one currently published.
        let published = self.publish.borrow().generation();
        if snapshot.generation() > published {
            let _ = self.publish.send(Arc::new(snapshot));
        } else {
            log::debug!(
                "Discarding superseded recomputation (generation {} <= {})",
                snapshot.generation(),
                published
            );
        }
    }
}

/// Drop snapshots that have fallen out of the retention window.
fn trim_front(timeline: &mut Vec<DeviceSnapshot>, retention_ms: i64) {
    let newest = match timeline.last() {
        Some(snapshot) => snapshot.timestamp_ms,
        None => return,
    };
    let cutoff = newest - retention_ms;

    let keep_from = timeline
        .iter()
        .position(|s| s.timestamp_ms >= cutoff)
        .unwrap_or(0);
    if keep_from > 0 {
        timeline.drain(..keep_from);
    }
}
