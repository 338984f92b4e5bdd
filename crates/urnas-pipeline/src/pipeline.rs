//! Live compilation of downloaded ballots.
//!
//! Download tasks push [`PendingItem`]s through a [`PipelineHandle`]; one
//! compiler thread owns the [`SnapshotStore`] and drains the queue in
//! batches, checkpointing after each batch and publishing a snapshot every
//! `snapshot_interval` compiled sections.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use urnas_core::{
    HarvestConfig, PendingItem, RoundCode, SectionEnricher, SectionId, SectionLayout, SectionSink,
};
use urnas_store::{RoundCount, SnapshotStore, UpsertOutcome};

use crate::PipelineError;
use crate::rows;
use crate::scan;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub snapshot_interval: u64,
    pub dequeue_timeout: Duration,
    pub error_log_cap: u64,
    pub snapshot_path: PathBuf,
}

impl PipelineOptions {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            batch_size: config.compile_batch.max(1),
            snapshot_interval: config.snapshot_interval.max(1) as u64,
            dequeue_timeout: config.dequeue_timeout(),
            error_log_cap: config.error_log_cap as u64,
            snapshot_path: config.snapshot_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Waiting for work.
    Idle,
    /// Compiling a batch.
    Draining,
    Checkpointing,
    SnapshotPending,
    /// Consumer exited after `finish`.
    Finished,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Draining,
            2 => Self::Checkpointing,
            3 => Self::SnapshotPending,
            4 => Self::Finished,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Draining => 1,
            Self::Checkpointing => 2,
            Self::SnapshotPending => 3,
            Self::Finished => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Sections compiled by this run.
    pub compiled: u64,
    pub errors: u64,
    /// Dequeued items that were already compiled.
    pub skipped: u64,
    /// Items waiting in the queue.
    pub queued: u64,
}

/// What [`IngestionPipeline::finish`] reports once everything is flushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub stats: PipelineStats,
    pub total_sections: usize,
    pub rounds: Vec<RoundCount>,
}

/// State shared by the handles and the compiler thread.
struct Shared {
    existing: Mutex<HashSet<SectionId>>,
    accepting: RwLock<bool>,
    state: AtomicU8,
    compiled: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    queued: AtomicU64,
}

impl Shared {
    fn is_known(&self, id: &SectionId) -> bool {
        self.existing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn remember(&self, id: SectionId) {
        self.existing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    fn is_accepting(&self) -> bool {
        *self.accepting.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn stats(&self) -> PipelineStats {
        PipelineStats {
            compiled: self.compiled.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the queue. Cheap to clone; hand one to every download
/// task, or to the orchestrator as its [`SectionSink`].
#[derive(Clone)]
pub struct PipelineHandle {
    tx: Sender<PendingItem>,
    shared: Arc<Shared>,
    layout: SectionLayout,
}

impl PipelineHandle {
    /// Queue one ballot unless it is already compiled or the pipeline is
    /// finishing. Returns whether the item was queued.
    pub fn enqueue(&self, item: PendingItem) -> bool {
        // Held across the send so `finish` cannot slip in between.
        let accepting = self
            .shared
            .accepting
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !*accepting {
            debug!(id = %item.id, "pipeline finishing, item dropped");
            return false;
        }
        if self.shared.is_known(&item.id) {
            return false;
        }
        self.shared.queued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(item).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Queue every ballot of `round` found in a finished section directory.
    pub fn enqueue_section(&self, section_dir: &Path, round: &RoundCode) -> usize {
        let mut queued = 0;
        for ballot_file in scan::ballots_in_section(section_dir, round) {
            let Some(id) = self.layout.section_id_for_ballot(&ballot_file) else {
                debug!(file = %ballot_file.display(), "ballot outside the download layout");
                continue;
            };
            let item = PendingItem {
                section_dir: section_dir.to_path_buf(),
                ballot_file,
                id,
            };
            if self.enqueue(item) {
                queued += 1;
            }
        }
        queued
    }
}

impl SectionSink for PipelineHandle {
    fn section_done(&self, section_dir: &Path, round: &RoundCode) {
        self.enqueue_section(section_dir, round);
    }
}

pub struct IngestionPipeline {
    handle: PipelineHandle,
    consumer: Option<JoinHandle<Result<PipelineReport, PipelineError>>>,
}

impl IngestionPipeline {
    /// Take over the writer handle, load the ids already compiled, publish
    /// an initial snapshot and start the compiler thread.
    pub fn start(
        store: SnapshotStore,
        layout: SectionLayout,
        options: PipelineOptions,
        enricher: Box<dyn SectionEnricher>,
    ) -> Result<Self, PipelineError> {
        let existing = store.existing_ids()?;
        info!(existing = existing.len(), "sections already compiled");
        publish_snapshot(&store, &options.snapshot_path);

        let shared = Arc::new(Shared {
            existing: Mutex::new(existing),
            accepting: RwLock::new(true),
            state: AtomicU8::new(PipelineState::Idle.as_u8()),
            compiled: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            queued: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::channel();
        let compiler = Compiler {
            store,
            rx,
            shared: Arc::clone(&shared),
            layout: layout.clone(),
            options,
            enricher,
        };
        let consumer = std::thread::Builder::new()
            .name("urnas-compiler".to_string())
            .spawn(move || compiler.run())
            .map_err(|source| PipelineError::Io {
                path: PathBuf::from("urnas-compiler"),
                source,
            })?;

        Ok(Self {
            handle: PipelineHandle { tx, shared, layout },
            consumer: Some(consumer),
        })
    }

    /// Recompile everything on disk from an empty store.
    ///
    /// Aborts before touching the store when fewer than `min_files` ballot
    /// files exist under the layout root.
    pub fn rebuild(
        store: SnapshotStore,
        layout: SectionLayout,
        options: PipelineOptions,
        enricher: Box<dyn SectionEnricher>,
        min_files: usize,
    ) -> Result<Self, PipelineError> {
        scan::check_rebuild_precondition(&layout, min_files)?;
        store.clear()?;
        let pipeline = Self::start(store, layout, options, enricher)?;
        pipeline.compile_remaining_from_disk();
        Ok(pipeline)
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, item: PendingItem) -> bool {
        self.handle.enqueue(item)
    }

    /// Queue every ballot on disk that is not compiled yet.
    pub fn compile_remaining_from_disk(&self) -> usize {
        let files = scan::find_ballot_files(self.handle.layout.root());
        let mut queued = 0;
        for ballot_file in &files {
            let (Some(section_dir), Some(id)) = (
                ballot_file.parent(),
                self.handle.layout.section_id_for_ballot(ballot_file),
            ) else {
                continue;
            };
            let item = PendingItem {
                section_dir: section_dir.to_path_buf(),
                ballot_file: ballot_file.clone(),
                id,
            };
            if self.handle.enqueue(item) {
                queued += 1;
            }
        }
        info!(queued, on_disk = files.len(), "queued ballots from disk");
        queued
    }

    pub fn stats(&self) -> PipelineStats {
        self.handle.shared.stats()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.handle.shared.state.load(Ordering::Acquire))
    }

    /// Stop accepting work, wait for the queue to drain, then checkpoint
    /// and publish a final snapshot.
    pub fn finish(mut self) -> Result<PipelineReport, PipelineError> {
        *self
            .handle
            .shared
            .accepting
            .write()
            .unwrap_or_else(PoisonError::into_inner) = false;
        info!(pending = self.stats().queued, "waiting for compiler to drain");
        let consumer = self.consumer.take().ok_or(PipelineError::Finished)?;
        let report = consumer
            .join()
            .map_err(|_| PipelineError::ConsumerPanicked)??;
        info!(
            compiled = report.stats.compiled,
            errors = report.stats.errors,
            total = report.total_sections,
            "pipeline finished"
        );
        Ok(report)
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        // Without `finish`, let the compiler drain and exit on its own.
        *self
            .handle
            .shared
            .accepting
            .write()
            .unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// Consumer half. Lives on its own thread and is the only code that
/// touches the store.
struct Compiler {
    store: SnapshotStore,
    rx: Receiver<PendingItem>,
    shared: Arc<Shared>,
    layout: SectionLayout,
    options: PipelineOptions,
    enricher: Box<dyn SectionEnricher>,
}

impl Compiler {
    fn run(mut self) -> Result<PipelineReport, PipelineError> {
        let mut last_snapshot = 0;
        loop {
            self.shared.set_state(PipelineState::Idle);
            let finishing = !self.shared.is_accepting();
            let (batch, closed) = self.next_batch(finishing);
            if batch.is_empty() {
                if finishing || closed {
                    break;
                }
                continue;
            }

            self.shared.set_state(PipelineState::Draining);
            let size = batch.len();
            for item in batch {
                self.compile(item);
            }

            self.shared.set_state(PipelineState::Checkpointing);
            if let Err(e) = self.store.checkpoint() {
                warn!(error = %e, "checkpoint failed");
            }
            let stats = self.shared.stats();
            info!(
                batch = size,
                compiled = stats.compiled,
                errors = stats.errors,
                queued = stats.queued,
                "batch compiled"
            );

            if stats.compiled - last_snapshot >= self.options.snapshot_interval {
                self.shared.set_state(PipelineState::SnapshotPending);
                publish_snapshot(&self.store, &self.options.snapshot_path);
                last_snapshot = stats.compiled;
            }
        }

        self.shared.set_state(PipelineState::Checkpointing);
        self.store.checkpoint()?;
        self.shared.set_state(PipelineState::SnapshotPending);
        publish_snapshot(&self.store, &self.options.snapshot_path);
        let report = PipelineReport {
            stats: self.shared.stats(),
            total_sections: self.store.section_count()?,
            rounds: self.store.round_counts()?,
        };
        self.shared.set_state(PipelineState::Finished);
        Ok(report)
    }

    /// Up to `batch_size` items. Blocks for at most the dequeue timeout per
    /// item while producers may still send; once finishing, takes only
    /// what is already queued. The flag reports that every producer is gone.
    fn next_batch(&self, finishing: bool) -> (Vec<PendingItem>, bool) {
        let mut batch = Vec::new();
        while batch.len() < self.options.batch_size {
            let next = if finishing {
                self.rx.try_recv().map_err(|e| match e {
                    TryRecvError::Empty => RecvTimeoutError::Timeout,
                    TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
                })
            } else {
                self.rx.recv_timeout(self.options.dequeue_timeout)
            };
            match next {
                Ok(item) => {
                    self.shared.queued.fetch_sub(1, Ordering::Relaxed);
                    batch.push(item);
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return (batch, true),
            }
        }
        (batch, false)
    }

    fn compile(&mut self, item: PendingItem) {
        if self.shared.is_known(&item.id) {
            self.shared.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.compile_one(&item) {
            Ok(outcome) => {
                debug!(id = %item.id, ?outcome, "compiled");
                self.shared.remember(item.id);
                self.shared.compiled.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let errors = self.shared.errors.fetch_add(1, Ordering::Relaxed) + 1;
                if errors <= self.options.error_log_cap {
                    warn!(id = %item.id, file = %item.ballot_file.display(), error = %e, "compile failed");
                }
            }
        }
    }

    fn compile_one(&mut self, item: &PendingItem) -> Result<UpsertOutcome, PipelineError> {
        let record = urnas_ballot::decode_file(&item.ballot_file)?;
        let enrichment = self
            .enricher
            .enrich(&item.section_dir, &item.ballot_file, &record);
        let section = self
            .layout
            .section_of(&item.section_dir)
            .unwrap_or_else(|| rows::section_from_ballot(&record));
        let rows = rows::flatten(&item.id, &section, &record, &enrichment);
        Ok(self.store.upsert_section(&rows)?)
    }
}

/// Snapshot failures never stop the writer.
fn publish_snapshot(store: &SnapshotStore, dest: &Path) {
    match store.snapshot(dest) {
        Ok(()) => info!(dest = %dest.display(), "snapshot published"),
        Err(e) => warn!(dest = %dest.display(), error = %e, "snapshot skipped"),
    }
}
