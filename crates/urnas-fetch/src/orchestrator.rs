//! Bulk download of every section of a state.
//!
//! Two independent bounds apply: one semaphore gates sections in flight
//! (manifest fetch plus their files), another gates file downloads across
//! all sections. Both are sized from the same concurrency budget and owned
//! by the orchestrator, so every `download_state` call sharing one
//! orchestrator shares the budget.
//!
//! Hash groups of a section may list the same file name. Those candidates
//! are tried one after another in manifest order; the first to land on disk
//! wins and the rest count as skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use urnas_core::naming::matches_type_filter;
use urnas_core::{HarvestConfig, ManifestEntry, RoundCode, Section, SectionLayout, SectionSink};

use crate::client::DownloadOutcome;
use crate::error::FetchError;
use crate::navigator::{ListedSection, ResourceNavigator};

/// What to download for one state.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub cycle: String,
    pub round: RoundCode,
    pub state: String,
    /// File suffixes (or substrings) to keep; empty keeps everything.
    pub file_types: Vec<String>,
    /// Uniform random sample of at most this many sections.
    pub max_sections: Option<usize>,
    /// Municipality codes or names (case-insensitive); empty keeps all.
    pub municipalities: Vec<String>,
}

impl DownloadRequest {
    pub fn new(cycle: impl Into<String>, round: RoundCode, state: impl Into<String>) -> Self {
        Self {
            cycle: cycle.into(),
            round,
            state: state.into().to_ascii_lowercase(),
            file_types: Vec::new(),
            max_sections: None,
            municipalities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    pub downloaded: u64,
    /// Already on disk from an earlier run.
    pub skipped: u64,
    /// Listed in a manifest but answered 404.
    pub missing: u64,
    pub errors: u64,
    pub sections_processed: u64,
}

impl DownloadStats {
    pub fn merge(&mut self, other: &DownloadStats) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.missing += other.missing;
        self.errors += other.errors;
        self.sections_processed += other.sections_processed;
    }
}

#[derive(Default)]
struct Counters {
    downloaded: AtomicU64,
    skipped: AtomicU64,
    missing: AtomicU64,
    errors: AtomicU64,
    sections_processed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DownloadStats {
        DownloadStats {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            sections_processed: self.sections_processed.load(Ordering::Relaxed),
        }
    }
}

pub struct DownloadOrchestrator {
    navigator: ResourceNavigator,
    layout: SectionLayout,
    section_permits: Arc<Semaphore>,
    file_permits: Arc<Semaphore>,
    section_batch: usize,
    progress_every: u64,
    sink: Option<Arc<dyn SectionSink>>,
}

impl DownloadOrchestrator {
    pub fn new(navigator: ResourceNavigator, layout: SectionLayout, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            navigator,
            layout,
            section_permits: Arc::new(Semaphore::new(max_concurrent)),
            file_permits: Arc::new(Semaphore::new(max_concurrent)),
            section_batch: 500,
            progress_every: 100,
            sink: None,
        }
    }

    pub fn from_config(navigator: ResourceNavigator, config: &HarvestConfig) -> Self {
        Self::new(
            navigator,
            SectionLayout::new(config.raw_dir()),
            config.max_concurrent,
        )
        .with_section_batch(config.section_batch)
        .with_progress_every(config.progress_every)
    }

    pub fn with_section_batch(mut self, batch: usize) -> Self {
        self.section_batch = batch.max(1);
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1) as u64;
        self
    }

    /// Notify `sink` whenever a section's files have all been attempted.
    pub fn with_sink(mut self, sink: Arc<dyn SectionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn layout(&self) -> &SectionLayout {
        &self.layout
    }

    pub fn navigator(&self) -> &ResourceNavigator {
        &self.navigator
    }

    /// Download every selected section of one state.
    ///
    /// Per-section failures are counted, never returned. `Err` only when
    /// the state configuration itself cannot be fetched.
    pub async fn download_state(&self, req: &DownloadRequest) -> Result<DownloadStats, FetchError> {
        info!(state = %req.state, round = %req.round, "downloading state");
        let Some(manifest) = self
            .navigator
            .state_manifest(&req.cycle, &req.round, &req.state)
            .await?
        else {
            return Ok(DownloadStats::default());
        };
        info!(
            state = %manifest.name,
            municipalities = manifest.municipalities.len(),
            sections = manifest.section_count(),
            "state configuration loaded"
        );

        let mut sections: Vec<ListedSection> = manifest.sections().collect();
        if !req.municipalities.is_empty() {
            sections.retain(|s| municipality_matches(s, &req.municipalities));
            info!(sections = sections.len(), "filtered to selected municipalities");
        }
        if let Some(cap) = req.max_sections
            && cap < sections.len()
        {
            sections = sample(sections, cap);
            info!(sections = cap, "random sample");
        }

        let counters = Counters::default();
        let total = sections.len();
        for batch in sections.chunks(self.section_batch) {
            join_all(
                batch
                    .iter()
                    .map(|listed| self.process_section(req, &listed.section, &counters, total)),
            )
            .await;
        }

        let stats = counters.snapshot();
        info!(
            state = %req.state,
            sections = stats.sections_processed,
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            missing = stats.missing,
            errors = stats.errors,
            "state done"
        );
        Ok(stats)
    }

    async fn process_section(
        &self,
        req: &DownloadRequest,
        section: &Section,
        counters: &Counters,
        total: usize,
    ) {
        let Ok(_permit) = self.section_permits.acquire().await else {
            return;
        };
        let entries = match self
            .navigator
            .section_manifest(&req.cycle, &req.round, section)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                error!(%section, error = %e, "section failed");
                counters.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let dir = self.layout.section_dir(section);
        let files = group_by_name(&entries, &req.file_types);
        join_all(files.into_iter().map(|(name, candidates)| async move {
            for entry in candidates {
                self.download_one(req, section, entry, name, counters).await;
            }
        }))
        .await;

        if let Some(sink) = &self.sink {
            sink.section_done(&dir, &req.round);
        }
        let processed = counters.sections_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % self.progress_every == 0 {
            let s = counters.snapshot();
            info!(
                state = %req.state,
                processed,
                total,
                downloaded = s.downloaded,
                skipped = s.skipped,
                errors = s.errors,
                "progress"
            );
        }
    }

    async fn download_one(
        &self,
        req: &DownloadRequest,
        section: &Section,
        entry: &ManifestEntry,
        file_name: &str,
        counters: &Counters,
    ) {
        let url = self
            .navigator
            .file_url(&req.cycle, &req.round, section, &entry.hash, file_name);
        let dest = self.layout.section_dir(section).join(file_name);
        let Ok(_permit) = self.file_permits.acquire().await else {
            return;
        };
        match self.navigator.fetcher().download_file(&url, &dest).await {
            Ok(DownloadOutcome::Downloaded { .. }) => {
                counters.downloaded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DownloadOutcome::AlreadyPresent) => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DownloadOutcome::NotFound) => {
                counters.missing.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(url, error = %e, "download failed");
                counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Selected file names in first-listed order, each with the entries listing it.
fn group_by_name<'a>(
    entries: &'a [ManifestEntry],
    file_types: &[String],
) -> Vec<(&'a str, Vec<&'a ManifestEntry>)> {
    let mut groups: Vec<(&str, Vec<&ManifestEntry>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        for name in entry
            .files
            .iter()
            .filter(|name| matches_type_filter(name, file_types))
        {
            let slot = *index.entry(name.as_str()).or_insert_with(|| {
                groups.push((name.as_str(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(entry);
        }
    }
    groups
}

fn municipality_matches(listed: &ListedSection, filter: &[String]) -> bool {
    let name = listed.municipality_name.to_uppercase();
    filter
        .iter()
        .any(|f| listed.section.municipality == *f || name == f.to_uppercase())
}

fn sample(sections: Vec<ListedSection>, n: usize) -> Vec<ListedSection> {
    let mut rng = rand::thread_rng();
    sections.choose_multiple(&mut rng, n).cloned().collect()
}
