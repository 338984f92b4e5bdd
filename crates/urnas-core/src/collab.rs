//! Seams to the collaborators around the ingestion pipeline.
//!
//! - [`SectionSink`]: notified by the downloader when a section's files
//!   have all been attempted.
//! - [`SectionEnricher`]: supplies log-derived counters and audit issues
//!   for a section while it is compiled.

use std::path::Path;

use serde::Serialize;

use crate::ballot::BallotRecord;
use crate::model::RoundCode;

/// Receives completed sections from the downloader.
///
/// Called from many download tasks at once; implementations must be cheap
/// and must not block.
pub trait SectionSink: Send + Sync {
    fn section_done(&self, section_dir: &Path, round: &RoundCode);
}

impl<F> SectionSink for F
where
    F: Fn(&Path, &RoundCode) + Send + Sync,
{
    fn section_done(&self, section_dir: &Path, round: &RoundCode) {
        self(section_dir, round)
    }
}

/// Counters extracted from a machine's event log.
///
/// `reboots` is inferred from log text (open events minus one). It is a
/// heuristic and undercounts reboots that happen before the first open event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogEvents {
    pub reboots: u32,
    pub error_count: u32,
    pub operator_alert_count: u32,
    pub votes_logged: u32,
    pub substitution_count: u32,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Info => "info",
        }
    }
}

/// An inconsistency reported by an audit analyzer for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub code: String,
    pub severity: Severity,
    pub description: String,
    pub legal_basis: Option<String>,
    pub details: Option<String>,
}

/// Everything collaborators know about a section beyond its ballot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub log_events: Option<LogEvents>,
    pub issues: Vec<Issue>,
    /// Hardware model, e.g. `"2020"`; comes from signature or log files.
    pub equipment_model: Option<String>,
}

pub trait SectionEnricher: Send {
    fn enrich(&self, section_dir: &Path, ballot_file: &Path, record: &BallotRecord) -> Enrichment;
}

/// Enricher used when no log or audit data is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl SectionEnricher for NoEnrichment {
    fn enrich(&self, _: &Path, _: &Path, _: &BallotRecord) -> Enrichment {
        Enrichment::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |dir: &Path, round: &RoundCode| {
            seen.lock()
                .unwrap()
                .push((dir.to_path_buf(), round.to_string()));
        };
        sink.section_done(Path::new("/raw/df/1/2/3"), &RoundCode::from("406"));
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "406");
    }

    #[test]
    fn log_events_serialize() {
        let events = LogEvents {
            reboots: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&events).unwrap();
        assert_eq!(json["reboots"], 1);
        assert!(json["open_time"].is_null());
    }
}
