//! Section identity, manifest entries, and queue items shared across the pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog;

/// Administrative identity of one polling unit.
///
/// All four codes are kept as the authority publishes them (zero-padded
/// strings), so they round-trip through directory names unchanged.
/// `state` is always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Section {
    pub state: String,
    pub municipality: String,
    pub zone: String,
    pub section: String,
}

impl Section {
    pub fn new(
        state: impl Into<String>,
        municipality: impl Into<String>,
        zone: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        Self {
            state: state.into().to_ascii_lowercase(),
            municipality: municipality.into(),
            zone: zone.into(),
            section: section.into(),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.state, self.municipality, self.zone, self.section
        )
    }
}

/// Authority round code ("pleito"), e.g. `406` for the 2022 first round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundCode(String);

impl RoundCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Round number (1 or 2). Unknown codes count as the first round.
    pub fn number(&self) -> u8 {
        catalog::round_number(&self.0)
    }
}

impl fmt::Display for RoundCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoundCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Primary key of a compiled section: `{round}T/{state}/{municipality}/{zone}/{section}`.
///
/// Two rounds of the same election share the administrative identity but
/// never the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(round: u8, section: &Section) -> Self {
        Self(format!(
            "{round}T/{}/{}/{}/{}",
            section.state, section.municipality, section.zone, section.section
        ))
    }

    /// Wrap a key read back from the store.
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Round number encoded in the key prefix.
    pub fn round(&self) -> u8 {
        self.0
            .split_once('T')
            .and_then(|(n, _)| n.parse().ok())
            .unwrap_or(1)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One hash group from a section's manifest: files sharing a content hash.
///
/// A section can list several groups, e.g. the original machine and a
/// contingency replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    pub status: String,
    pub date: String,
    pub time: String,
    pub files: Vec<String>,
}

impl ManifestEntry {
    /// A `"0"` or empty hash means the group produced no file.
    pub fn is_placeholder(&self) -> bool {
        is_placeholder_hash(&self.hash)
    }
}

pub fn is_placeholder_hash(hash: &str) -> bool {
    let hash = hash.trim();
    hash.is_empty() || hash == "0"
}

/// A ballot file waiting to be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub section_dir: PathBuf,
    pub ballot_file: PathBuf,
    pub id: SectionId,
}
