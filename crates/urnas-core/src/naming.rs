//! File naming conventions of the authority's per-section files.
//!
//! 2022 files use plain extensions (`o00406-9701200170097.bu`); from 2024
//! the kind is a dashed suffix (`o00452-...-bu.dat`).

use std::path::Path;

use crate::ballot::SchemaGeneration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Ballot result ("boletim de urna").
    Ballot,
    /// Digital vote record.
    VoteRecord,
    Log,
    BallotImage,
    Signature,
}

const V1_SUFFIXES: &[(FileKind, &str)] = &[
    (FileKind::Ballot, ".bu"),
    (FileKind::VoteRecord, ".rdv"),
    (FileKind::Log, ".logjez"),
    (FileKind::BallotImage, ".imgbu"),
    (FileKind::Signature, ".vscmr"),
];

const V2_SUFFIXES: &[(FileKind, &str)] = &[
    (FileKind::Ballot, "-bu.dat"),
    (FileKind::VoteRecord, "-rdv.dat"),
    (FileKind::Log, "-log.jez"),
    (FileKind::BallotImage, "-imgbu.dat"),
    (FileKind::Signature, "-vota.vsc"),
];

impl FileKind {
    pub fn suffix(self, generation: SchemaGeneration) -> &'static str {
        let table = match generation {
            SchemaGeneration::V1 => V1_SUFFIXES,
            SchemaGeneration::V2 => V2_SUFFIXES,
        };
        table
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("", |(_, suffix)| suffix)
    }

    /// Classify a file name by its suffix, in either generation.
    pub fn of(file_name: &str) -> Option<Self> {
        V2_SUFFIXES
            .iter()
            .chain(V1_SUFFIXES)
            .find(|(_, suffix)| file_name.ends_with(suffix))
            .map(|(kind, _)| *kind)
    }
}

/// Decide which wire generation a file uses from its name alone.
pub fn detect_generation(file_name: &str) -> SchemaGeneration {
    if file_name.ends_with(".dat") || file_name.ends_with(".vsc") {
        return SchemaGeneration::V2;
    }
    if V1_SUFFIXES.iter().any(|(_, s)| file_name.ends_with(s)) {
        return SchemaGeneration::V1;
    }
    if file_name.contains("-bu.") || file_name.contains("-rdv.") || file_name.contains("-vota.") {
        return SchemaGeneration::V2;
    }
    SchemaGeneration::V1
}

pub fn detect_generation_for_path(path: &Path) -> SchemaGeneration {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(SchemaGeneration::V1, detect_generation)
}

pub fn is_ballot_file(file_name: &str) -> bool {
    FileKind::of(file_name) == Some(FileKind::Ballot)
}

/// Round code embedded in a file name: `o00406-...` → `406`.
pub fn round_code_from_file_name(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix("o00")?;
    let code = rest.split('-').next()?;
    (!code.is_empty() && code.bytes().all(|b| b.is_ascii_digit())).then_some(code)
}

/// Ballot files of a given round inside a section directory listing.
pub fn is_ballot_for_round(file_name: &str, round_code: &str) -> bool {
    is_ballot_file(file_name) && round_code_from_file_name(file_name) == Some(round_code)
}

/// File-type filter: an entry matches by suffix, or failing that by substring.
pub fn matches_type_filter(file_name: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|f| file_name.ends_with(f.as_str()))
        || filters.iter().any(|f| file_name.contains(f.as_str()))
}
