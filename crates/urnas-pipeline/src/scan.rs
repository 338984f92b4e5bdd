//! Walk the download tree for ballot files.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use urnas_core::naming::{is_ballot_file, is_ballot_for_round};
use urnas_core::{RoundCode, SectionLayout};
use walkdir::WalkDir;

use crate::PipelineError;

/// Every ballot file under `root`, sorted by path.
pub fn find_ballot_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(is_ballot_file))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    debug!(root = %root.display(), files = files.len(), "ballot scan");
    files
}

/// Ballot files of one round inside a single section directory.
///
/// A directory that does not exist (nothing was published) yields nothing.
pub fn ballots_in_section(section_dir: &Path, round: &RoundCode) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(section_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|name| is_ballot_for_round(name, round.as_str()))
        })
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Refuse a full rebuild when the download tree is clearly incomplete.
///
/// Rebuilding clears the store first, so running it against a partial tree
/// would throw away compiled sections whose files are gone.
pub fn check_rebuild_precondition(
    layout: &SectionLayout,
    min_files: usize,
) -> Result<usize, PipelineError> {
    let found = find_ballot_files(layout.root()).len();
    if found < min_files {
        return Err(PipelineError::NotEnoughBallots {
            root: layout.root().to_path_buf(),
            found,
            required: min_files,
        });
    }
    info!(found, "rebuild precondition met");
    Ok(found)
}
