//! On-disk layout of downloaded files: `{root}/{state}/{municipality}/{zone}/{section}/`.
//!
//! The downloader writes with [`SectionLayout::section_dir`] and the
//! compiler reads back with [`SectionLayout::section_of`], so both sides
//! must go through this type.

use std::path::{Component, Path, PathBuf};

use crate::model::{RoundCode, Section, SectionId};
use crate::naming;

#[derive(Debug, Clone)]
pub struct SectionLayout {
    root: PathBuf,
}

impl SectionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self, state: &str) -> PathBuf {
        self.root.join(state.to_ascii_lowercase())
    }

    pub fn section_dir(&self, section: &Section) -> PathBuf {
        self.state_dir(&section.state)
            .join(&section.municipality)
            .join(&section.zone)
            .join(&section.section)
    }

    /// Recover the administrative identity from a section directory.
    ///
    /// Returns `None` when the directory is not exactly four levels below the root.
    pub fn section_of(&self, section_dir: &Path) -> Option<Section> {
        let rel = section_dir.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [state, municipality, zone, section] => {
                Some(Section::new(*state, *municipality, *zone, *section))
            }
            _ => None,
        }
    }

    /// Key for a ballot file without decoding it: section from the parent
    /// directory, round from the file name.
    pub fn section_id_for_ballot(&self, ballot_file: &Path) -> Option<SectionId> {
        let section = self.section_of(ballot_file.parent()?)?;
        let name = ballot_file.file_name()?.to_str()?;
        let round = RoundCode::new(naming::round_code_from_file_name(name)?);
        Some(SectionId::new(round.number(), &section))
    }
}
