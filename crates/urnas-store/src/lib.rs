//! Storage layer: a DuckDB primary file owned by one writer, published to
//! readers through atomically replaced snapshot copies.

mod error;
mod queries;
mod reader;
pub mod rows;
mod store;

pub use error::StoreError;
pub use queries::{RoundCount, StoreSummary};
pub use reader::SnapshotReader;
pub use rows::{IssueRow, OfficeTotalRow, SectionRecord, SectionRow, VoteRow};
pub use store::{SnapshotStore, UpsertOutcome};
