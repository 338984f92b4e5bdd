pub mod ballot;
pub mod catalog;
pub mod collab;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod naming;

pub use ballot::{
    BallotIdentity, BallotRecord, ElectionResult, Equipment, Office, OfficeResult, Phase,
    SchemaGeneration, SessionType, VoteKind, VoteTotals, VoteTuple,
};
pub use collab::{Enrichment, Issue, LogEvents, NoEnrichment, SectionEnricher, SectionSink, Severity};
pub use config::HarvestConfig;
pub use error::CoreError;
pub use layout::SectionLayout;
pub use model::{ManifestEntry, PendingItem, RoundCode, Section, SectionId};
