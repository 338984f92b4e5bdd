//! Ingestion pipeline: downloaded ballot files in, compiled sections out.

mod error;
mod pipeline;
pub mod rows;
pub mod scan;

pub use error::PipelineError;
pub use pipeline::{
    IngestionPipeline, PipelineHandle, PipelineOptions, PipelineReport, PipelineState,
    PipelineStats,
};
