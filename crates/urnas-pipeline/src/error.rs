use std::path::PathBuf;

use thiserror::Error;
use urnas_ballot::DecodeError;
use urnas_store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("only {found} ballot files under {root}, rebuild needs at least {required}")]
    NotEnoughBallots {
        root: PathBuf,
        found: usize,
        required: usize,
    },

    #[error("compiler thread panicked")]
    ConsumerPanicked,

    #[error("pipeline already finished")]
    Finished,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
