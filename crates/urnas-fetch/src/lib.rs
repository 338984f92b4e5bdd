//! Network side of the harvest: a rate-limited retrying client, the
//! authority's resource hierarchy, and the per-state download scheduler.

pub mod client;
mod error;
pub mod limiter;
pub mod navigator;
pub mod orchestrator;

pub use client::{ClientOptions, DownloadOutcome, Fetcher, RateLimitedClient, RetryPolicy};
pub use error::FetchError;
pub use limiter::RateLimiter;
pub use navigator::{ElectionCatalog, ResourceNavigator, StateManifest};
pub use orchestrator::{DownloadOrchestrator, DownloadRequest, DownloadStats};
