//! # Member Fetching
//!
//! Tiered, circuit-guarded acquisition of large member lists from the
//! platform client, with snapshot caching, progress reporting and batched
//! post-acquisition filtering.

pub mod fetcher;
pub mod filter;
pub mod progress;
pub mod strategy;
pub mod types;

pub use fetcher::{FetchError, MemberFetcher};
pub use filter::filter_in_batches;
pub use progress::{FetchProgress, FetchStage, ProgressCallback};
pub use strategy::{FetchRequest, MemberPredicate, ResilientFetchStrategy};
pub use types::{
    AttemptOutcome, FetchAttempt, FetchMetadata, FetchResult, FetchTier, MemberCollection,
    MemberId, MemberRecord, MemberSnapshot,
};
