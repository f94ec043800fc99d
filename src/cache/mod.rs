//! Offline response cache for the application shell and third-party
//! assets.
//!
//! This module provides:
//! - A generation-versioned store of captured request/response pairs
//! - A worker with install (pre-warm), activate (drop stale generations)
//!   and fetch (cache-first / stale-while-revalidate) phases
//! - Basic offline mode (serve cached bytes when the network is gone)

mod http;
mod storage;
mod types;
mod worker;

pub use http::HttpFetcher;
pub use storage::{CacheStoreError, GenerationStore, SqliteGenerations};
pub use types::{
  should_cache, Destination, Fetch, FetchError, FetchRequest, FetchResponse, Method, ResponseType,
};
pub use worker::{CacheWorker, LifecycleError, WorkerState, CACHE_GENERATION};
