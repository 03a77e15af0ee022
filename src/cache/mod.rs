//! Client-side data cache for the dashboards.
//!
//! This module provides a transport-agnostic stale-while-revalidate cache that:
//! - Keys entries by resource URL and keeps them in memory only
//! - Serves cached data immediately and refreshes stale entries in the background
//! - Shares one request between concurrent fetches of the same key
//! - Broadcasts updates, failures and invalidations to subscribers
//! - Supports optimistic writes with rollback

mod layer;
mod storage;
mod traits;

pub use layer::SwrCache;
pub use storage::MemoryStorage;
pub use traits::{remove_record, upsert_record, CacheEvent, CacheEventKind, Cacheable, FetchError};
