//! Named cache stores: persistent, URL-keyed partitions of captured
//! HTTP responses.
//!
//! A store is identified by a string name. The name doubles as the
//! version epoch: eviction happens per whole store, never per entry, when
//! a deployment ships new store names (see the lifecycle manager).

mod storage;

pub use storage::{CacheStorage, CachedEntry, MemoryStorage, SqliteStorage};
