//! Capacity-bounded cache index for pipeline-stage artifacts
//!
//! This crate lets a pipeline stage skip recomputation when it runs again with
//! a configuration it has already seen. It maps identity keys derived from a
//! producer and its configuration to payload files stored in a cache folder,
//! while bounding how many payloads are kept.
//!
//! # Overview
//!
//! - [`key`] derives producer keys and variant keys from opaque identity strings
//! - [`CacheEntry`] holds the variants of one producer output
//! - [`CacheIndex`] holds the entries and evicts the least valuable ones
//! - [`purge`](purge::purge) deletes evicted payload files, outside the index
//!
//! # Eviction
//!
//! Both levels evict by lowest access count first, then oldest creation time.
//! Evicted payloads are not deleted by the index: they are collected until
//! [`CacheIndex::cleanup`] returns them to the caller.
//!
//! ```rust,no_run
//! use stagecache::{CacheConfig, CacheIndex, ProducerIdentity, purge};
//!
//! let config = CacheConfig::default().with_env_overrides()?;
//! let mut index = CacheIndex::new(config)?;
//!
//! let producer = ProducerIdentity::new("VolumeSource", "source1", "volume", "Volume");
//! if index.find_file("VolumeSource", "volume", "cfgA", "stateA").is_none() {
//!     // ... compute and write `volume-cfgA.dat` into the cache folder ...
//!     index.insert(&producer, "cfgA", "stateA", "volume-cfgA.dat");
//! }
//!
//! let report = purge::purge(&stagecache::StdFilesystem, index.cleanup());
//! assert!(report.is_complete());
//! # Ok::<(), stagecache::Error>(())
//! ```

pub mod config;
pub mod entry;
mod error;
pub mod fs;
pub mod index;
pub mod key;
pub mod ordering;
pub mod purge;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use config::CacheConfig;
pub use entry::{CacheEntry, ProducerIdentity, Variant};
pub use fs::{Filesystem, StdFilesystem};
pub use index::{CacheIndex, EvictedEntry, EvictedFile, IndexStats};
pub use purge::PurgeReport;
