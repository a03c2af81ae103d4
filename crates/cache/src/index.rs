//! The cache index: producer outputs, their variants, and pending deletions
//!
//! The index maps producer keys to [`CacheEntry`] values and keeps at most
//! `entry_capacity` of them. When a new producer output arrives at capacity,
//! the lowest-ranked entries are evicted together with all their variants.
//! Variant-level evictions inside an entry surface here as well.
//!
//! Eviction only touches in-memory maps. Everything evicted is recorded until
//! [`CacheIndex::cleanup`] hands it to the caller, who deletes the payload
//! files whenever it suits them (see [`crate::purge`]). The index itself never
//! deletes files, so a deletion can never race a read it is serving.
//!
//! The index is single-owner. Callers sharing it across threads must guard
//! `find_file`, `insert` and `cleanup` with one lock.

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, ProducerIdentity, Variant};
use crate::fs::{Filesystem, StdFilesystem};
use crate::key;
use crate::ordering;
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Variants evicted from one producer entry, awaiting physical deletion.
#[derive(Debug, Clone)]
pub struct EvictedEntry {
    /// Key of the producer entry the variants belonged to
    pub producer_key: String,
    /// Identity of that producer entry
    pub identity: ProducerIdentity,
    /// The evicted variants
    pub variants: Vec<Variant>,
}

/// A payload file that may now be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedFile {
    /// Composite key (`<producer_key>.<variant_key>`) the file was cached under
    pub key: String,
    /// Absolute path of the payload file
    pub path: PathBuf,
}

/// Point-in-time counters of an index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of producer entries
    pub entries: usize,
    /// Number of variants across all entries
    pub variants: usize,
    /// Number of payload files waiting for cleanup
    pub pending_deletions: usize,
}

/// Capacity-bounded index of cached artifacts.
#[derive(Debug)]
pub struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
    pending_evicted: Vec<EvictedEntry>,
    cache_folder: PathBuf,
    caching_enabled: bool,
    variant_capacity: usize,
    entry_capacity: usize,
    next_sequence: u64,
}

impl CacheIndex {
    /// Create an index on the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero capacities. A cache folder that
    /// cannot be created is not an error: the index starts disabled instead.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_filesystem(config, &StdFilesystem)
    }

    /// Create an index, preparing the cache folder through `fs`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero capacities.
    pub fn with_filesystem(config: CacheConfig, fs: &dyn Filesystem) -> Result<Self> {
        config.validate()?;

        let caching_enabled = config.enabled && prepare_folder(fs, &config.cache_folder);

        tracing::debug!(
            cache_folder = %config.cache_folder.display(),
            caching_enabled,
            variant_capacity = config.variant_capacity,
            entry_capacity = config.entry_capacity,
            "Cache index created"
        );

        Ok(Self {
            entries: HashMap::new(),
            pending_evicted: Vec::new(),
            cache_folder: config.cache_folder,
            caching_enabled,
            variant_capacity: config.variant_capacity,
            entry_capacity: config.entry_capacity,
            next_sequence: 0,
        })
    }

    /// Folder all payload paths are resolved against
    #[must_use]
    pub fn cache_folder(&self) -> &Path {
        &self.cache_folder
    }

    /// Whether insertions and lookups are currently served
    #[must_use]
    pub fn caching_enabled(&self) -> bool {
        self.caching_enabled
    }

    /// Stop serving insertions and lookups. Cached entries are kept.
    pub fn disable(&mut self) {
        self.caching_enabled = false;
    }

    /// Resume caching if the cache folder exists or can be created.
    ///
    /// Returns whether caching is enabled afterwards.
    pub fn enable(&mut self, fs: &dyn Filesystem) -> bool {
        self.caching_enabled = prepare_folder(fs, &self.cache_folder);
        self.caching_enabled
    }

    /// Number of producer entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no producer entry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry exists for `producer_key`
    #[must_use]
    pub fn entry_exists(&self, producer_key: &str) -> bool {
        self.entries.contains_key(producer_key)
    }

    /// Inspect an entry without counting an access
    #[must_use]
    pub fn entry(&self, producer_key: &str) -> Option<&CacheEntry> {
        self.entries.get(producer_key)
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.entries.len(),
            variants: self.entries.values().map(CacheEntry::len).sum(),
            pending_deletions: self.pending_evicted.iter().map(|e| e.variants.len()).sum(),
        }
    }

    /// Look up the payload file cached for a producer configuration.
    ///
    /// The variant key is derived exactly as [`CacheIndex::insert`] derives
    /// it, so the state fingerprint must be the one used at insertion. Pass
    /// `""` when no state fingerprint is known; that only matches variants
    /// inserted with an empty state fingerprint.
    ///
    /// Returns `None` when caching is disabled, either identity string is
    /// empty, or nothing is cached.
    pub fn find_file(
        &mut self,
        producer_type: &str,
        output_name: &str,
        inport_fingerprint: &str,
        state_fingerprint: &str,
    ) -> Option<PathBuf> {
        if !self.caching_enabled || producer_type.is_empty() || output_name.is_empty() {
            return None;
        }

        let producer_key = key::producer_key(producer_type, output_name);
        let Some(entry) = self.entries.get_mut(&producer_key) else {
            tracing::debug!(producer_key = %producer_key, "Cache miss: unknown producer");
            return None;
        };
        entry.record_access();

        let variant_key = key::variant_key(inport_fingerprint, state_fingerprint);
        match entry.find(&variant_key) {
            Some(file_path) => {
                let path = self.cache_folder.join(file_path);
                tracing::debug!(
                    producer_key = %producer_key,
                    variant_key = %variant_key,
                    path = %path.display(),
                    "Cache hit"
                );
                Some(path)
            }
            None => {
                tracing::debug!(
                    producer_key = %producer_key,
                    variant_key = %variant_key,
                    "Cache miss: unknown variant"
                );
                None
            }
        }
    }

    /// Record a payload file for a producer configuration.
    ///
    /// `file_path` is relative to the cache folder and must be unique per
    /// variant. Re-inserting known fingerprints keeps the first path.
    ///
    /// Returns the composite key, or `None` when caching is disabled or the
    /// producer identity is incomplete.
    pub fn insert(
        &mut self,
        producer: &ProducerIdentity,
        inport_fingerprint: &str,
        state_fingerprint: &str,
        file_path: impl Into<PathBuf>,
    ) -> Option<String> {
        if !self.caching_enabled || !producer.is_valid() {
            return None;
        }

        let producer_key = producer.producer_key();
        if !self.entries.contains_key(&producer_key) && self.entries.len() >= self.entry_capacity
        {
            self.evict_entries();
        }

        let entry = self
            .entries
            .entry(producer_key.clone())
            .or_insert_with(|| {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                CacheEntry::new(producer.clone(), self.variant_capacity, sequence)
            });

        let variant_key = entry.insert(inport_fingerprint, state_fingerprint, file_path);
        let evicted = entry.drain_evicted();
        if !evicted.is_empty() {
            self.pending_evicted.push(EvictedEntry {
                producer_key: producer_key.clone(),
                identity: entry.identity().clone(),
                variants: evicted,
            });
        }

        tracing::debug!(
            producer_key = %producer_key,
            variant_key = %variant_key,
            "Cached variant"
        );
        Some(key::composite_key(&producer_key, &variant_key))
    }

    /// Count an access to a cached variant without resolving its path.
    ///
    /// Returns whether the variant exists.
    pub fn touch(
        &mut self,
        producer_type: &str,
        output_name: &str,
        inport_fingerprint: &str,
        state_fingerprint: &str,
    ) -> bool {
        if !self.caching_enabled {
            return false;
        }
        let producer_key = key::producer_key(producer_type, output_name);
        self.entries.get_mut(&producer_key).is_some_and(|entry| {
            entry.touch(&key::variant_key(inport_fingerprint, state_fingerprint))
        })
    }

    /// Take every payload file evicted since the previous cleanup.
    ///
    /// Each returned file is reported exactly once. Deleting the files is up
    /// to the caller.
    pub fn cleanup(&mut self) -> Vec<EvictedFile> {
        let files: Vec<EvictedFile> = std::mem::take(&mut self.pending_evicted)
            .into_iter()
            .flat_map(|evicted| {
                let folder = &self.cache_folder;
                evicted.variants.into_iter().map(move |variant| EvictedFile {
                    key: key::composite_key(&evicted.producer_key, variant.key()),
                    path: folder.join(variant.file_path()),
                })
            })
            .collect();

        if !files.is_empty() {
            tracing::debug!(count = files.len(), "Handing evicted files to cleanup");
        }
        files
    }

    fn evict_entries(&mut self) {
        let excess = self.entries.len() + 1 - self.entry_capacity;
        for producer_key in ordering::select_victims(&self.entries, excess) {
            if let Some(entry) = self.entries.remove(&producer_key) {
                tracing::info!(
                    producer_key = %producer_key,
                    access_count = entry.access_count(),
                    variants = entry.len(),
                    "Evicting cache entry"
                );
                let identity = entry.identity().clone();
                self.pending_evicted.push(EvictedEntry {
                    producer_key,
                    identity,
                    variants: entry.into_variants(),
                });
            }
        }
    }
}

/// Make sure the cache folder exists, logging why caching is disabled if not.
fn prepare_folder(fs: &dyn Filesystem, folder: &Path) -> bool {
    if fs.directory_exists(folder) || fs.create_directory(folder) {
        return true;
    }
    tracing::warn!(
        cache_folder = %folder.display(),
        "Cache folder is unavailable; caching disabled"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    struct ReadOnlyFilesystem;

    impl Filesystem for ReadOnlyFilesystem {
        fn directory_exists(&self, _path: &Path) -> bool {
            false
        }

        fn create_directory(&self, _path: &Path) -> bool {
            false
        }

        fn remove_file(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    fn index(temp: &TempDir, variants: usize, entries: usize) -> CacheIndex {
        let config = CacheConfig::default()
            .with_cache_folder(temp.path())
            .with_variant_capacity(variants)
            .with_entry_capacity(entries);
        CacheIndex::new(config).unwrap()
    }

    fn producer(name: &str) -> ProducerIdentity {
        ProducerIdentity::new(name, format!("{name}1"), "out", "Volume")
    }

    // ==========================================================================
    // Construction tests
    // ==========================================================================

    #[test]
    fn creates_missing_cache_folder() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("nested/cache");
        let index = CacheIndex::new(CacheConfig::default().with_cache_folder(&folder)).unwrap();
        assert!(index.caching_enabled());
        assert!(folder.is_dir());
    }

    #[test]
    fn zero_capacity_fails_fast() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig::default()
            .with_cache_folder(temp.path())
            .with_entry_capacity(0);
        assert!(CacheIndex::new(config).is_err());
    }

    #[test]
    fn unavailable_folder_disables_cache() {
        let mut index =
            CacheIndex::with_filesystem(CacheConfig::default(), &ReadOnlyFilesystem).unwrap();
        assert!(!index.caching_enabled());
        assert!(index.insert(&producer("P"), "cfg", "state", "a.dat").is_none());
        assert!(index.is_empty());
        assert!(!index.enable(&ReadOnlyFilesystem));
    }

    #[test]
    fn disabled_by_config_never_probes_folder() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("never-created");
        let config = CacheConfig::default()
            .with_cache_folder(&folder)
            .with_enabled(false);
        let index = CacheIndex::new(config).unwrap();
        assert!(!index.caching_enabled());
        assert!(!folder.exists());
    }

    // ==========================================================================
    // find_file / insert tests
    // ==========================================================================

    #[test]
    fn round_trip_resolves_against_cache_folder() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        let key = index
            .insert(
                &ProducerIdentity::new("P", "proc1", "out", "Volume"),
                "cfgA",
                "stateA",
                "file1.dat",
            )
            .unwrap();

        assert_eq!(key, "Producer{P}.Output{out}.Inport{cfgA}.State{stateA}");
        assert_eq!(
            index.find_file("P", "out", "cfgA", "stateA"),
            Some(temp.path().join("file1.dat"))
        );
    }

    #[test]
    fn placeholder_state_only_matches_empty_state() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        index.insert(&producer("P"), "cfgA", "stateA", "a.dat");
        assert!(index.find_file("P", "out", "cfgA", "").is_none());

        index.insert(&producer("P"), "cfgB", "", "b.dat");
        assert!(index.find_file("P", "out", "cfgB", "").is_some());
    }

    #[test]
    fn unknown_producer_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        assert!(index.find_file("UnknownType", "out", "cfg", "").is_none());
    }

    #[test]
    fn empty_identity_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        let incomplete = ProducerIdentity::new("", "inst", "out", "Volume");
        assert!(index.insert(&incomplete, "cfg", "s", "a.dat").is_none());
        assert!(index.is_empty());
        assert!(index.find_file("", "out", "cfg", "s").is_none());
        assert!(index.find_file("P", "", "cfg", "s").is_none());
    }

    #[test]
    fn lookup_counts_entry_access_even_on_variant_miss() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        let p = producer("P");
        index.insert(&p, "cfg", "s", "a.dat");
        let before = index.entry(&p.producer_key()).unwrap().access_count();

        assert!(index.find_file("P", "out", "other", "s").is_none());
        assert_eq!(
            index.entry(&p.producer_key()).unwrap().access_count(),
            before + 1
        );
    }

    #[test]
    fn disabling_hides_existing_entries() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        index.insert(&producer("P"), "cfg", "s", "a.dat");
        index.disable();
        assert!(index.find_file("P", "out", "cfg", "s").is_none());
        assert!(index.insert(&producer("Q"), "cfg", "s", "b.dat").is_none());

        assert!(index.enable(&StdFilesystem));
        assert!(index.find_file("P", "out", "cfg", "s").is_some());
    }

    #[test]
    fn touch_reports_presence() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        index.insert(&producer("P"), "cfg", "s", "a.dat");
        assert!(index.touch("P", "out", "cfg", "s"));
        assert!(!index.touch("P", "out", "cfg", "other"));
        assert!(!index.touch("Q", "out", "cfg", "s"));
    }

    // ==========================================================================
    // Eviction and cleanup tests
    // ==========================================================================

    #[test]
    fn variant_eviction_surfaces_in_cleanup() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 2, 4);
        let p = producer("P");
        index.insert(&p, "a", "s", "a.dat");
        index.insert(&p, "b", "s", "b.dat");
        index.find_file("P", "out", "b", "s");
        index.insert(&p, "c", "s", "c.dat");

        assert_eq!(index.stats().pending_deletions, 1);
        let files = index.cleanup();
        assert_eq!(
            files,
            vec![EvictedFile {
                key: "Producer{P}.Output{out}.Inport{a}.State{s}".to_string(),
                path: temp.path().join("a.dat"),
            }]
        );
        assert!(index.cleanup().is_empty());
        assert!(index.entry_exists(&p.producer_key()));
    }

    #[test]
    fn entry_eviction_removes_all_variants() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 2);
        index.insert(&producer("A"), "x", "s", "a1.dat");
        index.insert(&producer("A"), "y", "s", "a2.dat");
        index.insert(&producer("B"), "x", "s", "b1.dat");
        index.find_file("A", "out", "x", "s");
        index.find_file("B", "out", "x", "s");
        index.find_file("B", "out", "x", "s");

        // A: 2 inserts + 2 for one hit = 4, B: 1 insert + 4 for two hits = 5.
        index.insert(&producer("C"), "x", "s", "c1.dat");

        assert_eq!(index.len(), 2);
        assert!(!index.entry_exists(&producer("A").producer_key()));
        assert!(index.entry_exists(&producer("B").producer_key()));

        let mut paths: Vec<_> = index.cleanup().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![temp.path().join("a1.dat"), temp.path().join("a2.dat")]
        );
    }

    #[test]
    fn entry_eviction_ties_evict_oldest() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 2);
        index.insert(&producer("A"), "x", "s", "a.dat");
        index.insert(&producer("B"), "x", "s", "b.dat");
        index.insert(&producer("C"), "x", "s", "c.dat");

        assert!(!index.entry_exists(&producer("A").producer_key()));
        assert!(index.entry_exists(&producer("B").producer_key()));
        assert!(index.entry_exists(&producer("C").producer_key()));
    }

    #[test]
    fn existing_producer_never_triggers_entry_eviction() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 1);
        index.insert(&producer("A"), "x", "s", "a.dat");
        index.insert(&producer("A"), "y", "s", "b.dat");
        assert_eq!(index.len(), 1);
        assert!(index.cleanup().is_empty());
    }

    #[test]
    fn stats_track_entries_and_variants() {
        let temp = TempDir::new().unwrap();
        let mut index = index(&temp, 3, 4);
        index.insert(&producer("A"), "x", "s", "a1.dat");
        index.insert(&producer("A"), "y", "s", "a2.dat");
        index.insert(&producer("B"), "x", "s", "b1.dat");
        assert_eq!(
            index.stats(),
            IndexStats {
                entries: 2,
                variants: 3,
                pending_deletions: 0,
            }
        );
    }
}
