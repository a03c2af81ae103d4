//! Per-producer cache state
//!
//! A [`CacheEntry`] owns every cached [`Variant`] of one producer output and
//! never holds more than its variant capacity. Variants pushed out
//! by that bound are parked in a pending list until the owning index drains
//! them, so that their payload files can be deleted later.

use crate::key;
use crate::ordering::{self, EvictionRank, Evictable};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Identity of the producer output whose results are cached.
///
/// Only `producer_type` and `output_name` take part in key derivation; the
/// instance name and payload type are carried for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerIdentity {
    /// Type name of the producer (e.g. `"VolumeSource"`)
    pub producer_type: String,
    /// Instance name of the producer within the pipeline
    pub producer_instance_name: String,
    /// Name of the cached output
    pub output_name: String,
    /// Type of the payload stored for this output
    pub payload_type: String,
}

impl ProducerIdentity {
    /// Create a new producer identity
    #[must_use]
    pub fn new(
        producer_type: impl Into<String>,
        producer_instance_name: impl Into<String>,
        output_name: impl Into<String>,
        payload_type: impl Into<String>,
    ) -> Self {
        Self {
            producer_type: producer_type.into(),
            producer_instance_name: producer_instance_name.into(),
            output_name: output_name.into(),
            payload_type: payload_type.into(),
        }
    }

    /// Key under which this producer output is indexed
    #[must_use]
    pub fn producer_key(&self) -> String {
        key::producer_key(&self.producer_type, &self.output_name)
    }

    /// Whether the identity can address a cache entry at all
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.producer_type.is_empty() && !self.output_name.is_empty()
    }
}

/// One cached artifact of a producer.
///
/// Everything except the access counter is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    key: String,
    inport_fingerprint: String,
    state_fingerprint: String,
    file_path: PathBuf,
    created_at: DateTime<Utc>,
    sequence: u64,
    access_count: u64,
}

impl Variant {
    /// Variant key derived from the two fingerprints
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fingerprint of the configuration feeding the producer
    #[must_use]
    pub fn inport_fingerprint(&self) -> &str {
        &self.inport_fingerprint
    }

    /// Fingerprint of the producer's own state
    #[must_use]
    pub fn state_fingerprint(&self) -> &str {
        &self.state_fingerprint
    }

    /// Payload path relative to the cache folder
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// When the variant was first inserted
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of lookups and re-insertions that hit this variant
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }
}

impl Evictable for Variant {
    fn eviction_rank(&self) -> EvictionRank {
        EvictionRank {
            access_count: self.access_count,
            created_at: self.created_at,
            sequence: self.sequence,
        }
    }
}

/// Cached variants of a single producer output.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    identity: ProducerIdentity,
    capacity: usize,
    created_at: DateTime<Utc>,
    sequence: u64,
    access_count: u64,
    variants: HashMap<String, Variant>,
    pending_evicted: Vec<Variant>,
    next_variant_sequence: u64,
}

impl CacheEntry {
    /// Create an empty entry holding at most `capacity` variants.
    ///
    /// `sequence` orders this entry against its siblings when timestamps tie.
    #[must_use]
    pub fn new(identity: ProducerIdentity, capacity: usize, sequence: u64) -> Self {
        debug_assert!(capacity > 0, "variant capacity must be non-zero");
        Self {
            identity,
            capacity,
            created_at: Utc::now(),
            sequence,
            access_count: 0,
            variants: HashMap::new(),
            pending_evicted: Vec::new(),
            next_variant_sequence: 0,
        }
    }

    /// Identity of the producer output this entry caches
    #[must_use]
    pub fn identity(&self) -> &ProducerIdentity {
        &self.identity
    }

    /// Number of recorded accesses across all variants
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// When the entry was created
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of cached variants
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Whether no variant is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Whether a variant with `variant_key` is cached
    #[must_use]
    pub fn contains(&self, variant_key: &str) -> bool {
        self.variants.contains_key(variant_key)
    }

    /// Inspect a variant without counting an access
    #[must_use]
    pub fn get(&self, variant_key: &str) -> Option<&Variant> {
        self.variants.get(variant_key)
    }

    /// Iterate over the cached variants in no particular order
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.values()
    }

    /// Count an access to the entry that did not address a specific variant.
    pub(crate) fn record_access(&mut self) {
        self.access_count += 1;
    }

    /// Look up a variant, counting the access on a hit.
    ///
    /// Returns the payload path relative to the cache folder. A miss has no
    /// side effects.
    pub fn find(&mut self, variant_key: &str) -> Option<&Path> {
        let variant = self.variants.get_mut(variant_key)?;
        variant.access_count += 1;
        self.access_count += 1;
        Some(&variant.file_path)
    }

    /// Cache a variant and return its key.
    ///
    /// Inserting fingerprints that are already cached counts as an access and
    /// keeps the original payload path. Otherwise, when the entry is full, the
    /// lowest-ranked variants are evicted first so that exactly one slot is
    /// free for the new variant.
    pub fn insert(
        &mut self,
        inport_fingerprint: &str,
        state_fingerprint: &str,
        file_path: impl Into<PathBuf>,
    ) -> String {
        let variant_key = key::variant_key(inport_fingerprint, state_fingerprint);
        self.access_count += 1;

        if let Some(existing) = self.variants.get_mut(&variant_key) {
            existing.access_count += 1;
            tracing::debug!(
                producer_type = %self.identity.producer_type,
                variant_key = %variant_key,
                "Variant already cached"
            );
            return variant_key;
        }

        if self.variants.len() >= self.capacity {
            self.evict_for_insert();
        }

        let sequence = self.next_variant_sequence;
        self.next_variant_sequence += 1;
        self.variants.insert(
            variant_key.clone(),
            Variant {
                key: variant_key.clone(),
                inport_fingerprint: inport_fingerprint.to_string(),
                state_fingerprint: state_fingerprint.to_string(),
                file_path: file_path.into(),
                created_at: Utc::now(),
                sequence,
                access_count: 0,
            },
        );
        variant_key
    }

    /// Count an access to a variant without reading it.
    ///
    /// The entry counter is bumped even when the variant is unknown.
    pub fn touch(&mut self, variant_key: &str) -> bool {
        self.access_count += 1;
        match self.variants.get_mut(variant_key) {
            Some(variant) => {
                variant.access_count += 1;
                true
            }
            None => false,
        }
    }

    /// Take the variants evicted since the last drain.
    pub fn drain_evicted(&mut self) -> Vec<Variant> {
        std::mem::take(&mut self.pending_evicted)
    }

    /// Consume the entry, returning every variant it still references.
    ///
    /// Used when the whole entry is evicted: undrained evictions come first,
    /// followed by the live variants.
    #[must_use]
    pub fn into_variants(self) -> Vec<Variant> {
        let mut all = self.pending_evicted;
        all.extend(self.variants.into_values());
        all
    }

    fn evict_for_insert(&mut self) {
        let excess = self.variants.len() + 1 - self.capacity;
        for victim in ordering::select_victims(&self.variants, excess) {
            if let Some(variant) = self.variants.remove(&victim) {
                tracing::info!(
                    producer_type = %self.identity.producer_type,
                    output_name = %self.identity.output_name,
                    variant_key = %variant.key,
                    access_count = variant.access_count,
                    "Evicting cached variant"
                );
                self.pending_evicted.push(variant);
            }
        }
    }
}

impl Evictable for CacheEntry {
    fn eviction_rank(&self) -> EvictionRank {
        EvictionRank {
            access_count: self.access_count,
            created_at: self.created_at,
            sequence: self.sequence,
        }
    }
}
