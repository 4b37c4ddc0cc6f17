use core::{hash::Hash, num::NonZeroUsize};

use lru::LruCache;
use nonzero_ext::nonzero;
use parking_lot::Mutex;
use serde::Deserialize;
use types::{
    deneb::primitives::BlobIndex,
    phase0::primitives::{Epoch, Slot, ValidatorIndex, H256},
};

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeenCacheConfig {
    pub aggregators: NonZeroUsize,
    pub aggregates: NonZeroUsize,
    pub attesters: NonZeroUsize,
    pub blob_sidecars: NonZeroUsize,
    pub operations: NonZeroUsize,
}

impl Default for SeenCacheConfig {
    fn default() -> Self {
        Self {
            aggregators: nonzero!(16_384_usize),
            aggregates: nonzero!(16_384_usize),
            attesters: nonzero!(1_048_576_usize),
            blob_sidecars: nonzero!(1024_usize),
            operations: nonzero!(4096_usize),
        }
    }
}

pub struct SeenSet<K: Hash + Eq> {
    entries: Mutex<LruCache<K, ()>>,
}

impl<K: Hash + Eq> SeenSet<K> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains(key)
    }

    /// Returns `true` if `key` was not seen before.
    pub fn insert(&self, key: K) -> bool {
        self.entries.lock().put(key, ()).is_none()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Identities of gossip objects that have already been accepted.
///
/// Keys are only inserted after the object passes validation, so an invalid object never prevents
/// a later valid one from being accepted.
pub struct SeenCaches {
    pub aggregators: SeenSet<(Epoch, ValidatorIndex)>,
    pub aggregates: SeenSet<H256>,
    pub attesters: SeenSet<(Epoch, ValidatorIndex)>,
    pub blob_sidecars: SeenSet<(Slot, ValidatorIndex, BlobIndex)>,
    pub bls_to_execution_changes: SeenSet<ValidatorIndex>,
    pub slashed_attesters: SeenSet<ValidatorIndex>,
    pub slashed_proposers: SeenSet<ValidatorIndex>,
    pub exited_validators: SeenSet<ValidatorIndex>,
}

impl SeenCaches {
    #[must_use]
    pub fn new(config: SeenCacheConfig) -> Self {
        Self {
            aggregators: SeenSet::new(config.aggregators),
            aggregates: SeenSet::new(config.aggregates),
            attesters: SeenSet::new(config.attesters),
            blob_sidecars: SeenSet::new(config.blob_sidecars),
            bls_to_execution_changes: SeenSet::new(config.operations),
            slashed_attesters: SeenSet::new(config.operations),
            slashed_proposers: SeenSet::new(config.operations),
            exited_validators: SeenSet::new(config.operations),
        }
    }
}

impl Default for SeenCaches {
    fn default() -> Self {
        Self::new(SeenCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_reports_new_key() {
        let seen = SeenSet::new(nonzero!(2_usize));

        assert!(seen.insert(1));
        assert!(!seen.insert(1));
        assert!(seen.contains(&1));
    }

    #[test]
    fn oldest_keys_are_forgotten() {
        let seen = SeenSet::new(nonzero!(2_usize));

        seen.insert(1);
        seen.insert(2);
        seen.insert(3);

        assert!(!seen.contains(&1));
        assert!(seen.contains(&3));
        assert_eq!(seen.len(), 2);
    }
}
