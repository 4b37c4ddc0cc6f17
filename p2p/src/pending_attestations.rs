//! Attestations waiting for the block they vote for.
//!
//! Aggregates and attestations can arrive before the block referenced by
//! `data.beacon_block_root`. They cannot be validated without the state after that block, so they
//! are kept here until the block is imported or the entries become too old to matter.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use log::debug;
use parking_lot::RwLock;
use prometheus_metrics::Metrics;
use serde::Deserialize;
use types::{
    config::Config,
    encoding::HashTreeRoot as _,
    phase0::{
        containers::{Attestation, AttestationData, SignedAggregateAndProof},
        primitives::{Slot, SubnetId, ValidatorIndex, H256},
    },
};

use crate::gossip::PubsubMessage;

pub const DEFAULT_CAPACITY: usize = 16_384;
pub const DEFAULT_PRUNE_TOLERANCE: u64 = 2;

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PendingConfig {
    pub capacity: usize,
    // Slots kept past the one epoch horizon.
    pub prune_tolerance: u64,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            prune_tolerance: DEFAULT_PRUNE_TOLERANCE,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PendingAttestation {
    Aggregate(Box<SignedAggregateAndProof>),
    Singular(SubnetId, Box<Attestation>),
}

impl PendingAttestation {
    #[must_use]
    pub fn data(&self) -> AttestationData {
        match self {
            Self::Aggregate(aggregate_and_proof) => aggregate_and_proof.message.aggregate.data,
            Self::Singular(_, attestation) => attestation.data,
        }
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.data().slot
    }

    #[must_use]
    pub fn block_root(&self) -> H256 {
        self.data().beacon_block_root
    }

    #[must_use]
    pub fn into_pubsub_message(self) -> PubsubMessage {
        match self {
            Self::Aggregate(aggregate_and_proof) => {
                PubsubMessage::AggregateAndProof(aggregate_and_proof)
            }
            Self::Singular(subnet_id, attestation) => {
                PubsubMessage::Attestation(subnet_id, attestation)
            }
        }
    }

    fn guard(&self) -> Guard {
        match self {
            Self::Aggregate(aggregate_and_proof) => {
                Guard::Aggregator(aggregate_and_proof.message.aggregator_index)
            }
            Self::Singular(_, attestation) => Guard::Attestation(attestation.hash_tree_root()),
        }
    }
}

// At most one entry per aggregator or identical attestation under the same root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Guard {
    Aggregator(ValidatorIndex),
    Attestation(H256),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Insertion {
    Queued,
    Duplicate,
    Full,
}

#[derive(Default)]
struct Entries {
    // Entries under each root are kept in insertion order.
    by_root: HashMap<H256, Vec<PendingAttestation>>,
    guards: HashSet<(H256, Guard)>,
    len: usize,
}

pub struct PendingAttestations {
    entries: RwLock<Entries>,
    capacity: usize,
    prune_tolerance: u64,
    metrics: Option<Arc<Metrics>>,
}

impl PendingAttestations {
    #[must_use]
    pub fn new(config: PendingConfig, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: config.capacity,
            prune_tolerance: config.prune_tolerance,
            metrics,
        }
    }

    pub fn insert(&self, attestation: PendingAttestation) -> Insertion {
        let block_root = attestation.block_root();
        let guard = attestation.guard();

        let insertion = {
            let mut entries = self.entries.write();

            if entries.len >= self.capacity {
                Insertion::Full
            } else if !entries.guards.insert((block_root, guard)) {
                Insertion::Duplicate
            } else {
                entries.by_root.entry(block_root).or_default().push(attestation);
                entries.len += 1;
                Insertion::Queued
            }
        };

        match insertion {
            Insertion::Queued => self.update_metrics(),
            Insertion::Duplicate => self.register_drop("duplicate"),
            Insertion::Full => {
                debug!("pending attestation for block {block_root:?} dropped because queue is full");
                self.register_drop("full");
            }
        }

        insertion
    }

    /// Removes and returns every entry waiting for `block_root` in the order they were inserted.
    pub fn take(&self, block_root: H256) -> Vec<PendingAttestation> {
        let taken = {
            let mut entries = self.entries.write();

            let Some(taken) = entries.by_root.remove(&block_root) else {
                return vec![];
            };

            for attestation in &taken {
                entries.guards.remove(&(block_root, attestation.guard()));
            }

            entries.len -= taken.len();
            taken
        };

        self.update_metrics();

        taken
    }

    /// Drops entries more than one epoch (plus the configured tolerance) older than `current_slot`.
    ///
    /// Returns the number of entries dropped.
    pub fn prune(&self, config: &Config, current_slot: Slot) -> usize {
        let horizon = config.slots_per_epoch.get().saturating_add(self.prune_tolerance);
        let floor = current_slot.saturating_sub(horizon);

        let pruned = {
            let mut entries = self.entries.write();
            let Entries {
                by_root, guards, ..
            } = &mut *entries;

            let mut pruned = 0;

            by_root.retain(|block_root, attestations| {
                attestations.retain(|attestation| {
                    let keep = attestation.slot() >= floor;

                    if !keep {
                        guards.remove(&(*block_root, attestation.guard()));
                        pruned += 1;
                    }

                    keep
                });

                !attestations.is_empty()
            });

            entries.len -= pruned;
            pruned
        };

        if pruned > 0 {
            debug!("pruned {pruned} pending attestations older than slot {floor}");

            if let Some(metrics) = self.metrics.as_ref() {
                for _ in 0..pruned {
                    metrics.register_pending_attestation_drop("expired");
                }
            }
        }

        self.update_metrics();

        pruned
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains_root(&self, block_root: H256) -> bool {
        self.entries.read().by_root.contains_key(&block_root)
    }

    fn update_metrics(&self) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_pending_attestations(self.len());
        }
    }

    fn register_drop(&self, reason: &str) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_pending_attestation_drop(reason);
        }
    }
}
