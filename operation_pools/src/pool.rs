use core::fmt::Debug;
use std::sync::Arc;

use anyhow::{ensure, Result};
use hashlink::LinkedHashMap;
use helper_functions::{predicates, verifier::NullVerifier};
use log::debug;
use parking_lot::RwLock;
use prometheus_metrics::Metrics;
use thiserror::Error;
use types::{
    capella::containers::SignedBlsToExecutionChange,
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{ProposerSlashing, SignedVoluntaryExit},
        primitives::ValidatorIndex,
    },
};

// Maps that shrink below this many entries after having reached it are rebuilt.
const DEFAULT_CYCLE_THRESHOLD: usize = 1024;

/// Validator-submitted object kept in an [`OperationPool`].
///
/// At most one operation per validator is kept in a pool.
pub trait PoolOperation: Clone + Debug + Send + Sync + 'static {
    const NAME: &'static str;

    fn validator_index(&self) -> ValidatorIndex;

    /// Checks that the operation is still valid for inclusion in a block built on `state`.
    ///
    /// Signatures are not checked. Operations are only inserted after their signatures have been
    /// verified.
    fn validate_for_inclusion(&self, config: &Config, state: &BeaconState) -> Result<()>;
}

impl PoolOperation for SignedBlsToExecutionChange {
    const NAME: &'static str = "bls_to_execution_change";

    fn validator_index(&self) -> ValidatorIndex {
        self.message.validator_index
    }

    fn validate_for_inclusion(&self, config: &Config, state: &BeaconState) -> Result<()> {
        predicates::validate_bls_to_execution_change(config, state, *self, NullVerifier)
    }
}

impl PoolOperation for SignedVoluntaryExit {
    const NAME: &'static str = "voluntary_exit";

    fn validator_index(&self) -> ValidatorIndex {
        self.message.validator_index
    }

    fn validate_for_inclusion(&self, config: &Config, state: &BeaconState) -> Result<()> {
        predicates::validate_voluntary_exit(config, state, *self, NullVerifier)
    }
}

impl PoolOperation for ProposerSlashing {
    const NAME: &'static str = "proposer_slashing";

    fn validator_index(&self) -> ValidatorIndex {
        self.signed_header_1.message.proposer_index
    }

    fn validate_for_inclusion(&self, config: &Config, state: &BeaconState) -> Result<()> {
        predicates::validate_proposer_slashing(config, state, *self, NullVerifier)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{pool} pool stores operation for validator {stored_for} under key {key}")]
    KeyMismatch {
        pool: &'static str,
        key: ValidatorIndex,
        stored_for: ValidatorIndex,
    },
}

pub struct OperationPool<T> {
    operations: RwLock<Operations<T>>,
    cycle_threshold: usize,
    metrics: Option<Arc<Metrics>>,
}

struct Operations<T> {
    // Iterates in insertion order.
    by_validator: LinkedHashMap<ValidatorIndex, T>,
    peak_len: usize,
}

impl<T: PoolOperation> OperationPool<T> {
    #[must_use]
    pub fn new(metrics: Option<Arc<Metrics>>) -> Self {
        Self::with_cycle_threshold(DEFAULT_CYCLE_THRESHOLD, metrics)
    }

    #[must_use]
    pub fn with_cycle_threshold(cycle_threshold: usize, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            operations: RwLock::new(Operations {
                by_validator: LinkedHashMap::new(),
                peak_len: 0,
            }),
            cycle_threshold,
            metrics,
        }
    }

    /// Adds `operation` unless the pool already has one for the same validator.
    ///
    /// Returns `true` if `operation` was added.
    pub fn insert(&self, operation: T) -> bool {
        let validator_index = operation.validator_index();

        let len = {
            let mut operations = self.operations.write();

            if operations.by_validator.contains_key(&validator_index) {
                return false;
            }

            operations.by_validator.insert(validator_index, operation);
            operations.peak_len = operations.peak_len.max(operations.by_validator.len());
            operations.by_validator.len()
        };

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_pool_insertion(T::NAME);
            metrics.set_collection_length(module_path!(), T::NAME, len);
        }

        true
    }

    /// Returns every operation in insertion order.
    pub fn pending_all(&self) -> Result<Vec<T>> {
        let operations = self.operations.read();

        operations
            .by_validator
            .iter()
            .map(|(key, operation)| {
                let stored_for = operation.validator_index();

                ensure!(
                    *key == stored_for,
                    Error::KeyMismatch {
                        pool: T::NAME,
                        key: *key,
                        stored_for,
                    },
                );

                Ok(operation.clone())
            })
            .collect()
    }

    /// Returns up to `limit` operations valid for `state`, most recently inserted first.
    ///
    /// Operations found to be invalid are removed from the pool.
    pub fn for_inclusion(&self, config: &Config, state: &BeaconState, limit: usize) -> Vec<T> {
        let mut operations = self.operations.write();
        let mut selected = Vec::with_capacity(limit.min(operations.by_validator.len()));
        let mut invalid = vec![];

        for (validator_index, operation) in operations.by_validator.iter().rev() {
            if selected.len() >= limit {
                break;
            }

            match operation.validate_for_inclusion(config, state) {
                Ok(()) => selected.push(operation.clone()),
                Err(error) => {
                    debug!(
                        "discarding {} for validator {validator_index} \
                         that is no longer valid: {error}",
                        T::NAME,
                    );

                    invalid.push(*validator_index);
                }
            }
        }

        for validator_index in invalid {
            self.remove(&mut operations, validator_index);
        }

        selected
    }

    /// Removes the operation submitted by the same validator as `operation`, if there is one.
    pub fn mark_included(&self, operation: &T) {
        let mut operations = self.operations.write();
        self.remove(&mut operations, operation.validator_index());
    }

    #[must_use]
    pub fn exists(&self, validator_index: ValidatorIndex) -> bool {
        self.operations
            .read()
            .by_validator
            .contains_key(&validator_index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.read().by_validator.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, operations: &mut Operations<T>, validator_index: ValidatorIndex) {
        if operations.by_validator.remove(&validator_index).is_none() {
            return;
        }

        let len = operations.by_validator.len();

        // `LinkedHashMap` never releases capacity on removal.
        if len < self.cycle_threshold && operations.peak_len >= self.cycle_threshold {
            operations.by_validator = core::mem::take(&mut operations.by_validator)
                .into_iter()
                .collect();

            operations.peak_len = len;

            if let Some(metrics) = self.metrics.as_ref() {
                metrics.register_pool_map_cycle(T::NAME);
            }
        }

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_collection_length(module_path!(), T::NAME, len);
        }
    }

    #[cfg(test)]
    fn peak_len(&self) -> usize {
        self.operations.read().peak_len
    }
}

#[cfg(test)]
mod tests {
    use helper_functions::misc;
    use types::{
        capella::containers::BlsToExecutionChange,
        phase0::{
            beacon_state::Validator,
            consts::FAR_FUTURE_EPOCH,
            primitives::{ExecutionAddress, PublicKeyBytes, SignatureBytes, H256},
        },
    };

    use super::*;

    fn change(validator_index: ValidatorIndex, address_byte: u8) -> SignedBlsToExecutionChange {
        SignedBlsToExecutionChange {
            message: BlsToExecutionChange {
                validator_index,
                from_bls_pubkey: public_key(validator_index),
                to_execution_address: ExecutionAddress::repeat_byte(address_byte),
            },
            signature: SignatureBytes::zero(),
        }
    }

    fn public_key(validator_index: ValidatorIndex) -> PublicKeyBytes {
        PublicKeyBytes::from_low_u64_be(validator_index + 1)
    }

    fn state(validator_count: u64) -> BeaconState {
        let validators = (0..validator_count)
            .map(|validator_index| {
                let pubkey = public_key(validator_index);

                Validator {
                    pubkey,
                    withdrawal_credentials: misc::bls_withdrawal_credentials(pubkey),
                    exit_epoch: FAR_FUTURE_EPOCH,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                    ..Validator::default()
                }
            })
            .collect();

        BeaconState {
            validators,
            ..BeaconState::default()
        }
    }

    #[test]
    fn first_submission_for_validator_wins() -> Result<()> {
        let pool = OperationPool::new(None);

        assert!(pool.insert(change(3, 1)));
        assert!(!pool.insert(change(3, 2)));

        assert_eq!(pool.pending_all()?, [change(3, 1)]);

        Ok(())
    }

    #[test]
    fn mark_included_removes_exactly_one_operation() -> Result<()> {
        let pool = OperationPool::new(None);

        for validator_index in 0..4 {
            pool.insert(change(validator_index, 0));
        }

        pool.mark_included(&change(2, 0));
        pool.mark_included(&change(2, 0));

        assert!(!pool.exists(2));
        assert!(pool.exists(1));
        assert_eq!(pool.pending_all()?, [change(0, 0), change(1, 0), change(3, 0)]);

        Ok(())
    }

    #[test]
    fn for_inclusion_returns_newest_first_up_to_limit() {
        let config = Config::mainnet();
        let state = state(10);
        let pool = OperationPool::new(None);

        for validator_index in 0..5 {
            pool.insert(change(validator_index, 0));
        }

        let selected = pool.for_inclusion(&config, &state, 3);

        assert_eq!(selected, [change(4, 0), change(3, 0), change(2, 0)]);
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn for_inclusion_discards_operations_that_became_invalid() {
        let config = Config::mainnet();
        let mut state = state(10);
        let pool = OperationPool::new(None);

        for validator_index in 0..3 {
            pool.insert(change(validator_index, 0));
        }

        // Validator 1 already changed its credentials in a block.
        state.validators[1].withdrawal_credentials = H256::repeat_byte(1);

        let selected = pool.for_inclusion(&config, &state, 10);

        assert_eq!(selected, [change(2, 0), change(0, 0)]);
        assert!(!pool.exists(1));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn map_is_cycled_after_shrinking_below_threshold() {
        let pool = OperationPool::with_cycle_threshold(4, None);

        for validator_index in 0..5 {
            pool.insert(change(validator_index, 0));
        }

        assert_eq!(pool.peak_len(), 5);

        pool.mark_included(&change(0, 0));

        assert_eq!(pool.peak_len(), 5);

        pool.mark_included(&change(1, 0));

        assert_eq!(pool.peak_len(), 3);
        assert_eq!(pool.len(), 3);
        assert!(pool.exists(4));
    }
}
