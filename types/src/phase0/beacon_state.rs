use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::phase0::{
    containers::{Checkpoint, Fork},
    primitives::{CommitteeIndex, Epoch, Gwei, PublicKeyBytes, Slot, ValidatorIndex, H256},
};

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

/// Read-only view of a beacon state as produced by the state transition.
///
/// Committees and proposers are filled in by the state transition for the epochs the state covers.
/// Nothing in this subsystem computes shufflings.
#[derive(Clone, Default, Debug)]
pub struct BeaconState {
    pub slot: Slot,
    pub genesis_validators_root: H256,
    pub fork: Fork,
    pub validators: Vec<Validator>,
    pub finalized_checkpoint: Checkpoint,
    pub committees: BTreeMap<(Slot, CommitteeIndex), Vec<ValidatorIndex>>,
    pub proposers: BTreeMap<Slot, ValidatorIndex>,
}

impl BeaconState {
    #[must_use]
    pub fn validator(&self, validator_index: ValidatorIndex) -> Option<&Validator> {
        let index = usize::try_from(validator_index).ok()?;
        self.validators.get(index)
    }

    #[must_use]
    pub fn beacon_committee(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Option<&[ValidatorIndex]> {
        self.committees
            .get(&(slot, committee_index))
            .map(Vec::as_slice)
    }

    #[must_use]
    pub fn committee_count_at_slot(&self, slot: Slot) -> u64 {
        let count = self
            .committees
            .range((slot, CommitteeIndex::MIN)..=(slot, CommitteeIndex::MAX))
            .count();

        count as u64
    }

    #[must_use]
    pub fn proposer_index(&self, slot: Slot) -> Option<ValidatorIndex> {
        self.proposers.get(&slot).copied()
    }
}
