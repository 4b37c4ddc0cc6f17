use anyhow::{ensure, Result};
use itertools::{EitherOrBoth, Itertools as _};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{
            AggregationBits, Attestation, AttestationData, AttesterSlashing, IndexedAttestation,
        },
        primitives::{
            CommitteeIndex, DomainType, Epoch, PublicKeyBytes, Slot, ValidatorIndex, H256,
        },
    },
};

use crate::{error::Error, misc};

#[must_use]
pub fn get_current_epoch(config: &Config, state: &BeaconState) -> Epoch {
    misc::compute_epoch_at_slot(config, state.slot)
}

pub fn public_key(state: &BeaconState, validator_index: ValidatorIndex) -> Result<PublicKeyBytes> {
    state
        .validator(validator_index)
        .map(|validator| validator.pubkey)
        .ok_or_else(|| Error::ValidatorNotFound { validator_index }.into())
}

#[must_use]
pub fn get_domain(
    config: &Config,
    state: &BeaconState,
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> H256 {
    let epoch = epoch.unwrap_or_else(|| get_current_epoch(config, state));
    let fork = state.fork;

    let fork_version = if epoch < fork.epoch {
        fork.previous_version
    } else {
        fork.current_version
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root),
    )
}

pub fn beacon_committee(
    state: &BeaconState,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<&[ValidatorIndex]> {
    let committee_count = state.committee_count_at_slot(slot);

    ensure!(
        committee_index < committee_count,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
            committee_count,
        },
    );

    state
        .beacon_committee(slot, committee_index)
        .ok_or_else(|| {
            Error::CommitteeNotAvailable {
                slot,
                index: committee_index,
            }
            .into()
        })
}

pub fn get_attesting_indices(
    state: &BeaconState,
    attestation_data: AttestationData,
    aggregation_bits: &AggregationBits,
) -> Result<Vec<ValidatorIndex>> {
    let committee = beacon_committee(state, attestation_data.slot, attestation_data.index)?;

    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    let attesting_indices = aggregation_bits
        .iter()
        .by_vals()
        .zip(committee.iter().copied())
        .filter_map(|(present, validator_index)| present.then_some(validator_index))
        .collect();

    Ok(attesting_indices)
}

pub fn get_indexed_attestation(
    state: &BeaconState,
    attestation: &Attestation,
) -> Result<IndexedAttestation> {
    let mut attesting_indices =
        get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?;

    attesting_indices.sort_unstable();

    Ok(IndexedAttestation {
        attesting_indices,
        data: attestation.data,
        signature: attestation.signature,
    })
}

/// Validators present in both attestations of an attester slashing.
///
/// Relies on the attesting indices being sorted.
pub fn slashable_indices(
    attester_slashing: &AttesterSlashing,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    let attesting_indices_1 = attester_slashing
        .attestation_1
        .attesting_indices
        .iter()
        .copied();

    let attesting_indices_2 = attester_slashing
        .attestation_2
        .attesting_indices
        .iter()
        .copied();

    attesting_indices_1
        .merge_join_by(attesting_indices_2, Ord::cmp)
        .filter_map(|either_or_both| match either_or_both {
            EitherOrBoth::Both(validator_index, _) => Some(validator_index),
            _ => None,
        })
}
