use core::num::NonZeroU64;

use anyhow::{ensure, Result};
use itertools::Itertools as _;
use types::{
    capella::containers::SignedBlsToExecutionChange,
    config::Config,
    phase0::{
        beacon_state::{BeaconState, Validator},
        consts::{BLS_WITHDRAWAL_PREFIX, FAR_FUTURE_EPOCH},
        containers::{
            AttestationData, AttesterSlashing, IndexedAttestation, ProposerSlashing,
            SignedVoluntaryExit,
        },
        primitives::{Epoch, SignatureBytes, ValidatorIndex},
    },
};

use crate::{
    accessors::{self, get_current_epoch},
    error::{Error, SignatureKind},
    misc,
    signing::{SignForAllForks as _, SignForSingleFork as _},
    verifier::Verifier,
};

// > Check if ``validator`` is active.
#[inline]
#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

// > Check if ``validator`` is slashable.
#[inline]
#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && epoch < validator.withdrawable_epoch
        && validator.activation_epoch <= epoch
}

// > Check if ``data_1`` and ``data_2`` are slashable according to Casper FFG rules.
#[inline]
#[must_use]
pub fn is_slashable_attestation_data(data_1: AttestationData, data_2: AttestationData) -> bool {
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch)
        || (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

pub fn validate_indexed_attestation(
    config: &Config,
    state: &BeaconState,
    indexed_attestation: &IndexedAttestation,
    mut verifier: impl Verifier,
) -> Result<()> {
    let indices = &indexed_attestation.attesting_indices;

    ensure!(!indices.is_empty(), Error::AttestationHasNoAttestingIndices);

    // > Verify indices are sorted and unique
    ensure!(
        indices.iter().tuple_windows().all(|(a, b)| a < b),
        Error::AttestingIndicesNotSortedAndUnique,
    );

    let public_keys = indices
        .iter()
        .map(|validator_index| accessors::public_key(state, *validator_index))
        .collect::<Result<Vec<_>>>()?;

    // > Verify aggregate signature
    verifier.verify_aggregate(
        indexed_attestation.data.signing_root(config, state),
        indexed_attestation.signature,
        public_keys,
        SignatureKind::Attestation,
    )
}

#[must_use]
pub fn is_aggregator(config: &Config, committee_length: usize, selection_proof: SignatureBytes) -> bool {
    let digest = hashing::hash_bytes(selection_proof);

    let mut dividend_bytes = [0; size_of::<u64>()];
    dividend_bytes.copy_from_slice(&digest[..size_of::<u64>()]);
    let dividend = u64::from_le_bytes(dividend_bytes);

    let modulo = u64::try_from(committee_length)
        .unwrap_or(u64::MAX)
        .checked_div(config.target_aggregators_per_committee.get())
        .and_then(NonZeroU64::new)
        .unwrap_or(NonZeroU64::MIN);

    dividend % modulo == 0
}

pub fn validate_bls_to_execution_change(
    config: &Config,
    state: &BeaconState,
    signed_change: SignedBlsToExecutionChange,
    verifier: impl Verifier,
) -> Result<()> {
    let address_change = signed_change.message;
    let validator_index = address_change.validator_index;

    let validator = state
        .validator(validator_index)
        .ok_or(Error::ValidatorNotFound { validator_index })?;

    let in_state = validator.withdrawal_credentials;

    ensure!(
        in_state[0] == BLS_WITHDRAWAL_PREFIX,
        Error::WithdrawalCredentialsNotBls { validator_index },
    );

    let in_message = misc::bls_withdrawal_credentials(address_change.from_bls_pubkey);

    ensure!(
        in_state == in_message,
        Error::WithdrawalCredentialsMismatch { validator_index },
    );

    address_change.verify(
        config,
        state,
        signed_change.signature,
        address_change.from_bls_pubkey,
        verifier,
    )
}

pub fn validate_voluntary_exit(
    config: &Config,
    state: &BeaconState,
    signed_voluntary_exit: SignedVoluntaryExit,
    verifier: impl Verifier,
) -> Result<()> {
    let voluntary_exit = signed_voluntary_exit.message;
    let validator_index = voluntary_exit.validator_index;

    let validator = state
        .validator(validator_index)
        .ok_or(Error::ValidatorNotFound { validator_index })?;

    let current_epoch = get_current_epoch(config, state);

    // > Verify the validator is active
    ensure!(
        is_active_validator(validator, current_epoch),
        Error::ValidatorNotActive { validator_index },
    );

    // > Verify exit has not been initiated
    ensure!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        Error::ValidatorAlreadyExited { validator_index },
    );

    // > Exits must specify an epoch when they become valid; they are not valid before then
    ensure!(
        current_epoch >= voluntary_exit.epoch,
        Error::ExitNotYetValid {
            validator_index,
            exit_epoch: voluntary_exit.epoch,
        },
    );

    // > Verify the validator has been active long enough
    ensure!(
        current_epoch
            >= validator
                .activation_epoch
                .saturating_add(config.shard_committee_period),
        Error::ValidatorNotActiveLongEnough { validator_index },
    );

    voluntary_exit.verify(
        config,
        state,
        signed_voluntary_exit.signature,
        validator.pubkey,
        verifier,
    )
}

pub fn validate_proposer_slashing(
    config: &Config,
    state: &BeaconState,
    proposer_slashing: ProposerSlashing,
    mut verifier: impl Verifier,
) -> Result<()> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    // > Verify header slots match
    ensure!(
        header_1.slot == header_2.slot,
        Error::ProposerSlashingSlotMismatch,
    );

    // > Verify header proposer indices match
    ensure!(
        header_1.proposer_index == header_2.proposer_index,
        Error::ProposerSlashingProposerMismatch,
    );

    // > Verify the headers are different
    ensure!(header_1 != header_2, Error::ProposerSlashingHeadersIdentical);

    // > Verify the proposer is slashable
    let validator_index = header_1.proposer_index;

    let proposer = state
        .validator(validator_index)
        .ok_or(Error::ValidatorNotFound { validator_index })?;

    ensure!(
        is_slashable_validator(proposer, get_current_epoch(config, state)),
        Error::ValidatorNotSlashable { validator_index },
    );

    // > Verify signatures
    for signed_header in [
        proposer_slashing.signed_header_1,
        proposer_slashing.signed_header_2,
    ] {
        signed_header.message.verify(
            config,
            state,
            signed_header.signature,
            proposer.pubkey,
            &mut verifier,
        )?;
    }

    Ok(())
}

/// Returns the indices of validators that would be slashed.
pub fn validate_attester_slashing(
    config: &Config,
    state: &BeaconState,
    attester_slashing: &AttesterSlashing,
    mut verifier: impl Verifier,
) -> Result<Vec<ValidatorIndex>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    ensure!(
        is_slashable_attestation_data(attestation_1.data, attestation_2.data),
        Error::AttestationDataNotSlashable,
    );

    validate_indexed_attestation(config, state, attestation_1, &mut verifier)?;
    validate_indexed_attestation(config, state, attestation_2, &mut verifier)?;

    let current_epoch = get_current_epoch(config, state);

    let slashable_indices = accessors::slashable_indices(attester_slashing)
        .filter(|validator_index| {
            state
                .validator(*validator_index)
                .is_some_and(|validator| is_slashable_validator(validator, current_epoch))
        })
        .collect_vec();

    ensure!(!slashable_indices.is_empty(), Error::NoSlashableValidators);

    Ok(slashable_indices)
}

#[cfg(test)]
mod tests {
    use types::{
        capella::containers::BlsToExecutionChange,
        phase0::{
            containers::{BeaconBlockHeader, Checkpoint, SignedBeaconBlockHeader, VoluntaryExit},
            primitives::{ExecutionAddress, PublicKeyBytes, H256},
        },
    };

    use crate::{
        mock::{sign, MockBackend},
        signing::{SignForAllForks, SignForSingleFork},
        verifier::{NullVerifier, SingleVerifier},
    };

    use super::*;

    fn active_validator(byte: u8) -> Validator {
        let pubkey = PublicKeyBytes::repeat_byte(byte);

        Validator {
            pubkey,
            withdrawal_credentials: misc::bls_withdrawal_credentials(pubkey),
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        }
    }

    // Epoch 300 is past the mainnet shard committee period.
    fn state() -> BeaconState {
        BeaconState {
            slot: 300 * 32,
            validators: (1..=4).map(active_validator).collect(),
            ..BeaconState::default()
        }
    }

    fn signed_change(config: &Config, state: &BeaconState) -> SignedBlsToExecutionChange {
        let message = BlsToExecutionChange {
            validator_index: 1,
            from_bls_pubkey: PublicKeyBytes::repeat_byte(2),
            to_execution_address: ExecutionAddress::repeat_byte(0xaa),
        };

        SignedBlsToExecutionChange {
            message,
            signature: sign(message.signing_root(config, state), &[message.from_bls_pubkey]),
        }
    }

    #[test]
    fn test_slashable() {
        assert!(is_slashable_validator(&active_validator(1), 5));

        let slashed = Validator {
            slashed: true,
            ..active_validator(1)
        };

        assert!(!is_slashable_validator(&slashed, 5));
    }

    #[test]
    fn test_double_vote_attestation_data() {
        let data_1 = AttestationData {
            target: Checkpoint {
                epoch: 3,
                root: H256::repeat_byte(1),
            },
            ..AttestationData::default()
        };

        let data_2 = AttestationData {
            target: Checkpoint {
                epoch: 3,
                root: H256::repeat_byte(2),
            },
            ..AttestationData::default()
        };

        assert!(is_slashable_attestation_data(data_1, data_2));
        assert!(!is_slashable_attestation_data(data_1, data_1));
    }

    #[test]
    fn bls_to_execution_change_with_valid_signature_is_accepted() -> Result<()> {
        let config = Config::mainnet();
        let state = state();
        let backend = MockBackend::default();

        validate_bls_to_execution_change(
            &config,
            &state,
            signed_change(&config, &state),
            SingleVerifier::new(&backend),
        )
    }

    #[test]
    fn bls_to_execution_change_for_other_key_is_rejected() {
        let config = Config::mainnet();
        let state = state();

        let mut change = signed_change(&config, &state);
        change.message.from_bls_pubkey = PublicKeyBytes::repeat_byte(3);

        let error = validate_bls_to_execution_change(&config, &state, change, NullVerifier)
            .expect_err("public key does not match withdrawal credentials");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::WithdrawalCredentialsMismatch { validator_index: 1 }),
        ));
    }

    #[test]
    fn bls_to_execution_change_after_change_is_rejected() {
        let config = Config::mainnet();
        let mut state = state();

        state.validators[1].withdrawal_credentials = H256::repeat_byte(1);

        let change = signed_change(&config, &state);

        assert!(validate_bls_to_execution_change(&config, &state, change, NullVerifier).is_err());
    }

    #[test]
    fn voluntary_exit_is_validated() -> Result<()> {
        let config = Config::mainnet();
        let state = state();
        let backend = MockBackend::default();

        let message = VoluntaryExit {
            epoch: 299,
            validator_index: 2,
        };

        let exit = SignedVoluntaryExit {
            message,
            signature: sign(
                message.signing_root(&config, &state),
                &[PublicKeyBytes::repeat_byte(3)],
            ),
        };

        validate_voluntary_exit(&config, &state, exit, SingleVerifier::new(&backend))?;

        let future_exit = SignedVoluntaryExit {
            message: VoluntaryExit {
                epoch: 301,
                ..message
            },
            ..exit
        };

        validate_voluntary_exit(&config, &state, future_exit, NullVerifier)
            .expect_err("exit epoch is in the future");

        Ok(())
    }

    #[test]
    fn proposer_slashing_requires_distinct_headers() -> Result<()> {
        let config = Config::mainnet();
        let state = state();
        let backend = MockBackend::default();

        let signed_header = |body_byte| {
            let message = BeaconBlockHeader {
                slot: 100,
                proposer_index: 0,
                body_root: H256::repeat_byte(body_byte),
                ..BeaconBlockHeader::default()
            };

            SignedBeaconBlockHeader {
                message,
                signature: sign(
                    message.signing_root(&config, &state),
                    &[PublicKeyBytes::repeat_byte(1)],
                ),
            }
        };

        let slashing = ProposerSlashing {
            signed_header_1: signed_header(1),
            signed_header_2: signed_header(2),
        };

        validate_proposer_slashing(&config, &state, slashing, SingleVerifier::new(&backend))?;

        let identical = ProposerSlashing {
            signed_header_1: signed_header(1),
            signed_header_2: signed_header(1),
        };

        validate_proposer_slashing(&config, &state, identical, NullVerifier)
            .expect_err("headers are identical");

        Ok(())
    }

    #[test]
    fn unsorted_indexed_attestation_is_rejected() {
        let config = Config::mainnet();
        let state = state();

        let attestation = IndexedAttestation {
            attesting_indices: vec![2, 1],
            ..IndexedAttestation::default()
        };

        assert!(validate_indexed_attestation(&config, &state, &attestation, NullVerifier).is_err());
    }

    #[test]
    fn every_member_of_small_committee_is_aggregator() {
        let config = Config::mainnet();

        assert!(is_aggregator(&config, 1, SignatureBytes::repeat_byte(7)));
        assert!(is_aggregator(&config, 16, SignatureBytes::repeat_byte(8)));
    }
}
