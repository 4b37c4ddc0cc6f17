use anyhow::Error as AnyhowError;
use thiserror::Error;
use types::{
    deneb::primitives::BlobIndex,
    phase0::primitives::{CommitteeIndex, Epoch, Slot, SubnetId, ValidatorIndex, H256},
};

use crate::misc::MessageAcceptance;

#[derive(Debug, Error)]
pub enum Error {
    // Conditions that say nothing about the sender.
    #[error("node is not synced")]
    NotSynced,
    #[error("message is from slot {slot}, which is in the future (current slot: {current_slot})")]
    FutureSlot { slot: Slot, current_slot: Slot },
    #[error("message is from slot {slot}, which is too old (current slot: {current_slot})")]
    SlotTooOld { slot: Slot, current_slot: Slot },
    #[error("message is from slot {slot}, which is not after finalized slot {finalized_slot}")]
    NotAfterFinalized { slot: Slot, finalized_slot: Slot },
    #[error("block {block_root:?} is not known")]
    UnknownBlock { block_root: H256 },
    #[error("state after block {block_root:?} is not available")]
    StateUnavailable { block_root: H256 },
    #[error("message was received before the Capella fork")]
    BeforeCapella,
    #[error("aggregate from aggregator {aggregator_index} for epoch {epoch} was already seen")]
    AggregatorAlreadySeen {
        aggregator_index: ValidatorIndex,
        epoch: Epoch,
    },
    #[error("aggregate {root:?} was already seen")]
    AggregateAlreadySeen { root: H256 },
    #[error("attestation from validator {validator_index} for epoch {epoch} was already seen")]
    AttesterAlreadySeen {
        validator_index: ValidatorIndex,
        epoch: Epoch,
    },
    #[error("BLS to execution change for validator {validator_index} was already seen")]
    BlsToExecutionChangeAlreadySeen { validator_index: ValidatorIndex },
    #[error("voluntary exit for validator {validator_index} was already seen")]
    VoluntaryExitAlreadySeen { validator_index: ValidatorIndex },
    #[error("proposer slashing for validator {validator_index} was already seen")]
    ProposerSlashingAlreadySeen { validator_index: ValidatorIndex },
    #[error("attester slashing does not slash any validators not already seen")]
    AttesterSlashingAlreadySeen,
    #[error(
        "blob sidecar {index} from proposer {proposer_index} at slot {slot} was already seen"
    )]
    BlobSidecarAlreadySeen {
        slot: Slot,
        proposer_index: ValidatorIndex,
        index: BlobIndex,
    },
    #[error("signature verification did not complete: {0}")]
    VerificationUnavailable(batch_verifier::Error),

    // Conditions that prove the message invalid.
    #[error("message could not be decoded: {0}")]
    Decode(AnyhowError),
    #[error("message is too large ({size} bytes, limit {max_size} bytes)")]
    MessageTooLarge { size: usize, max_size: usize },
    #[error("message was received on an unexpected topic: {0}")]
    UnexpectedTopic(AnyhowError),
    #[error("attestation target epoch {target_epoch} does not match slot {slot}")]
    TargetEpochMismatch { slot: Slot, target_epoch: Epoch },
    #[error("aggregate has no participants")]
    EmptyAggregate,
    #[error("attestation has {count} participants instead of 1")]
    NotSingleParticipant { count: usize },
    #[error("aggregator {aggregator_index} is not a member of committee {committee_index}")]
    AggregatorNotInCommittee {
        aggregator_index: ValidatorIndex,
        committee_index: CommitteeIndex,
    },
    #[error("validator {aggregator_index} is not an aggregator")]
    NotAggregator { aggregator_index: ValidatorIndex },
    #[error("message belongs in subnet {expected}, not {actual}")]
    WrongSubnet { expected: SubnetId, actual: SubnetId },
    #[error("blob index {index} is out of range (maximum: {max_blobs_per_block})")]
    BlobIndexOutOfRange {
        index: BlobIndex,
        max_blobs_per_block: u64,
    },
    #[error("blob sidecar slot {slot} is not after parent slot {parent_slot}")]
    BlobSidecarNotAfterParent { slot: Slot, parent_slot: Slot },
    #[error("blob sidecar is from proposer {actual} instead of {expected} at slot {slot}")]
    WrongProposer {
        slot: Slot,
        expected: ValidatorIndex,
        actual: ValidatorIndex,
    },
    #[error("message is invalid: {0}")]
    Invalid(AnyhowError),
    #[error("signature is invalid: {0}")]
    SignatureInvalid(AnyhowError),
}

impl From<batch_verifier::Error> for Error {
    fn from(error: batch_verifier::Error) -> Self {
        match error {
            batch_verifier::Error::Invalid(error) => Self::SignatureInvalid(error),
            other => Self::VerificationUnavailable(other),
        }
    }
}

impl Error {
    #[must_use]
    pub const fn acceptance(&self) -> MessageAcceptance {
        match self {
            Self::NotSynced
            | Self::FutureSlot { .. }
            | Self::SlotTooOld { .. }
            | Self::NotAfterFinalized { .. }
            | Self::UnknownBlock { .. }
            | Self::StateUnavailable { .. }
            | Self::BeforeCapella
            | Self::AggregatorAlreadySeen { .. }
            | Self::AggregateAlreadySeen { .. }
            | Self::AttesterAlreadySeen { .. }
            | Self::BlsToExecutionChangeAlreadySeen { .. }
            | Self::VoluntaryExitAlreadySeen { .. }
            | Self::ProposerSlashingAlreadySeen { .. }
            | Self::AttesterSlashingAlreadySeen
            | Self::BlobSidecarAlreadySeen { .. }
            | Self::VerificationUnavailable(_) => MessageAcceptance::Ignore,
            Self::Decode(_)
            | Self::MessageTooLarge { .. }
            | Self::UnexpectedTopic(_)
            | Self::TargetEpochMismatch { .. }
            | Self::EmptyAggregate
            | Self::NotSingleParticipant { .. }
            | Self::AggregatorNotInCommittee { .. }
            | Self::NotAggregator { .. }
            | Self::WrongSubnet { .. }
            | Self::BlobIndexOutOfRange { .. }
            | Self::BlobSidecarNotAfterParent { .. }
            | Self::WrongProposer { .. }
            | Self::Invalid(_)
            | Self::SignatureInvalid(_) => MessageAcceptance::Reject,
        }
    }
}
