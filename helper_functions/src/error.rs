use derive_more::Display;
use strum::IntoStaticStr;
use thiserror::Error;
use types::phase0::primitives::{CommitteeIndex, Epoch, Slot, ValidatorIndex};

#[derive(Debug, Error)]
pub enum Error {
    #[error("attestation has no attesting indices")]
    AttestationHasNoAttestingIndices,
    #[error("attesting indices are not sorted and unique")]
    AttestingIndicesNotSortedAndUnique,
    #[error("attester slashing attestations are not slashable")]
    AttestationDataNotSlashable,
    #[error("attester slashing has no slashable validators")]
    NoSlashableValidators,
    #[error("committee {index} at slot {slot} is not available in state")]
    CommitteeNotAvailable { slot: Slot, index: CommitteeIndex },
    #[error(
        "aggregation bitlist length {aggregation_bitlist_length} \
         does not match committee length {committee_length}"
    )]
    CommitteeLengthMismatch {
        aggregation_bitlist_length: usize,
        committee_length: usize,
    },
    #[error("committee index {index} is out of bounds (committee count: {committee_count})")]
    CommitteeIndexOutOfBounds {
        index: CommitteeIndex,
        committee_count: u64,
    },
    #[error("exit for validator {validator_index} is not yet valid (exit epoch: {exit_epoch})")]
    ExitNotYetValid {
        validator_index: ValidatorIndex,
        exit_epoch: Epoch,
    },
    #[error("proposer slashing headers are identical")]
    ProposerSlashingHeadersIdentical,
    #[error("proposer slashing headers differ in proposer index")]
    ProposerSlashingProposerMismatch,
    #[error("proposer slashing headers differ in slot")]
    ProposerSlashingSlotMismatch,
    #[error("validator {validator_index} has already initiated exit")]
    ValidatorAlreadyExited { validator_index: ValidatorIndex },
    #[error("validator {validator_index} is not active")]
    ValidatorNotActive { validator_index: ValidatorIndex },
    #[error("validator {validator_index} has not been active long enough to exit")]
    ValidatorNotActiveLongEnough { validator_index: ValidatorIndex },
    #[error("validator {validator_index} is not slashable")]
    ValidatorNotSlashable { validator_index: ValidatorIndex },
    #[error("validator {validator_index} not found in state")]
    ValidatorNotFound { validator_index: ValidatorIndex },
    #[error("validator {validator_index} does not have BLS withdrawal credentials")]
    WithdrawalCredentialsNotBls { validator_index: ValidatorIndex },
    #[error("BLS public key does not match withdrawal credentials of validator {validator_index}")]
    WithdrawalCredentialsMismatch { validator_index: ValidatorIndex },
    #[error("{0} is invalid")]
    SignatureInvalid(SignatureKind),
    #[error("{kind} at position {index} in signature set is invalid")]
    SignatureInSetInvalid { index: usize, kind: SignatureKind },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SignatureKind {
    #[display("aggregate and proof signature")]
    AggregateAndProof,
    #[display("attestation signature")]
    Attestation,
    #[display("block signature in blob sidecar")]
    BlockInBlobSidecar,
    #[display("block header signature")]
    BlockHeader,
    #[display("BLS to execution change signature")]
    BlsToExecutionChange,
    #[display("collection of multiple signatures")]
    Multi,
    #[display("selection proof")]
    SelectionProof,
    #[display("voluntary exit signature")]
    VoluntaryExit,
}
