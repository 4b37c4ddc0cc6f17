use anyhow::Result;
use types::{
    capella::containers::BlsToExecutionChange,
    config::Config,
    encoding::HashTreeRoot,
    phase0::{
        beacon_state::BeaconState,
        consts::{
            DOMAIN_AGGREGATE_AND_PROOF, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER,
            DOMAIN_BLS_TO_EXECUTION_CHANGE, DOMAIN_SELECTION_PROOF, DOMAIN_VOLUNTARY_EXIT,
        },
        containers::{AggregateAndProof, AttestationData, BeaconBlockHeader, VoluntaryExit},
        primitives::{DomainType, Epoch, PublicKeyBytes, SignatureBytes, Slot, H256},
    },
};

use crate::{accessors, error::SignatureKind, misc, verifier::Verifier};

/// Objects signed with a domain that does not change across forks.
pub trait SignForAllForks: HashTreeRoot {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config, state: &BeaconState) -> H256 {
        let genesis_validators_root = Some(state.genesis_validators_root);
        let domain = misc::compute_domain(config, Self::DOMAIN_TYPE, None, genesis_validators_root);
        misc::compute_signing_root(self, domain)
    }

    fn verify(
        &self,
        config: &Config,
        state: &BeaconState,
        signature: SignatureBytes,
        public_key: PublicKeyBytes,
        mut verifier: impl Verifier,
    ) -> Result<()> {
        verifier.verify_singular(
            self.signing_root(config, state),
            signature,
            public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

/// Objects signed with the domain of the fork active at [`SignForSingleFork::epoch`].
pub trait SignForSingleFork: HashTreeRoot {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn epoch(&self, config: &Config) -> Epoch;

    fn signing_root(&self, config: &Config, state: &BeaconState) -> H256 {
        let epoch = Some(self.epoch(config));
        let domain = accessors::get_domain(config, state, Self::DOMAIN_TYPE, epoch);
        misc::compute_signing_root(self, domain)
    }

    fn verify(
        &self,
        config: &Config,
        state: &BeaconState,
        signature: SignatureBytes,
        public_key: PublicKeyBytes,
        mut verifier: impl Verifier,
    ) -> Result<()> {
        verifier.verify_singular(
            self.signing_root(config, state),
            signature,
            public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

// Address changes are valid across forks, so they are signed with the genesis fork version.
impl SignForAllForks for BlsToExecutionChange {
    const DOMAIN_TYPE: DomainType = DOMAIN_BLS_TO_EXECUTION_CHANGE;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::BlsToExecutionChange;
}

impl SignForSingleFork for AggregateAndProof {
    const DOMAIN_TYPE: DomainType = DOMAIN_AGGREGATE_AND_PROOF;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::AggregateAndProof;

    fn epoch(&self, config: &Config) -> Epoch {
        misc::compute_epoch_at_slot(config, self.aggregate.data.slot)
    }
}

impl SignForSingleFork for AttestationData {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_ATTESTER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Attestation;

    fn epoch(&self, _config: &Config) -> Epoch {
        self.target.epoch
    }
}

impl SignForSingleFork for BeaconBlockHeader {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::BlockHeader;

    fn epoch(&self, config: &Config) -> Epoch {
        misc::compute_epoch_at_slot(config, self.slot)
    }
}

// Selection proofs sign the slot itself.
impl SignForSingleFork for Slot {
    const DOMAIN_TYPE: DomainType = DOMAIN_SELECTION_PROOF;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::SelectionProof;

    fn epoch(&self, config: &Config) -> Epoch {
        misc::compute_epoch_at_slot(config, *self)
    }
}

impl SignForSingleFork for VoluntaryExit {
    const DOMAIN_TYPE: DomainType = DOMAIN_VOLUNTARY_EXIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::VoluntaryExit;

    fn epoch(&self, _config: &Config) -> Epoch {
        self.epoch
    }
}
