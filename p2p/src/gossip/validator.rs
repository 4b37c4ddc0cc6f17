use std::sync::Arc;

use anyhow::Error as AnyhowError;
use batch_verifier::BatchVerifierHandle;
use futures::future;
use helper_functions::{
    accessors,
    error::Error as HelperError,
    misc, predicates,
    signing::SignForSingleFork as _,
    verifier::SignatureSet,
};
use itertools::Itertools as _;
use log::debug;
use logging::debug_with_status;
use operation_pools::Manager;
use prometheus_metrics::Metrics;
use tokio_util::sync::CancellationToken;
use types::{
    capella::containers::SignedBlsToExecutionChange,
    config::Config,
    deneb::containers::BlobSidecar,
    encoding::HashTreeRoot as _,
    phase0::{
        beacon_state::BeaconState,
        containers::{
            Attestation, AttestationData, AttesterSlashing, ProposerSlashing,
            SignedAggregateAndProof, SignedVoluntaryExit,
        },
        primitives::{Slot, SubnetId, H256},
    },
    traits::Chain,
};

use crate::{
    gossip::{
        error::Error,
        message::PubsubMessage,
        seen::{SeenCacheConfig, SeenCaches},
        topics::GossipTopic,
    },
    misc::{GossipId, MessageAcceptance, PeerId},
    pending_attestations::{PendingAttestation, PendingAttestations},
};

/// Decides whether gossip messages should be accepted, ignored or rejected.
///
/// Signatures are checked through the shared batch verifier. Identities of accepted objects are
/// recorded only after their signatures pass.
pub struct GossipValidator<C> {
    chain: Arc<C>,
    pools: Arc<Manager>,
    pending: Arc<PendingAttestations>,
    verifier: BatchVerifierHandle,
    seen: SeenCaches,
    local_peer_id: PeerId,
    metrics: Option<Arc<Metrics>>,
}

impl<C: Chain> GossipValidator<C> {
    #[must_use]
    pub fn new(
        chain: Arc<C>,
        pools: Arc<Manager>,
        pending: Arc<PendingAttestations>,
        verifier: BatchVerifierHandle,
        seen_cache_config: SeenCacheConfig,
        local_peer_id: PeerId,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            chain,
            pools,
            pending,
            verifier,
            seen: SeenCaches::new(seen_cache_config),
            local_peer_id,
            metrics,
        }
    }

    /// Validates a raw gossip message received on `topic`.
    ///
    /// The decoded message is returned only if it was accepted and did not originate from this node.
    pub async fn validate(
        &self,
        gossip_id: GossipId,
        topic: GossipTopic,
        data: &[u8],
        cancellation_token: &CancellationToken,
    ) -> (MessageAcceptance, Option<PubsubMessage>) {
        if gossip_id.source == self.local_peer_id {
            return (MessageAcceptance::Accept, None);
        }

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_gossip_object(&[topic.kind.label()]);
        }

        let result = self.validate_raw(topic, data, cancellation_token).await;

        let acceptance = match &result {
            Ok(_) => MessageAcceptance::Accept,
            Err(error) => error.acceptance(),
        };

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_gossip_validation_result(topic.kind.label(), acceptance.into());
        }

        match result {
            Ok(message) => (acceptance, Some(message)),
            Err(error) => {
                debug!(
                    "gossip message {:?} from {} on {topic} was not accepted \
                     ({acceptance:?}): {error}",
                    gossip_id.message_id, gossip_id.source,
                );

                (acceptance, None)
            }
        }
    }

    /// Validates every attestation that was waiting for the block with root `block_root`.
    ///
    /// Accepted attestations are returned in the order they were queued. Rejected ones are dropped.
    pub async fn flush_pending(
        &self,
        block_root: H256,
        cancellation_token: &CancellationToken,
    ) -> Vec<PubsubMessage> {
        let pending = self.pending.take(block_root);

        if pending.is_empty() {
            return vec![];
        }

        let results = future::join_all(pending.into_iter().map(|attestation| {
            self.validate_decoded(attestation.into_pubsub_message(), cancellation_token)
        }))
        .await;

        let mut accepted = vec![];

        for result in results {
            match result {
                Ok(message) => {
                    if let Some(metrics) = self.metrics.as_ref() {
                        metrics.pending_attestations_flushed.inc();
                    }

                    accepted.push(message);
                }
                Err(error) => {
                    debug!("pending attestation for block {block_root:?} dropped: {error}");
                }
            }
        }

        debug_with_status!(
            "flushed {} pending attestations for block {block_root:?}",
            accepted.len(),
        );

        accepted
    }

    async fn validate_raw(
        &self,
        topic: GossipTopic,
        data: &[u8],
        cancellation_token: &CancellationToken,
    ) -> Result<PubsubMessage, Error> {
        if !self.chain.is_forward_synced() {
            return Err(Error::NotSynced);
        }

        let config = self.chain.chain_config();

        topic
            .validate_subnet(config)
            .map_err(Error::UnexpectedTopic)?;

        let message = PubsubMessage::decode(config, topic.kind, data)
            .map_err(|error| error.downcast::<Error>().unwrap_or_else(Error::Decode))?;

        self.validate_decoded(message, cancellation_token).await
    }

    pub async fn validate_decoded(
        &self,
        message: PubsubMessage,
        cancellation_token: &CancellationToken,
    ) -> Result<PubsubMessage, Error> {
        match &message {
            PubsubMessage::AggregateAndProof(aggregate_and_proof) => {
                self.validate_aggregate_and_proof(aggregate_and_proof, cancellation_token)
                    .await?;
            }
            PubsubMessage::Attestation(subnet_id, attestation) => {
                self.validate_attestation(*subnet_id, attestation, cancellation_token)
                    .await?;
            }
            PubsubMessage::BlsToExecutionChange(signed_change) => {
                self.validate_bls_to_execution_change(**signed_change, cancellation_token)
                    .await?;
            }
            PubsubMessage::BlobSidecar(subnet_id, blob_sidecar) => {
                self.validate_blob_sidecar(*subnet_id, blob_sidecar, cancellation_token)
                    .await?;
            }
            PubsubMessage::ProposerSlashing(proposer_slashing) => {
                self.validate_proposer_slashing(**proposer_slashing, cancellation_token)
                    .await?;
            }
            PubsubMessage::AttesterSlashing(attester_slashing) => {
                self.validate_attester_slashing(attester_slashing, cancellation_token)
                    .await?;
            }
            PubsubMessage::VoluntaryExit(signed_voluntary_exit) => {
                self.validate_voluntary_exit(**signed_voluntary_exit, cancellation_token)
                    .await?;
            }
        }

        Ok(message)
    }

    async fn validate_aggregate_and_proof(
        &self,
        aggregate_and_proof: &SignedAggregateAndProof,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let message = &aggregate_and_proof.message;
        let aggregate = &message.aggregate;
        let data = aggregate.data;
        let aggregator_index = message.aggregator_index;
        let epoch = data.target.epoch;

        self.check_attestation_data(config, data)?;

        let aggregate_root = aggregate.hash_tree_root();

        if self.seen.aggregates.contains(&aggregate_root) {
            return Err(Error::AggregateAlreadySeen {
                root: aggregate_root,
            });
        }

        if self.seen.aggregators.contains(&(epoch, aggregator_index)) {
            return Err(Error::AggregatorAlreadySeen {
                aggregator_index,
                epoch,
            });
        }

        if aggregate.aggregation_bits.not_any() {
            return Err(Error::EmptyAggregate);
        }

        let block_root = data.beacon_block_root;

        if !self.chain.contains_block(block_root) {
            self.pending.insert(PendingAttestation::Aggregate(Box::new(
                aggregate_and_proof.clone(),
            )));

            return Err(Error::UnknownBlock { block_root });
        }

        let state = self.state_at_block(block_root)?;

        check_committees_available(&state, block_root, data.slot)?;

        let committee = accessors::beacon_committee(&state, data.slot, data.index)
            .map_err(|error| committee_error(error, block_root))?;

        if !committee.contains(&aggregator_index) {
            return Err(Error::AggregatorNotInCommittee {
                aggregator_index,
                committee_index: data.index,
            });
        }

        if !predicates::is_aggregator(config, committee.len(), message.selection_proof) {
            return Err(Error::NotAggregator { aggregator_index });
        }

        let public_key = accessors::public_key(&state, aggregator_index).map_err(Error::Invalid)?;
        let indexed_attestation = accessors::get_indexed_attestation(&state, aggregate)
            .map_err(|error| committee_error(error, block_root))?;

        let mut signature_set = SignatureSet::default();

        data.slot
            .verify(
                config,
                &state,
                message.selection_proof,
                public_key,
                &mut signature_set,
            )
            .map_err(Error::Invalid)?;

        message
            .verify(
                config,
                &state,
                aggregate_and_proof.signature,
                public_key,
                &mut signature_set,
            )
            .map_err(Error::Invalid)?;

        predicates::validate_indexed_attestation(
            config,
            &state,
            &indexed_attestation,
            &mut signature_set,
        )
        .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        if !self.seen.aggregators.insert((epoch, aggregator_index)) {
            return Err(Error::AggregatorAlreadySeen {
                aggregator_index,
                epoch,
            });
        }

        self.seen.aggregates.insert(aggregate_root);

        Ok(())
    }

    async fn validate_attestation(
        &self,
        subnet_id: SubnetId,
        attestation: &Attestation,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let data = attestation.data;
        let epoch = data.target.epoch;

        self.check_attestation_data(config, data)?;

        let count = attestation.aggregation_bits.count_ones();

        if count != 1 {
            return Err(Error::NotSingleParticipant { count });
        }

        let block_root = data.beacon_block_root;

        if !self.chain.contains_block(block_root) {
            self.pending.insert(PendingAttestation::Singular(
                subnet_id,
                Box::new(attestation.clone()),
            ));

            return Err(Error::UnknownBlock { block_root });
        }

        let state = self.state_at_block(block_root)?;
        let committee_count = check_committees_available(&state, block_root, data.slot)?;

        let expected = misc::compute_subnet_for_attestation(
            config,
            committee_count,
            data.slot,
            data.index,
        )
        .map_err(Error::Invalid)?;

        if expected != subnet_id {
            return Err(Error::WrongSubnet {
                expected,
                actual: subnet_id,
            });
        }

        let indexed_attestation = accessors::get_indexed_attestation(&state, attestation)
            .map_err(|error| committee_error(error, block_root))?;

        let [validator_index] = *indexed_attestation.attesting_indices.as_slice() else {
            return Err(Error::NotSingleParticipant {
                count: indexed_attestation.attesting_indices.len(),
            });
        };

        if self.seen.attesters.contains(&(epoch, validator_index)) {
            return Err(Error::AttesterAlreadySeen {
                validator_index,
                epoch,
            });
        }

        let mut signature_set = SignatureSet::default();

        predicates::validate_indexed_attestation(
            config,
            &state,
            &indexed_attestation,
            &mut signature_set,
        )
        .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        if !self.seen.attesters.insert((epoch, validator_index)) {
            return Err(Error::AttesterAlreadySeen {
                validator_index,
                epoch,
            });
        }

        Ok(())
    }

    async fn validate_bls_to_execution_change(
        &self,
        signed_change: SignedBlsToExecutionChange,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let state = self.chain.head_state();

        if accessors::get_current_epoch(config, &state) < config.capella_fork_epoch {
            return Err(Error::BeforeCapella);
        }

        let validator_index = signed_change.message.validator_index;

        if self.seen.bls_to_execution_changes.contains(&validator_index)
            || self
                .pools
                .bls_to_execution_change_pool
                .exists(validator_index)
        {
            return Err(Error::BlsToExecutionChangeAlreadySeen { validator_index });
        }

        let mut signature_set = SignatureSet::default();

        predicates::validate_bls_to_execution_change(
            config,
            &state,
            signed_change,
            &mut signature_set,
        )
        .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        if !self.seen.bls_to_execution_changes.insert(validator_index) {
            return Err(Error::BlsToExecutionChangeAlreadySeen { validator_index });
        }

        Ok(())
    }

    async fn validate_blob_sidecar(
        &self,
        subnet_id: SubnetId,
        blob_sidecar: &BlobSidecar,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let index = blob_sidecar.index;

        if index >= config.max_blobs_per_block {
            return Err(Error::BlobIndexOutOfRange {
                index,
                max_blobs_per_block: config.max_blobs_per_block,
            });
        }

        let expected = misc::compute_subnet_for_blob_sidecar(config, index);

        if expected != subnet_id {
            return Err(Error::WrongSubnet {
                expected,
                actual: subnet_id,
            });
        }

        let slot = blob_sidecar.slot();
        let (_, latest_slot) = self.current_slot_bounds(config);

        if slot > latest_slot {
            return Err(Error::FutureSlot {
                slot,
                current_slot: latest_slot,
            });
        }

        let finalized_slot = self.finalized_slot(config);

        if slot <= finalized_slot {
            return Err(Error::NotAfterFinalized {
                slot,
                finalized_slot,
            });
        }

        let proposer_index = blob_sidecar.proposer_index();

        if self
            .seen
            .blob_sidecars
            .contains(&(slot, proposer_index, index))
        {
            return Err(Error::BlobSidecarAlreadySeen {
                slot,
                proposer_index,
                index,
            });
        }

        let signed_header = blob_sidecar.signed_block_header;
        let parent_root = signed_header.message.parent_root;

        let parent_slot = self
            .chain
            .block_slot(parent_root)
            .ok_or(Error::UnknownBlock {
                block_root: parent_root,
            })?;

        if parent_slot >= slot {
            return Err(Error::BlobSidecarNotAfterParent { slot, parent_slot });
        }

        let state = self.state_at_block(parent_root)?;

        let expected_proposer = state.proposer_index(slot).ok_or(Error::StateUnavailable {
            block_root: parent_root,
        })?;

        if expected_proposer != proposer_index {
            return Err(Error::WrongProposer {
                slot,
                expected: expected_proposer,
                actual: proposer_index,
            });
        }

        let public_key = accessors::public_key(&state, proposer_index).map_err(Error::Invalid)?;

        let mut signature_set = SignatureSet::default();

        signed_header
            .message
            .verify(
                config,
                &state,
                signed_header.signature,
                public_key,
                &mut signature_set,
            )
            .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        if !self
            .seen
            .blob_sidecars
            .insert((slot, proposer_index, index))
        {
            return Err(Error::BlobSidecarAlreadySeen {
                slot,
                proposer_index,
                index,
            });
        }

        Ok(())
    }

    async fn validate_proposer_slashing(
        &self,
        proposer_slashing: ProposerSlashing,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let state = self.chain.head_state();
        let validator_index = proposer_slashing.signed_header_1.message.proposer_index;

        if self.seen.slashed_proposers.contains(&validator_index)
            || self.pools.proposer_slashing_pool.exists(validator_index)
        {
            return Err(Error::ProposerSlashingAlreadySeen { validator_index });
        }

        let mut signature_set = SignatureSet::default();

        predicates::validate_proposer_slashing(
            config,
            &state,
            proposer_slashing,
            &mut signature_set,
        )
        .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        if !self.seen.slashed_proposers.insert(validator_index) {
            return Err(Error::ProposerSlashingAlreadySeen { validator_index });
        }

        Ok(())
    }

    async fn validate_attester_slashing(
        &self,
        attester_slashing: &AttesterSlashing,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let state = self.chain.head_state();

        let candidates = accessors::slashable_indices(attester_slashing).collect_vec();

        if !candidates.is_empty()
            && candidates
                .iter()
                .all(|validator_index| self.seen.slashed_attesters.contains(validator_index))
        {
            return Err(Error::AttesterSlashingAlreadySeen);
        }

        let mut signature_set = SignatureSet::default();

        let slashable_indices = predicates::validate_attester_slashing(
            config,
            &state,
            attester_slashing,
            &mut signature_set,
        )
        .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        let mut slashes_new_validator = false;

        for validator_index in slashable_indices {
            slashes_new_validator |= self.seen.slashed_attesters.insert(validator_index);
        }

        if !slashes_new_validator {
            return Err(Error::AttesterSlashingAlreadySeen);
        }

        Ok(())
    }

    async fn validate_voluntary_exit(
        &self,
        signed_voluntary_exit: SignedVoluntaryExit,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let config = self.chain.chain_config();
        let state = self.chain.head_state();
        let validator_index = signed_voluntary_exit.message.validator_index;

        if self.seen.exited_validators.contains(&validator_index)
            || self.pools.voluntary_exit_pool.exists(validator_index)
        {
            return Err(Error::VoluntaryExitAlreadySeen { validator_index });
        }

        let mut signature_set = SignatureSet::default();

        predicates::validate_voluntary_exit(
            config,
            &state,
            signed_voluntary_exit,
            &mut signature_set,
        )
        .map_err(Error::Invalid)?;

        self.verifier
            .verify(signature_set, cancellation_token)
            .await?;

        if !self.seen.exited_validators.insert(validator_index) {
            return Err(Error::VoluntaryExitAlreadySeen { validator_index });
        }

        Ok(())
    }

    // Checks shared by aggregated and unaggregated attestations that need no state.
    fn check_attestation_data(&self, config: &Config, data: AttestationData) -> Result<(), Error> {
        let slot = data.slot;
        let (earliest_slot, latest_slot) = self.current_slot_bounds(config);

        if slot > latest_slot {
            return Err(Error::FutureSlot {
                slot,
                current_slot: latest_slot,
            });
        }

        if slot.saturating_add(config.attestation_propagation_slot_range) < earliest_slot {
            return Err(Error::SlotTooOld {
                slot,
                current_slot: earliest_slot,
            });
        }

        let target_epoch = data.target.epoch;

        if target_epoch != misc::compute_epoch_at_slot(config, slot) {
            return Err(Error::TargetEpochMismatch { slot, target_epoch });
        }

        let finalized_slot = self.finalized_slot(config);

        if slot <= finalized_slot {
            return Err(Error::NotAfterFinalized {
                slot,
                finalized_slot,
            });
        }

        Ok(())
    }

    // Current slot as seen by the earliest and latest clocks within the allowed disparity.
    fn current_slot_bounds(&self, config: &Config) -> (Slot, Slot) {
        let genesis_time = self.chain.genesis_time();
        let now = self.chain.now();
        let disparity = config.maximum_gossip_clock_disparity;

        (
            misc::slot_at_time(config, genesis_time, now.saturating_sub(disparity)),
            misc::slot_at_time(config, genesis_time, now.saturating_add(disparity)),
        )
    }

    fn finalized_slot(&self, config: &Config) -> Slot {
        misc::compute_start_slot_at_epoch(config, self.chain.finalized_checkpoint().epoch)
    }

    fn state_at_block(&self, block_root: H256) -> Result<Arc<BeaconState>, Error> {
        self.chain
            .state_at_block(block_root)
            .ok_or(Error::StateUnavailable { block_root })
    }
}

// A state without committees for `slot` cannot judge the message.
fn check_committees_available(
    state: &BeaconState,
    block_root: H256,
    slot: Slot,
) -> Result<u64, Error> {
    match state.committee_count_at_slot(slot) {
        0 => Err(Error::StateUnavailable { block_root }),
        committee_count => Ok(committee_count),
    }
}

fn committee_error(error: AnyhowError, block_root: H256) -> Error {
    match error.downcast_ref() {
        Some(HelperError::CommitteeNotAvailable { .. }) => Error::StateUnavailable { block_root },
        _ => Error::Invalid(error),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use bitvec::{bitvec, order::Lsb0};
    use helper_functions::{mock::sign, signing::SignForAllForks as _};
    use types::{
        capella::containers::BlsToExecutionChange,
        phase0::{
            containers::{AggregateAndProof, Checkpoint, VoluntaryExit},
            primitives::{ExecutionAddress, SignatureBytes, ValidatorIndex, H384},
        },
    };

    use crate::{
        gossip::topics::GossipKind,
        pending_attestations::PendingConfig,
        test_utils::{self, TestChain, CURRENT_SLOT},
    };

    use super::*;

    const LOCAL_PEER: PeerId = PeerId(0);
    const REMOTE_PEER: PeerId = PeerId(1);

    struct Context {
        chain: Arc<TestChain>,
        pools: Arc<Manager>,
        pending: Arc<PendingAttestations>,
        validator: GossipValidator<TestChain>,
        cancellation_token: CancellationToken,
    }

    impl Context {
        fn new() -> Self {
            Self::with_chain(TestChain::new(test_utils::config()))
        }

        fn with_chain(chain: TestChain) -> Self {
            let chain = Arc::new(chain);
            let pools = Arc::new(Manager::new(None));
            let pending = Arc::new(PendingAttestations::new(PendingConfig::default(), None));
            let cancellation_token = CancellationToken::new();

            let validator = GossipValidator::new(
                chain.clone(),
                pools.clone(),
                pending.clone(),
                test_utils::spawn_verifier(&cancellation_token),
                SeenCacheConfig::default(),
                LOCAL_PEER,
                None,
            );

            Self {
                chain,
                pools,
                pending,
                validator,
                cancellation_token,
            }
        }

        fn topic(&self, kind: GossipKind) -> GossipTopic {
            GossipTopic::for_state(self.chain.state(), kind)
        }

        async fn validate(&self, message: &PubsubMessage) -> Result<MessageAcceptance> {
            let data = message.encode()?;
            let gossip_id = GossipId::new(REMOTE_PEER, &data);
            let topic = self.topic(message.kind());

            let (acceptance, _) = self
                .validator
                .validate(gossip_id, topic, &data, &self.cancellation_token)
                .await;

            Ok(acceptance)
        }
    }

    impl Drop for Context {
        fn drop(&mut self) {
            self.cancellation_token.cancel();
        }
    }

    fn attestation_data(block_root: H256) -> AttestationData {
        AttestationData {
            slot: CURRENT_SLOT,
            index: 0,
            beacon_block_root: block_root,
            source: Checkpoint::default(),
            target: Checkpoint {
                epoch: 2,
                root: block_root,
            },
        }
    }

    fn single_attestation(state: &BeaconState, data: AttestationData, position: usize) -> Attestation {
        let committee = test_utils::committee(data.slot);
        let mut aggregation_bits = bitvec![u8, Lsb0; 0; committee.len()];
        aggregation_bits.set(position, true);

        let signing_root = data.signing_root(&test_utils::config(), state);
        let signature = sign(signing_root, &[test_utils::public_key(committee[position])]);

        Attestation {
            aggregation_bits,
            data,
            signature,
        }
    }

    fn aggregate_and_proof(state: &BeaconState, data: AttestationData) -> SignedAggregateAndProof {
        let config = test_utils::config();
        let committee = test_utils::committee(data.slot);
        let aggregator_index = committee[0];
        let aggregator_key = test_utils::public_key(aggregator_index);

        let public_keys = committee
            .iter()
            .copied()
            .map(test_utils::public_key)
            .collect::<Vec<_>>();

        let aggregate = Attestation {
            aggregation_bits: bitvec![u8, Lsb0; 1; committee.len()],
            data,
            signature: sign(data.signing_root(&config, state), &public_keys),
        };

        let message = AggregateAndProof {
            aggregator_index,
            aggregate,
            selection_proof: sign(data.slot.signing_root(&config, state), &[aggregator_key]),
        };

        let signature = sign(message.signing_root(&config, state), &[aggregator_key]);

        SignedAggregateAndProof { message, signature }
    }

    fn bls_to_execution_change(
        state: &BeaconState,
        validator_index: ValidatorIndex,
    ) -> SignedBlsToExecutionChange {
        let message = BlsToExecutionChange {
            validator_index,
            from_bls_pubkey: test_utils::public_key(validator_index),
            to_execution_address: ExecutionAddress::repeat_byte(3),
        };

        let signature = sign(
            message.signing_root(&test_utils::config(), state),
            &[message.from_bls_pubkey],
        );

        SignedBlsToExecutionChange { message, signature }
    }

    #[tokio::test]
    async fn credential_change_is_accepted_once() -> Result<()> {
        let context = Context::new();
        let change = bls_to_execution_change(context.chain.state(), 3);
        let message = PubsubMessage::BlsToExecutionChange(Box::new(change));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Accept);
        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn credential_change_already_in_pool_is_ignored() -> Result<()> {
        let context = Context::new();
        let change = bls_to_execution_change(context.chain.state(), 3);

        context.pools.bls_to_execution_change_pool.insert(change);

        let message = PubsubMessage::BlsToExecutionChange(Box::new(change));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn credential_change_with_bad_signature_is_rejected_and_not_remembered() -> Result<()> {
        let context = Context::new();
        let valid = bls_to_execution_change(context.chain.state(), 3);

        let invalid = SignedBlsToExecutionChange {
            signature: SignatureBytes::repeat_byte(0xff),
            ..valid
        };

        let invalid = PubsubMessage::BlsToExecutionChange(Box::new(invalid));
        let valid = PubsubMessage::BlsToExecutionChange(Box::new(valid));

        assert_eq!(context.validate(&invalid).await?, MessageAcceptance::Reject);
        assert_eq!(context.validate(&valid).await?, MessageAcceptance::Accept);

        Ok(())
    }

    #[tokio::test]
    async fn credential_change_before_capella_is_ignored() -> Result<()> {
        let config = Config {
            capella_fork_epoch: 100,
            ..test_utils::config()
        };

        let chain = Arc::new(TestChain::new(config));
        let cancellation_token = CancellationToken::new();

        let validator = GossipValidator::new(
            chain.clone(),
            Arc::new(Manager::new(None)),
            Arc::new(PendingAttestations::new(PendingConfig::default(), None)),
            test_utils::spawn_verifier(&cancellation_token),
            SeenCacheConfig::default(),
            LOCAL_PEER,
            None,
        );

        let change = bls_to_execution_change(chain.state(), 3);
        let message = PubsubMessage::BlsToExecutionChange(Box::new(change));

        let result = validator
            .validate_decoded(message, &cancellation_token)
            .await;

        assert!(matches!(result, Err(Error::BeforeCapella)));

        cancellation_token.cancel();

        Ok(())
    }

    #[tokio::test]
    async fn own_messages_are_accepted_without_validation() -> Result<()> {
        let context = Context::new();
        let topic = context.topic(GossipKind::VoluntaryExit);
        let data = b"not a valid payload";

        let (acceptance, message) = context
            .validator
            .validate(
                GossipId::new(LOCAL_PEER, data),
                topic,
                data,
                &context.cancellation_token,
            )
            .await;

        assert_eq!(acceptance, MessageAcceptance::Accept);
        assert_eq!(message, None);

        Ok(())
    }

    #[tokio::test]
    async fn messages_are_ignored_while_syncing() -> Result<()> {
        let context = Context::new();
        let change = bls_to_execution_change(context.chain.state(), 3);

        context.chain.set_synced(false);

        let message = PubsubMessage::BlsToExecutionChange(Box::new(change));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn undecodable_payload_is_rejected() {
        let context = Context::new();
        let topic = context.topic(GossipKind::VoluntaryExit);
        let data = b"not a valid payload";

        let (acceptance, message) = context
            .validator
            .validate(
                GossipId::new(REMOTE_PEER, data),
                topic,
                data,
                &context.cancellation_token,
            )
            .await;

        assert_eq!(acceptance, MessageAcceptance::Reject);
        assert_eq!(message, None);
    }

    #[tokio::test]
    async fn voluntary_exit_is_accepted_once() -> Result<()> {
        let context = Context::new();
        let state = context.chain.state();

        let exit = VoluntaryExit {
            epoch: 0,
            validator_index: 5,
        };

        let signed_exit = SignedVoluntaryExit {
            message: exit,
            signature: sign(
                exit.signing_root(&test_utils::config(), state),
                &[test_utils::public_key(5)],
            ),
        };

        let message = PubsubMessage::VoluntaryExit(Box::new(signed_exit));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Accept);
        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn aggregate_for_known_block_is_accepted() -> Result<()> {
        let context = Context::new();
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));
        let data = attestation_data(block_root);
        let aggregate_and_proof = aggregate_and_proof(context.chain.state(), data);
        let message = PubsubMessage::AggregateAndProof(Box::new(aggregate_and_proof));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Accept);
        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn aggregate_for_unknown_block_waits_for_it() -> Result<()> {
        let context = Context::new();
        let block = test_utils::block(CURRENT_SLOT, H256::zero());
        let block_root = block.message.hash_tree_root();
        let data = attestation_data(block_root);
        let aggregate_and_proof = aggregate_and_proof(context.chain.state(), data);
        let message = PubsubMessage::AggregateAndProof(Box::new(aggregate_and_proof));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);
        assert_eq!(context.pending.len(), 1);

        context.chain.add_block(block);

        let flushed = context
            .validator
            .flush_pending(block_root, &context.cancellation_token)
            .await;

        assert_eq!(flushed, [message]);
        assert!(context.pending.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn pending_attestations_with_bad_signatures_are_dropped_on_flush() -> Result<()> {
        let context = Context::new();
        let block = test_utils::block(CURRENT_SLOT, H256::zero());
        let block_root = block.message.hash_tree_root();
        let data = attestation_data(block_root);
        let state = context.chain.state();

        let valid = single_attestation(state, data, 1);

        let invalid = Attestation {
            signature: SignatureBytes::repeat_byte(0xff),
            ..single_attestation(state, data, 2)
        };

        let subnet_id =
            misc::compute_subnet_for_attestation(&test_utils::config(), 1, CURRENT_SLOT, 0)?;

        let valid = PubsubMessage::Attestation(subnet_id, Box::new(valid));
        let invalid = PubsubMessage::Attestation(subnet_id, Box::new(invalid));

        assert_eq!(context.validate(&valid).await?, MessageAcceptance::Ignore);
        assert_eq!(context.validate(&invalid).await?, MessageAcceptance::Ignore);
        assert_eq!(context.pending.len(), 2);

        context.chain.add_block(block);

        let flushed = context
            .validator
            .flush_pending(block_root, &context.cancellation_token)
            .await;

        assert_eq!(flushed, [valid]);

        Ok(())
    }

    #[tokio::test]
    async fn attestation_on_wrong_subnet_is_rejected() -> Result<()> {
        let context = Context::new();
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));
        let data = attestation_data(block_root);
        let attestation = single_attestation(context.chain.state(), data, 0);

        let expected = misc::compute_subnet_for_attestation(
            &test_utils::config(),
            1,
            CURRENT_SLOT,
            0,
        )?;

        let right = PubsubMessage::Attestation(expected, Box::new(attestation.clone()));
        let wrong = PubsubMessage::Attestation(expected + 1, Box::new(attestation));

        assert_eq!(context.validate(&wrong).await?, MessageAcceptance::Reject);
        assert_eq!(context.validate(&right).await?, MessageAcceptance::Accept);
        assert_eq!(context.validate(&right).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn attestation_with_two_participants_is_rejected() -> Result<()> {
        let context = Context::new();
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));
        let data = attestation_data(block_root);
        let mut attestation = single_attestation(context.chain.state(), data, 0);

        attestation.aggregation_bits.set(1, true);

        let subnet_id =
            misc::compute_subnet_for_attestation(&test_utils::config(), 1, CURRENT_SLOT, 0)?;

        let message = PubsubMessage::Attestation(subnet_id, Box::new(attestation));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Reject);
        assert!(context.pending.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn attestation_from_the_future_is_ignored() -> Result<()> {
        let context = Context::new();
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));

        let data = AttestationData {
            slot: CURRENT_SLOT + 1,
            ..attestation_data(block_root)
        };

        let attestation = single_attestation(context.chain.state(), data, 0);
        let message = PubsubMessage::Attestation(0, Box::new(attestation));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn attestation_with_wrong_target_epoch_is_rejected() -> Result<()> {
        let context = Context::new();
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));

        let data = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: block_root,
            },
            ..attestation_data(block_root)
        };

        let attestation = single_attestation(context.chain.state(), data, 0);
        let message = PubsubMessage::Attestation(0, Box::new(attestation));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Reject);

        Ok(())
    }

    #[tokio::test]
    async fn attestations_are_ignored_when_state_has_no_committees_for_their_slot() -> Result<()> {
        let config = test_utils::config();
        let mut state = test_utils::state(&config);

        state.committees.retain(|(slot, _), _| *slot != CURRENT_SLOT);

        let context = Context::with_chain(TestChain::new(config).with_state(state));
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));
        let data = attestation_data(block_root);
        let state = context.chain.state();

        let subnet_id =
            misc::compute_subnet_for_attestation(&test_utils::config(), 1, CURRENT_SLOT, 0)?;

        let attestation = PubsubMessage::Attestation(
            subnet_id,
            Box::new(single_attestation(state, data, 0)),
        );

        let aggregate = PubsubMessage::AggregateAndProof(Box::new(aggregate_and_proof(state, data)));

        assert_eq!(context.validate(&attestation).await?, MessageAcceptance::Ignore);
        assert_eq!(context.validate(&aggregate).await?, MessageAcceptance::Ignore);

        Ok(())
    }

    #[tokio::test]
    async fn attestation_with_committee_index_out_of_bounds_is_rejected() -> Result<()> {
        let context = Context::new();
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));

        let data = AttestationData {
            index: 1,
            ..attestation_data(block_root)
        };

        let attestation = single_attestation(context.chain.state(), data, 0);
        let message = PubsubMessage::Attestation(0, Box::new(attestation));

        assert_eq!(context.validate(&message).await?, MessageAcceptance::Reject);

        Ok(())
    }

    #[tokio::test]
    async fn attestation_at_finalized_slot_is_ignored() -> Result<()> {
        let config = test_utils::config();
        let finalized_epoch = 2;
        let finalized_slot = misc::compute_start_slot_at_epoch(&config, finalized_epoch);

        let chain = TestChain::new(config).with_finalized_checkpoint(Checkpoint {
            epoch: finalized_epoch,
            root: H256::zero(),
        });

        let context = Context::with_chain(chain);
        let block_root = context.chain.add_block(test_utils::block(CURRENT_SLOT, H256::zero()));
        let state = context.chain.state();

        let message_at = |slot| -> Result<PubsubMessage> {
            let data = AttestationData {
                slot,
                ..attestation_data(block_root)
            };

            let subnet_id =
                misc::compute_subnet_for_attestation(&test_utils::config(), 1, slot, 0)?;

            Ok(PubsubMessage::Attestation(
                subnet_id,
                Box::new(single_attestation(state, data, 0)),
            ))
        };

        let at_finalized = context
            .validator
            .validate_decoded(message_at(finalized_slot)?, &context.cancellation_token)
            .await;

        assert!(matches!(
            at_finalized,
            Err(Error::NotAfterFinalized { slot, .. }) if slot == finalized_slot,
        ));

        let after_finalized = message_at(finalized_slot + 1)?;

        assert_eq!(
            context.validate(&after_finalized).await?,
            MessageAcceptance::Accept,
        );

        Ok(())
    }

    #[tokio::test]
    async fn blob_sidecar_from_wrong_proposer_is_rejected() -> Result<()> {
        let context = Context::new();
        let config = test_utils::config();
        let parent_root = context.chain.add_block(test_utils::block(CURRENT_SLOT - 1, H256::zero()));
        let state = context.chain.state();

        let sidecar = |proposer_index| {
            let mut block = test_utils::block(CURRENT_SLOT, parent_root);
            block.message.proposer_index = proposer_index;

            let mut signed_block_header = block.to_header();

            signed_block_header.signature = sign(
                signed_block_header.message.signing_root(&config, state),
                &[test_utils::public_key(proposer_index)],
            );

            BlobSidecar {
                index: 1,
                blob: vec![0; 32],
                kzg_commitment: H384::zero(),
                kzg_proof: H384::zero(),
                signed_block_header,
                kzg_commitment_inclusion_proof: vec![],
            }
        };

        let subnet_id = misc::compute_subnet_for_blob_sidecar(&config, 1);
        let proposer = test_utils::proposer(CURRENT_SLOT);

        let wrong = PubsubMessage::BlobSidecar(subnet_id, Arc::new(sidecar(proposer + 1)));
        let right = PubsubMessage::BlobSidecar(subnet_id, Arc::new(sidecar(proposer)));

        assert_eq!(context.validate(&wrong).await?, MessageAcceptance::Reject);
        assert_eq!(context.validate(&right).await?, MessageAcceptance::Accept);
        assert_eq!(context.validate(&right).await?, MessageAcceptance::Ignore);

        Ok(())
    }
}
