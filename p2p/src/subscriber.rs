use std::sync::Arc;

use futures::channel::mpsc::UnboundedSender;
use log::debug;
use operation_pools::Manager;

use crate::{gossip::PubsubMessage, messages::P2pToChain};

/// Routes accepted gossip objects to the component that owns them.
pub struct Subscriber {
    pools: Arc<Manager>,
    p2p_to_chain_tx: UnboundedSender<P2pToChain>,
}

impl Subscriber {
    #[must_use]
    pub const fn new(pools: Arc<Manager>, p2p_to_chain_tx: UnboundedSender<P2pToChain>) -> Self {
        Self {
            pools,
            p2p_to_chain_tx,
        }
    }

    pub fn deliver(&self, message: PubsubMessage) {
        match message {
            PubsubMessage::BlsToExecutionChange(signed_change) => {
                if !self.pools.bls_to_execution_change_pool.insert(*signed_change) {
                    debug!("BLS to execution change already in pool: {signed_change:?}");
                }
            }
            PubsubMessage::VoluntaryExit(signed_voluntary_exit) => {
                if !self.pools.voluntary_exit_pool.insert(*signed_voluntary_exit) {
                    debug!("voluntary exit already in pool: {signed_voluntary_exit:?}");
                }
            }
            PubsubMessage::ProposerSlashing(proposer_slashing) => {
                if !self.pools.proposer_slashing_pool.insert(*proposer_slashing) {
                    debug!("proposer slashing already in pool: {proposer_slashing:?}");
                }
            }
            PubsubMessage::Attestation(subnet_id, attestation) => {
                P2pToChain::Attestation(subnet_id, attestation).send(&self.p2p_to_chain_tx);
            }
            PubsubMessage::AggregateAndProof(aggregate_and_proof) => {
                P2pToChain::AggregateAndProof(aggregate_and_proof).send(&self.p2p_to_chain_tx);
            }
            PubsubMessage::AttesterSlashing(attester_slashing) => {
                P2pToChain::AttesterSlashing(attester_slashing).send(&self.p2p_to_chain_tx);
            }
            PubsubMessage::BlobSidecar(_, blob_sidecar) => {
                P2pToChain::BlobSidecar(blob_sidecar).send(&self.p2p_to_chain_tx);
            }
        }
    }
}
