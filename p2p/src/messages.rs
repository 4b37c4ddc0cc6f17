use std::sync::Arc;

use futures::channel::mpsc::UnboundedSender;
use log::debug;
use types::{
    deneb::containers::{BlobSidecar, SignedBeaconBlock},
    phase0::{
        containers::{Attestation, AttesterSlashing, SignedAggregateAndProof},
        primitives::{Slot, SubnetId, H256},
    },
};

use crate::{
    gossip::{GossipTopic, PubsubMessage},
    misc::{GossipId, MessageAcceptance, PeerId},
    rpc::Protocol,
};

/// Requests from this subsystem to the network transport.
#[derive(Debug)]
pub enum ServiceInboundMessage {
    Publish(PubsubMessage),
    ReportMessageValidationResult(GossipId, MessageAcceptance),
    ReportPeer(PeerId, &'static str),
}

impl ServiceInboundMessage {
    pub fn send(self, tx: &UnboundedSender<Self>) {
        if tx.unbounded_send(self).is_err() {
            debug!("send to network service failed because the receiver was dropped");
        }
    }
}

/// Events from the network transport.
pub enum ServiceOutboundMessage<S> {
    GossipMessage(GossipId, GossipTopic, Vec<u8>),
    InboundStream(PeerId, Protocol, S),
}

impl<S> ServiceOutboundMessage<S> {
    pub fn send(self, tx: &UnboundedSender<Self>) {
        if tx.unbounded_send(self).is_err() {
            debug!("send to p2p failed because the receiver was dropped");
        }
    }
}

/// Accepted objects that the chain is responsible for.
#[derive(PartialEq, Eq, Debug)]
pub enum P2pToChain {
    Attestation(SubnetId, Box<Attestation>),
    AggregateAndProof(Box<SignedAggregateAndProof>),
    AttesterSlashing(Box<AttesterSlashing>),
    BlobSidecar(Arc<BlobSidecar>),
    RequestedBlock(Arc<SignedBeaconBlock>, PeerId),
    BlockFetchFailed(PeerId),
}

impl P2pToChain {
    pub fn send(self, tx: &UnboundedSender<Self>) {
        if tx.unbounded_send(self).is_err() {
            debug!("send to chain failed because the receiver was dropped");
        }
    }
}

pub enum ChainToP2p {
    BlockImported(Arc<SignedBeaconBlock>),
    BlockNeeded(H256, PeerId),
    BlocksByRangeNeeded(PeerId, Slot, u64),
}

impl ChainToP2p {
    pub fn send(self, tx: &UnboundedSender<Self>) {
        if tx.unbounded_send(self).is_err() {
            debug!("send to p2p failed because the receiver was dropped");
        }
    }
}
