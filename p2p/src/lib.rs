pub use crate::{
    messages::{ChainToP2p, P2pToChain, ServiceInboundMessage, ServiceOutboundMessage},
    misc::{GossipId, MessageAcceptance, MessageId, PeerId},
    network::{Channels, Network, NetworkConfig},
    pending_attestations::{
        PendingAttestation, PendingAttestations, PendingConfig, DEFAULT_PRUNE_TOLERANCE,
    },
    subscriber::Subscriber,
};

pub mod gossip;
pub mod rpc;

mod messages;
mod misc;
mod network;
mod pending_attestations;
mod subscriber;

#[cfg(test)]
mod test_utils;
