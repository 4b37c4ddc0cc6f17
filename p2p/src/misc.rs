use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use types::phase0::primitives::H256;

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Display, From, Deserialize,
    Serialize,
)]
#[display("peer-{_0}")]
#[serde(transparent)]
pub struct PeerId(pub u64);

// Gossip messages are identified by the hash of their data as received.
pub type MessageId = H256;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GossipId {
    pub source: PeerId,
    pub message_id: MessageId,
}

impl GossipId {
    #[must_use]
    pub fn new(source: PeerId, data: &[u8]) -> Self {
        Self {
            source,
            message_id: hashing::hash_bytes(data),
        }
    }
}

/// Validation result reported back to the gossip router.
///
/// Only accepted messages are forwarded to other peers.
/// Rejected messages count against the peer that sent them.
#[derive(Clone, Copy, PartialEq, Eq, Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum MessageAcceptance {
    Accept,
    Reject,
    Ignore,
}
