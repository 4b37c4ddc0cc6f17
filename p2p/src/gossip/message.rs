use std::sync::Arc;

use anyhow::{ensure, Result};
use types::{
    capella::containers::SignedBlsToExecutionChange,
    config::Config,
    deneb::containers::BlobSidecar,
    encoding,
    phase0::{
        containers::{
            Attestation, AttesterSlashing, ProposerSlashing, SignedAggregateAndProof,
            SignedVoluntaryExit,
        },
        primitives::SubnetId,
    },
};

use crate::gossip::{error::Error, topics::GossipKind};

/// Decoded gossip payload, one variant per topic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PubsubMessage {
    AggregateAndProof(Box<SignedAggregateAndProof>),
    Attestation(SubnetId, Box<Attestation>),
    BlsToExecutionChange(Box<SignedBlsToExecutionChange>),
    BlobSidecar(SubnetId, Arc<BlobSidecar>),
    ProposerSlashing(Box<ProposerSlashing>),
    AttesterSlashing(Box<AttesterSlashing>),
    VoluntaryExit(Box<SignedVoluntaryExit>),
}

impl PubsubMessage {
    /// Decompresses and decodes a payload received on a topic of kind `kind`.
    pub fn decode(config: &Config, kind: GossipKind, data: &[u8]) -> Result<Self> {
        let max_size = config.gossip_max_size;
        let decompressed_len = snap::raw::decompress_len(data)?;

        ensure!(
            decompressed_len <= max_size,
            Error::MessageTooLarge {
                size: decompressed_len,
                max_size,
            },
        );

        let bytes = snap::raw::Decoder::new().decompress_vec(data)?;

        let message = match kind {
            GossipKind::BeaconAggregateAndProof => {
                Self::AggregateAndProof(Box::new(encoding::from_bytes(&bytes, max_size)?))
            }
            GossipKind::Attestation(subnet_id) => {
                Self::Attestation(subnet_id, Box::new(encoding::from_bytes(&bytes, max_size)?))
            }
            GossipKind::BlsToExecutionChange => {
                Self::BlsToExecutionChange(Box::new(encoding::from_bytes(&bytes, max_size)?))
            }
            GossipKind::BlobSidecar(subnet_id) => {
                Self::BlobSidecar(subnet_id, Arc::new(encoding::from_bytes(&bytes, max_size)?))
            }
            GossipKind::ProposerSlashing => {
                Self::ProposerSlashing(Box::new(encoding::from_bytes(&bytes, max_size)?))
            }
            GossipKind::AttesterSlashing => {
                Self::AttesterSlashing(Box::new(encoding::from_bytes(&bytes, max_size)?))
            }
            GossipKind::VoluntaryExit => {
                Self::VoluntaryExit(Box::new(encoding::from_bytes(&bytes, max_size)?))
            }
        };

        Ok(message)
    }

    /// Encodes and compresses the message for publishing.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::AggregateAndProof(aggregate_and_proof) => {
                encoding::to_bytes(aggregate_and_proof.as_ref())?
            }
            Self::Attestation(_, attestation) => encoding::to_bytes(attestation.as_ref())?,
            Self::BlsToExecutionChange(change) => encoding::to_bytes(change.as_ref())?,
            Self::BlobSidecar(_, blob_sidecar) => encoding::to_bytes(blob_sidecar.as_ref())?,
            Self::ProposerSlashing(slashing) => encoding::to_bytes(slashing.as_ref())?,
            Self::AttesterSlashing(slashing) => encoding::to_bytes(slashing.as_ref())?,
            Self::VoluntaryExit(exit) => encoding::to_bytes(exit.as_ref())?,
        };

        snap::raw::Encoder::new()
            .compress_vec(&bytes)
            .map_err(Into::into)
    }

    #[must_use]
    pub const fn kind(&self) -> GossipKind {
        match self {
            Self::AggregateAndProof(_) => GossipKind::BeaconAggregateAndProof,
            Self::Attestation(subnet_id, _) => GossipKind::Attestation(*subnet_id),
            Self::BlsToExecutionChange(_) => GossipKind::BlsToExecutionChange,
            Self::BlobSidecar(subnet_id, _) => GossipKind::BlobSidecar(*subnet_id),
            Self::ProposerSlashing(_) => GossipKind::ProposerSlashing,
            Self::AttesterSlashing(_) => GossipKind::AttesterSlashing,
            Self::VoluntaryExit(_) => GossipKind::VoluntaryExit,
        }
    }
}
