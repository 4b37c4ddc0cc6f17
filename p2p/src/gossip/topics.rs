//! Gossip topic names.
//!
//! See [topics and messages in `consensus-specs`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/p2p-interface.md#topics-and-messages).

use core::{fmt, str::FromStr};

use anyhow::{bail, ensure, Error as AnyhowError, Result};
use helper_functions::misc;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        primitives::{ForkDigest, SubnetId},
    },
};

const TOPIC_PREFIX: &str = "eth2";
const ENCODING_POSTFIX: &str = "ssz_snappy";

const BEACON_AGGREGATE_AND_PROOF: &str = "beacon_aggregate_and_proof";
const BEACON_ATTESTATION_PREFIX: &str = "beacon_attestation_";
const BLS_TO_EXECUTION_CHANGE: &str = "bls_to_execution_change";
const BLOB_SIDECAR_PREFIX: &str = "blob_sidecar_";
const PROPOSER_SLASHING: &str = "proposer_slashing";
const ATTESTER_SLASHING: &str = "attester_slashing";
const VOLUNTARY_EXIT: &str = "voluntary_exit";

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GossipKind {
    BeaconAggregateAndProof,
    Attestation(SubnetId),
    BlsToExecutionChange,
    BlobSidecar(SubnetId),
    ProposerSlashing,
    AttesterSlashing,
    VoluntaryExit,
}

impl GossipKind {
    /// Topic name without the subnet, used as a metrics label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BeaconAggregateAndProof => BEACON_AGGREGATE_AND_PROOF,
            Self::Attestation(_) => "beacon_attestation",
            Self::BlsToExecutionChange => BLS_TO_EXECUTION_CHANGE,
            Self::BlobSidecar(_) => "blob_sidecar",
            Self::ProposerSlashing => PROPOSER_SLASHING,
            Self::AttesterSlashing => ATTESTER_SLASHING,
            Self::VoluntaryExit => VOLUNTARY_EXIT,
        }
    }

    /// Topics without subnets.
    #[must_use]
    pub const fn core_topics() -> [Self; 5] {
        [
            Self::BeaconAggregateAndProof,
            Self::BlsToExecutionChange,
            Self::ProposerSlashing,
            Self::AttesterSlashing,
            Self::VoluntaryExit,
        ]
    }
}

impl fmt::Display for GossipKind {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Attestation(subnet_id) => write!(formatter, "{BEACON_ATTESTATION_PREFIX}{subnet_id}"),
            Self::BlobSidecar(subnet_id) => write!(formatter, "{BLOB_SIDECAR_PREFIX}{subnet_id}"),
            other => formatter.write_str(other.label()),
        }
    }
}

impl FromStr for GossipKind {
    type Err = AnyhowError;

    fn from_str(name: &str) -> Result<Self> {
        let kind = match name {
            BEACON_AGGREGATE_AND_PROOF => Self::BeaconAggregateAndProof,
            BLS_TO_EXECUTION_CHANGE => Self::BlsToExecutionChange,
            PROPOSER_SLASHING => Self::ProposerSlashing,
            ATTESTER_SLASHING => Self::AttesterSlashing,
            VOLUNTARY_EXIT => Self::VoluntaryExit,
            _ => {
                if let Some(subnet_id) = name.strip_prefix(BEACON_ATTESTATION_PREFIX) {
                    Self::Attestation(subnet_id.parse()?)
                } else if let Some(subnet_id) = name.strip_prefix(BLOB_SIDECAR_PREFIX) {
                    Self::BlobSidecar(subnet_id.parse()?)
                } else {
                    bail!("unknown gossip topic name: {name}")
                }
            }
        };

        Ok(kind)
    }
}

/// `/eth2/{fork_digest}/{name}/ssz_snappy`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GossipTopic {
    pub fork_digest: ForkDigest,
    pub kind: GossipKind,
}

impl GossipTopic {
    #[must_use]
    pub const fn new(fork_digest: ForkDigest, kind: GossipKind) -> Self {
        Self { fork_digest, kind }
    }

    /// Topic for `kind` in the fork that `state` is in.
    #[must_use]
    pub fn for_state(state: &BeaconState, kind: GossipKind) -> Self {
        let fork_digest =
            misc::compute_fork_digest(state.fork.current_version, state.genesis_validators_root);

        Self::new(fork_digest, kind)
    }

    pub fn validate_subnet(&self, config: &Config) -> Result<()> {
        match self.kind {
            GossipKind::Attestation(subnet_id) => ensure!(
                subnet_id < config.attestation_subnet_count.get(),
                "attestation subnet {subnet_id} is out of range",
            ),
            GossipKind::BlobSidecar(subnet_id) => ensure!(
                subnet_id < config.blob_sidecar_subnet_count.get(),
                "blob sidecar subnet {subnet_id} is out of range",
            ),
            _ => {}
        }

        Ok(())
    }
}

impl fmt::Display for GossipTopic {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "/{TOPIC_PREFIX}/{:x}/{}/{ENCODING_POSTFIX}",
            self.fork_digest, self.kind,
        )
    }
}

impl FromStr for GossipTopic {
    type Err = AnyhowError;

    fn from_str(topic: &str) -> Result<Self> {
        let parts = topic.split('/').collect::<Vec<_>>();

        let [empty, prefix, fork_digest, name, encoding] = parts.as_slice() else {
            bail!("gossip topic has wrong number of parts: {topic}");
        };

        ensure!(
            empty.is_empty() && *prefix == TOPIC_PREFIX && *encoding == ENCODING_POSTFIX,
            "malformed gossip topic: {topic}",
        );

        Ok(Self {
            fork_digest: fork_digest.parse()?,
            kind: name.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::phase0::primitives::H32;

    use super::*;

    #[test_case(GossipKind::BeaconAggregateAndProof, "/eth2/01020304/beacon_aggregate_and_proof/ssz_snappy")]
    #[test_case(GossipKind::Attestation(17), "/eth2/01020304/beacon_attestation_17/ssz_snappy")]
    #[test_case(GossipKind::BlobSidecar(5), "/eth2/01020304/blob_sidecar_5/ssz_snappy")]
    #[test_case(GossipKind::VoluntaryExit, "/eth2/01020304/voluntary_exit/ssz_snappy")]
    fn topic_is_formatted_and_parsed(kind: GossipKind, expected: &str) -> Result<()> {
        let topic = GossipTopic::new(H32([1, 2, 3, 4]), kind);

        assert_eq!(topic.to_string(), expected);
        assert_eq!(expected.parse::<GossipTopic>()?, topic);

        Ok(())
    }

    #[test_case("/eth2/01020304/beacon_block/ssz_snappy")]
    #[test_case("/eth2/01020304/voluntary_exit/ssz")]
    #[test_case("/eth1/01020304/voluntary_exit/ssz_snappy")]
    #[test_case("/eth2/01020304/beacon_attestation_x/ssz_snappy")]
    #[test_case("eth2/01020304/voluntary_exit")]
    fn malformed_topics_are_rejected(topic: &str) {
        assert!(topic.parse::<GossipTopic>().is_err());
    }

    #[test]
    fn subnets_are_bounded_by_config() {
        let config = Config::mainnet();
        let digest = H32::zero();

        assert!(GossipTopic::new(digest, GossipKind::Attestation(63))
            .validate_subnet(&config)
            .is_ok());

        assert!(GossipTopic::new(digest, GossipKind::Attestation(64))
            .validate_subnet(&config)
            .is_err());

        assert!(GossipTopic::new(digest, GossipKind::BlobSidecar(6))
            .validate_subnet(&config)
            .is_err());
    }
}
