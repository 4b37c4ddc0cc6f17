use core::time::Duration;

use anyhow::{ensure, Result};
use tap::Tap as _;
use types::{
    config::Config,
    deneb::primitives::BlobIndex,
    encoding::HashTreeRoot,
    phase0::{
        consts::{BLS_WITHDRAWAL_PREFIX, GENESIS_SLOT},
        containers::{ForkData, SigningData},
        primitives::{
            CommitteeIndex, DomainType, Epoch, ForkDigest, PublicKeyBytes, Slot, SubnetId,
            UnixSeconds, Version, H256,
        },
    },
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot(config: &Config, slot: Slot) -> Epoch {
    slot / config.slots_per_epoch
}

#[must_use]
pub fn compute_start_slot_at_epoch(config: &Config, epoch: Epoch) -> Slot {
    epoch.saturating_mul(config.slots_per_epoch.get())
}

#[must_use]
pub fn slots_since_epoch_start(config: &Config, slot: Slot) -> u64 {
    slot % config.slots_per_epoch
}

#[must_use]
pub fn is_epoch_start(config: &Config, slot: Slot) -> bool {
    slots_since_epoch_start(config, slot) == 0
}

/// Slot containing the instant `time` (measured from the Unix epoch).
///
/// Times before genesis map to the genesis slot.
#[must_use]
pub fn slot_at_time(config: &Config, genesis_time: UnixSeconds, time: Duration) -> Slot {
    let since_genesis = time.saturating_sub(Duration::from_secs(genesis_time));
    let slot = since_genesis.as_secs() / config.seconds_per_slot;
    GENESIS_SLOT + slot
}

#[must_use]
pub fn start_of_slot(config: &Config, genesis_time: UnixSeconds, slot: Slot) -> Duration {
    let offset = slot.saturating_mul(config.seconds_per_slot.get());
    Duration::from_secs(genesis_time.saturating_add(offset))
}

#[must_use]
pub fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .hash_tree_root()
}

// > Return the 4-byte fork digest for the ``current_version`` and ``genesis_validators_root``.
// > This is a digest primarily used for domain separation on the p2p layer.
#[must_use]
pub fn compute_fork_digest(current_version: Version, genesis_validators_root: H256) -> ForkDigest {
    let root = compute_fork_data_root(current_version, genesis_validators_root);
    ForkDigest::from_slice(&root[..ForkDigest::len_bytes()])
}

#[must_use]
pub fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> H256 {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_else(H256::zero);
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = H256::zero();
    domain[..DomainType::len_bytes()].copy_from_slice(domain_type.as_bytes());
    domain[DomainType::len_bytes()..].copy_from_slice(&fork_data_root[..28]);
    domain
}

#[must_use]
pub fn compute_signing_root(object: &(impl HashTreeRoot + ?Sized), domain: H256) -> H256 {
    SigningData {
        object_root: object.hash_tree_root(),
        domain,
    }
    .hash_tree_root()
}

/// [`compute_subnet_for_attestation`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/phase0/validator.md#broadcast-attestation)
pub fn compute_subnet_for_attestation(
    config: &Config,
    committees_per_slot: u64,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<SubnetId> {
    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
            committee_count: committees_per_slot,
        },
    );

    let committees_since_epoch_start = committees_per_slot * slots_since_epoch_start(config, slot);

    Ok((committees_since_epoch_start + committee_index) % config.attestation_subnet_count)
}

/// [`compute_subnet_for_blob_sidecar`](https://github.com/ethereum/consensus-specs/blob/v1.4.0/specs/deneb/validator.md#sidecar)
#[must_use]
pub fn compute_subnet_for_blob_sidecar(config: &Config, blob_index: BlobIndex) -> SubnetId {
    blob_index % config.blob_sidecar_subnet_count
}

#[must_use]
pub fn bls_withdrawal_credentials(public_key: PublicKeyBytes) -> H256 {
    hashing::hash_bytes(public_key).tap_mut(|credentials| credentials.as_bytes_mut()[0] = BLS_WITHDRAWAL_PREFIX)
}
