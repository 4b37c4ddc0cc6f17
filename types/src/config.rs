use core::{num::NonZeroU64, time::Duration};
use std::borrow::Cow;

use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use serde_with::{As, DurationMilliSeconds, DurationSeconds};

use crate::{
    nonstandard::Phase,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        primitives::{Epoch, Slot, Version, H32},
    },
};

/// Configuration variables customizable at runtime.
///
/// See [configurations in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/v1.4.0/configs).
///
/// Preset values that this subsystem depends on are included here as well.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,

    // Preset
    pub slots_per_epoch: NonZeroU64,
    pub max_validators_per_committee: u64,
    pub target_aggregators_per_committee: NonZeroU64,
    pub max_blobs_per_block: u64,

    // Forking
    pub genesis_fork_version: Version,
    pub altair_fork_version: Version,
    pub altair_fork_epoch: Epoch,
    pub bellatrix_fork_version: Version,
    pub bellatrix_fork_epoch: Epoch,
    pub capella_fork_version: Version,
    pub capella_fork_epoch: Epoch,
    pub deneb_fork_version: Version,
    pub deneb_fork_epoch: Epoch,

    // Time parameters
    pub seconds_per_slot: NonZeroU64,
    pub shard_committee_period: u64,

    // Networking
    pub attestation_propagation_slot_range: u64,
    pub attestation_subnet_count: NonZeroU64,
    pub blob_sidecar_subnet_count: NonZeroU64,
    pub gossip_max_size: usize,
    pub max_chunk_size: usize,
    pub max_request_blocks: u64,
    pub max_request_blocks_deneb: u64,
    #[serde(with = "As::<DurationMilliSeconds>")]
    pub maximum_gossip_clock_disparity: Duration,
    #[serde(with = "As::<DurationSeconds>")]
    pub resp_timeout: Duration,
    #[serde(with = "As::<DurationSeconds>")]
    pub ttfb_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("custom"),

            // Preset
            slots_per_epoch: nonzero!(32_u64),
            max_validators_per_committee: 2048,
            target_aggregators_per_committee: nonzero!(16_u64),
            max_blobs_per_block: 6,

            // Forking
            genesis_fork_version: H32(hex!("00000000")),
            altair_fork_version: H32(hex!("01000000")),
            altair_fork_epoch: FAR_FUTURE_EPOCH,
            bellatrix_fork_version: H32(hex!("02000000")),
            bellatrix_fork_epoch: FAR_FUTURE_EPOCH,
            capella_fork_version: H32(hex!("03000000")),
            capella_fork_epoch: FAR_FUTURE_EPOCH,
            deneb_fork_version: H32(hex!("04000000")),
            deneb_fork_epoch: FAR_FUTURE_EPOCH,

            // Time parameters
            seconds_per_slot: nonzero!(12_u64),
            shard_committee_period: 256,

            // Networking
            attestation_propagation_slot_range: 32,
            attestation_subnet_count: nonzero!(64_u64),
            blob_sidecar_subnet_count: nonzero!(6_u64),
            gossip_max_size: 10 * (1 << 20),
            max_chunk_size: 10 * (1 << 20),
            max_request_blocks: 1024,
            max_request_blocks_deneb: 128,
            maximum_gossip_clock_disparity: Duration::from_millis(500),
            resp_timeout: Duration::from_secs(10),
            ttfb_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// [Mainnet configuration](https://github.com/eth-clients/mainnet/blob/main/metadata/config.yaml).
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("mainnet"),

            // Forking
            altair_fork_epoch: 74240,
            bellatrix_fork_epoch: 144_896,
            capella_fork_epoch: 194_048,
            deneb_fork_epoch: 269_568,

            ..Self::default()
        }
    }

    /// [Minimal configuration](https://github.com/ethereum/consensus-specs/blob/v1.4.0/configs/minimal.yaml).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("minimal"),

            // Preset
            slots_per_epoch: nonzero!(8_u64),
            target_aggregators_per_committee: nonzero!(16_u64),

            // Forking
            genesis_fork_version: H32(hex!("00000001")),
            altair_fork_version: H32(hex!("01000001")),
            bellatrix_fork_version: H32(hex!("02000001")),
            capella_fork_version: H32(hex!("03000001")),
            deneb_fork_version: H32(hex!("04000001")),

            // Time parameters
            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,

            ..Self::default()
        }
    }

    #[must_use]
    pub const fn version(&self, phase: Phase) -> Version {
        match phase {
            Phase::Phase0 => self.genesis_fork_version,
            Phase::Altair => self.altair_fork_version,
            Phase::Bellatrix => self.bellatrix_fork_version,
            Phase::Capella => self.capella_fork_version,
            Phase::Deneb => self.deneb_fork_version,
        }
    }

    #[must_use]
    pub const fn fork_epoch(&self, phase: Phase) -> Epoch {
        match phase {
            Phase::Phase0 => GENESIS_EPOCH,
            Phase::Altair => self.altair_fork_epoch,
            Phase::Bellatrix => self.bellatrix_fork_epoch,
            Phase::Capella => self.capella_fork_epoch,
            Phase::Deneb => self.deneb_fork_epoch,
        }
    }

    /// Returns `None` if the fork is not scheduled.
    #[must_use]
    pub fn fork_slot(&self, phase: Phase) -> Option<Slot> {
        self.fork_epoch(phase).checked_mul(self.slots_per_epoch.get())
    }

    #[must_use]
    pub fn phase_at_epoch(&self, epoch: Epoch) -> Phase {
        enum_iterator::all::<Phase>()
            .take_while(|phase| self.fork_epoch(*phase) <= epoch)
            .last()
            .unwrap_or(Phase::Phase0)
    }

    #[must_use]
    pub fn phase_at_slot(&self, slot: Slot) -> Phase {
        self.phase_at_epoch(slot / self.slots_per_epoch)
    }

    #[must_use]
    pub fn version_at_epoch(&self, epoch: Epoch) -> Version {
        self.version(self.phase_at_epoch(epoch))
    }

    #[must_use]
    pub const fn max_request_blocks(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Phase0 | Phase::Altair | Phase::Bellatrix | Phase::Capella => {
                self.max_request_blocks
            }
            Phase::Deneb => self.max_request_blocks_deneb,
        }
    }

    #[must_use]
    pub const fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot.get())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use test_case::test_case;

    use super::*;

    #[test_case(0 => Phase::Phase0)]
    #[test_case(74_239 => Phase::Phase0)]
    #[test_case(74_240 => Phase::Altair)]
    #[test_case(194_048 => Phase::Capella)]
    #[test_case(269_567 => Phase::Capella)]
    #[test_case(269_568 => Phase::Deneb)]
    #[test_case(FAR_FUTURE_EPOCH => Phase::Deneb)]
    fn phase_at_epoch_with_mainnet_config(epoch: Epoch) -> Phase {
        Config::mainnet().phase_at_epoch(epoch)
    }

    #[test]
    fn unscheduled_forks_have_no_fork_slot() {
        let config = Config::minimal();

        assert_eq!(config.fork_slot(Phase::Phase0), Some(0));
        assert_eq!(config.fork_slot(Phase::Capella), None);
        assert_eq!(config.phase_at_slot(Slot::MAX), Phase::Phase0);
    }

    #[test]
    fn max_request_blocks_drops_at_deneb() {
        let config = Config::mainnet();

        assert_eq!(config.max_request_blocks(Phase::Capella), 1024);
        assert_eq!(config.max_request_blocks(Phase::Deneb), 128);
    }

    #[test]
    fn config_deserializes_partial_yaml() -> Result<()> {
        let yaml = "
            CONFIG_NAME: testnet
            SLOTS_PER_EPOCH: 8
            CAPELLA_FORK_EPOCH: 2
            MAXIMUM_GOSSIP_CLOCK_DISPARITY: 250
        ";

        let config = serde_yaml::from_str::<Config>(yaml)?;

        assert_eq!(config.config_name, "testnet");
        assert_eq!(config.slots_per_epoch.get(), 8);
        assert_eq!(config.fork_slot(Phase::Capella), Some(16));
        assert_eq!(
            config.maximum_gossip_clock_disparity,
            Duration::from_millis(250),
        );
        assert_eq!(config.max_request_blocks, 1024);

        Ok(())
    }
}
