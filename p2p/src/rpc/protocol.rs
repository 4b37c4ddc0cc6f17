use core::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use strum::IntoStaticStr;
use tokio::io::{AsyncRead, AsyncWrite};
use types::{config::Config, phase0::primitives::Slot};

use crate::misc::PeerId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Protocol {
    BlocksByRange,
    BlocksByRoot,
}

impl Protocol {
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::BlocksByRange => "/eth2/beacon_chain/req/beacon_blocks_by_range/2/ssz_snappy",
            Self::BlocksByRoot => "/eth2/beacon_chain/req/beacon_blocks_by_root/2/ssz_snappy",
        }
    }
}

/// Opens request streams to peers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn open_stream(&self, peer_id: PeerId, protocol: Protocol) -> Result<Self::Stream>;
}

/// Maximum number of blocks in a single request or response.
///
/// Read on every chunk so that changes take effect for requests already in flight.
pub struct RequestLimits {
    max_request_blocks: AtomicU64,
}

impl RequestLimits {
    #[must_use]
    pub fn new(config: &Config, slot: Slot) -> Self {
        Self {
            max_request_blocks: AtomicU64::new(Self::at_slot(config, slot)),
        }
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.max_request_blocks.load(Ordering::Acquire)
    }

    pub fn set(&self, max_request_blocks: u64) {
        self.max_request_blocks
            .store(max_request_blocks, Ordering::Release);
    }

    pub fn on_slot(&self, config: &Config, slot: Slot) {
        let new = Self::at_slot(config, slot);
        let old = self.max_request_blocks.swap(new, Ordering::AcqRel);

        if old != new {
            info!("maximum blocks per request changed from {old} to {new} at slot {slot}");
        }
    }

    fn at_slot(config: &Config, slot: Slot) -> u64 {
        config.max_request_blocks(config.phase_at_slot(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_switches_at_deneb() {
        let config = Config {
            deneb_fork_epoch: 2,
            ..Config::minimal()
        };

        let limits = RequestLimits::new(&config, 15);

        assert_eq!(limits.get(), config.max_request_blocks);

        limits.on_slot(&config, 16);

        assert_eq!(limits.get(), config.max_request_blocks_deneb);
    }
}
