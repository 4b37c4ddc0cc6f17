use core::{ops::Range, time::Duration};
use std::{sync::Arc, time::SystemTime};

use crate::{
    config::Config,
    deneb::containers::SignedBeaconBlock,
    phase0::{
        beacon_state::BeaconState,
        containers::Checkpoint,
        primitives::{Slot, UnixSeconds, H256},
    },
};

/// Read-only access to the chain maintained by fork choice.
///
/// Implementations must be cheap to call from many tasks at once.
pub trait Chain: Send + Sync + 'static {
    fn chain_config(&self) -> &Arc<Config>;

    fn head_state(&self) -> Arc<BeaconState>;

    /// State after applying the block with root `block_root`, if that block is known.
    fn state_at_block(&self, block_root: H256) -> Option<Arc<BeaconState>>;

    fn finalized_checkpoint(&self) -> Checkpoint;

    fn contains_block(&self, block_root: H256) -> bool;

    fn block_slot(&self, block_root: H256) -> Option<Slot>;

    fn block_by_root(&self, block_root: H256) -> Option<Arc<SignedBeaconBlock>>;

    /// Canonical blocks with slots in `slots`, in ascending slot order.
    fn blocks_by_range(&self, slots: Range<Slot>) -> Vec<Arc<SignedBeaconBlock>>;

    fn genesis_time(&self) -> UnixSeconds;

    fn is_forward_synced(&self) -> bool;

    /// Time elapsed since the Unix epoch.
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
    }
}
