//! In-memory chain used by tests in this crate.

use core::{
    ops::Range,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use batch_verifier::{BatchVerifier, BatchVerifierConfig, BatchVerifierHandle};
use helper_functions::{misc, mock::MockBackend};
use parking_lot::RwLock;
use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;
use types::{
    config::Config,
    deneb::containers::{BeaconBlock, SignedBeaconBlock},
    encoding::HashTreeRoot as _,
    nonstandard::Phase,
    phase0::{
        beacon_state::{BeaconState, Validator},
        consts::FAR_FUTURE_EPOCH,
        containers::{Checkpoint, Fork},
        primitives::{PublicKeyBytes, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    traits::Chain,
};

use crate::{
    misc::PeerId,
    rpc::{Protocol, RequestHandler, Transport},
};

pub const CURRENT_SLOT: Slot = 20;
pub const VALIDATOR_COUNT: u64 = 16;
pub const COMMITTEE_SIZE: u64 = 4;

pub fn config() -> Config {
    Config {
        capella_fork_epoch: 0,
        deneb_fork_epoch: 0,
        shard_committee_period: 0,
        ..Config::minimal()
    }
}

pub fn public_key(validator_index: ValidatorIndex) -> PublicKeyBytes {
    let byte = u8::try_from(validator_index + 1).expect("test validator indices are small");
    PublicKeyBytes::repeat_byte(byte)
}

// Committee 0 at `slot` is made of 4 consecutive validators. Every slot has exactly one committee.
pub fn committee(slot: Slot) -> Vec<ValidatorIndex> {
    let first = (slot % (VALIDATOR_COUNT / COMMITTEE_SIZE)) * COMMITTEE_SIZE;
    (first..first + COMMITTEE_SIZE).collect()
}

pub fn proposer(slot: Slot) -> ValidatorIndex {
    slot % VALIDATOR_COUNT
}

pub fn state(config: &Config) -> BeaconState {
    let validators = (0..VALIDATOR_COUNT)
        .map(|validator_index| {
            let pubkey = public_key(validator_index);

            Validator {
                pubkey,
                withdrawal_credentials: misc::bls_withdrawal_credentials(pubkey),
                activation_epoch: 0,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            }
        })
        .collect();

    let slots = 0..CURRENT_SLOT + config.slots_per_epoch.get();

    let version = config.version(Phase::Deneb);

    BeaconState {
        slot: CURRENT_SLOT,
        genesis_validators_root: H256::repeat_byte(7),
        fork: Fork {
            previous_version: version,
            current_version: version,
            epoch: 0,
        },
        validators,
        finalized_checkpoint: Checkpoint::default(),
        committees: slots.clone().map(|slot| ((slot, 0), committee(slot))).collect(),
        proposers: slots.map(|slot| (slot, proposer(slot))).collect(),
    }
}

pub fn block(slot: Slot, parent_root: H256) -> SignedBeaconBlock {
    SignedBeaconBlock {
        message: BeaconBlock {
            slot,
            proposer_index: proposer(slot),
            parent_root,
            ..BeaconBlock::default()
        },
        ..SignedBeaconBlock::default()
    }
}

/// Chain whose every known block leads to the same state.
pub struct TestChain {
    config: Arc<Config>,
    state: Arc<BeaconState>,
    blocks: RwLock<BTreeMap<H256, Arc<SignedBeaconBlock>>>,
    finalized_checkpoint: Checkpoint,
    synced: AtomicBool,
    genesis_time: UnixSeconds,
    now: Duration,
}

impl TestChain {
    pub fn new(config: Config) -> Self {
        let state = Arc::new(state(&config));
        let now = misc::start_of_slot(&config, 0, CURRENT_SLOT) + Duration::from_secs(1);

        Self {
            config: Arc::new(config),
            state,
            blocks: RwLock::default(),
            finalized_checkpoint: Checkpoint::default(),
            synced: AtomicBool::new(true),
            genesis_time: 0,
            now,
        }
    }

    pub fn with_state(mut self, state: BeaconState) -> Self {
        self.state = Arc::new(state);
        self
    }

    pub const fn with_finalized_checkpoint(mut self, finalized_checkpoint: Checkpoint) -> Self {
        self.finalized_checkpoint = finalized_checkpoint;
        self
    }

    pub fn state(&self) -> &BeaconState {
        &self.state
    }

    pub fn add_block(&self, block: SignedBeaconBlock) -> H256 {
        let block_root = block.message.hash_tree_root();
        self.blocks.write().insert(block_root, Arc::new(block));
        block_root
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Relaxed);
    }
}

impl Chain for TestChain {
    fn chain_config(&self) -> &Arc<Config> {
        &self.config
    }

    fn head_state(&self) -> Arc<BeaconState> {
        self.state.clone()
    }

    fn state_at_block(&self, block_root: H256) -> Option<Arc<BeaconState>> {
        self.contains_block(block_root).then(|| self.state.clone())
    }

    fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    fn contains_block(&self, block_root: H256) -> bool {
        self.blocks.read().contains_key(&block_root)
    }

    fn block_slot(&self, block_root: H256) -> Option<Slot> {
        self.blocks.read().get(&block_root).map(|block| block.slot())
    }

    fn block_by_root(&self, block_root: H256) -> Option<Arc<SignedBeaconBlock>> {
        self.blocks.read().get(&block_root).cloned()
    }

    fn blocks_by_range(&self, slots: Range<Slot>) -> Vec<Arc<SignedBeaconBlock>> {
        let mut blocks = self
            .blocks
            .read()
            .values()
            .filter(|block| slots.contains(&block.slot()))
            .cloned()
            .collect::<Vec<_>>();

        blocks.sort_by_key(|block| block.slot());
        blocks
    }

    fn genesis_time(&self) -> UnixSeconds {
        self.genesis_time
    }

    fn is_forward_synced(&self) -> bool {
        self.synced.load(Ordering::Relaxed)
    }

    fn now(&self) -> Duration {
        self.now
    }
}

/// Starts a verifier backed by [`MockBackend`] that runs until `cancellation_token` is cancelled.
pub fn spawn_verifier(cancellation_token: &CancellationToken) -> BatchVerifierHandle {
    let backend = Arc::new(MockBackend::default());
    let (verifier, handle) = BatchVerifier::new(backend, BatchVerifierConfig::default(), None);

    tokio::spawn(verifier.run(cancellation_token.clone()));

    handle
}

/// Peer that answers requests from a [`RequestHandler`] over an in-memory stream.
pub struct LocalPeer {
    pub handler: Arc<RequestHandler<TestChain>>,
}

#[async_trait]
impl Transport for LocalPeer {
    type Stream = DuplexStream;

    async fn open_stream(&self, peer_id: PeerId, protocol: Protocol) -> Result<DuplexStream> {
        let (client, server) = tokio::io::duplex(1 << 16);
        let handler = self.handler.clone();

        tokio::spawn(async move {
            handler
                .handle(peer_id, protocol, server, &CancellationToken::new())
                .await
        });

        Ok(client)
    }
}
