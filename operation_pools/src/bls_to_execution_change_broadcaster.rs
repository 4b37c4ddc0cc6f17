//! Rebroadcasting of BLS to execution changes received before the Capella fork.
//!
//! Changes received before Capella cannot be included in blocks, so peers that joined later or
//! pruned their pools may never have seen them. They are published again once the fork happens.

use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use futures::channel::mpsc::UnboundedSender;
use logging::{debug_with_status, info_with_status};
use prometheus_metrics::Metrics;
use rand::{seq::SliceRandom as _, Rng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use types::{
    capella::containers::SignedBlsToExecutionChange,
    config::Config,
    nonstandard::Phase,
    phase0::{beacon_state::BeaconState, primitives::Slot},
    traits::Chain,
};

use crate::{
    messages::PoolToP2pMessage,
    pool::{OperationPool, PoolOperation as _},
};

pub const DEFAULT_BATCH_SIZE: usize = 128;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[must_use]
pub fn is_trigger_slot(config: &Config, slot: Slot) -> bool {
    config.fork_slot(Phase::Capella) == Some(slot)
}

/// Changes left to publish, in random order.
pub struct Schedule {
    remaining: Vec<SignedBlsToExecutionChange>,
}

impl Schedule {
    pub fn new(mut changes: Vec<SignedBlsToExecutionChange>, rng: &mut impl Rng) -> Self {
        changes.shuffle(rng);

        Self { remaining: changes }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Takes up to `batch_size` changes off the schedule and returns those still valid for `state`.
    pub fn tick(
        &mut self,
        config: &Config,
        state: &BeaconState,
        batch_size: usize,
    ) -> Vec<SignedBlsToExecutionChange> {
        let split_at = self.remaining.len().saturating_sub(batch_size);

        self.remaining
            .split_off(split_at)
            .into_iter()
            .rev()
            .filter(|change| match change.validate_for_inclusion(config, state) {
                Ok(()) => true,
                Err(error) => {
                    debug_with_status!(
                        "not rebroadcasting BLS to execution change for validator {}: {error}",
                        change.message.validator_index,
                    );

                    false
                }
            })
            .collect()
    }
}

pub struct Broadcaster<C> {
    chain: Arc<C>,
    pool: Arc<OperationPool<SignedBlsToExecutionChange>>,
    pool_to_p2p_tx: UnboundedSender<PoolToP2pMessage>,
    batch_size: usize,
    interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl<C: Chain> Broadcaster<C> {
    #[must_use]
    pub const fn new(
        chain: Arc<C>,
        pool: Arc<OperationPool<SignedBlsToExecutionChange>>,
        pool_to_p2p_tx: UnboundedSender<PoolToP2pMessage>,
        batch_size: usize,
        interval: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            chain,
            pool,
            pool_to_p2p_tx,
            batch_size,
            interval,
            metrics,
        }
    }

    pub async fn run(self, cancellation_token: CancellationToken) -> Result<()> {
        let mut schedule = Schedule::new(self.pool.pending_all()?, &mut rand::thread_rng());

        info_with_status!(
            "rebroadcasting {} BLS to execution changes at Capella fork",
            schedule.remaining(),
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut published = 0;

        while !schedule.is_exhausted() {
            tokio::select! {
                biased;

                () = cancellation_token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let state = self.chain.head_state();
            let batch = schedule.tick(self.chain.chain_config(), &state, self.batch_size);

            published += batch.len();

            if let Some(metrics) = self.metrics.as_ref() {
                metrics
                    .bls_to_execution_change_rebroadcasts
                    .inc_by(batch.len().try_into()?);
            }

            for change in batch {
                PoolToP2pMessage::PublishSignedBlsToExecutionChange(Box::new(change))
                    .send(&self.pool_to_p2p_tx);
            }
        }

        info_with_status!(
            "BLS to execution change rebroadcast finished (published: {published}, \
             remaining: {})",
            schedule.remaining(),
        );

        Ok(())
    }
}
