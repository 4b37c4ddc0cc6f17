use std::sync::Arc;

use prometheus_metrics::Metrics;
use types::{
    capella::containers::SignedBlsToExecutionChange,
    deneb::containers::SignedBeaconBlock,
    phase0::containers::{ProposerSlashing, SignedVoluntaryExit},
};

use crate::pool::OperationPool;

pub struct Manager {
    pub bls_to_execution_change_pool: Arc<OperationPool<SignedBlsToExecutionChange>>,
    pub voluntary_exit_pool: Arc<OperationPool<SignedVoluntaryExit>>,
    pub proposer_slashing_pool: Arc<OperationPool<ProposerSlashing>>,
}

impl Manager {
    #[must_use]
    pub fn new(metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            bls_to_execution_change_pool: Arc::new(OperationPool::new(metrics.clone())),
            voluntary_exit_pool: Arc::new(OperationPool::new(metrics.clone())),
            proposer_slashing_pool: Arc::new(OperationPool::new(metrics)),
        }
    }

    /// Removes every operation included in `block` from the pools.
    pub fn on_block_imported(&self, block: &SignedBeaconBlock) {
        let body = &block.message.body;

        for change in &body.bls_to_execution_changes {
            self.bls_to_execution_change_pool.mark_included(change);
        }

        for exit in &body.voluntary_exits {
            self.voluntary_exit_pool.mark_included(exit);
        }

        for slashing in &body.proposer_slashings {
            self.proposer_slashing_pool.mark_included(slashing);
        }
    }
}
