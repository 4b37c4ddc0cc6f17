use std::sync::Arc;

use anyhow::Result;
use log::warn;
use once_cell::sync::OnceCell;
use prometheus::{
    histogram_opts, opts, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec,
};
use types::phase0::primitives::Slot;

pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    // Overview
    live: IntGauge,
    beacon_slot: IntGauge,

    // Collection Lengths
    collection_lengths: IntGaugeVec,

    // Gossip
    gossip_objects: IntCounterVec,
    gossip_validation_results: IntCounterVec,

    // Operation pools
    operation_pool_insertions: IntCounterVec,
    operation_pool_map_cycles: IntCounterVec,
    pub bls_to_execution_change_rebroadcasts: IntCounter,

    // Batch verifier
    pub batch_verifier_batch_sizes: Histogram,
    pub batch_verifier_batch_times: Histogram,
    pub batch_verifier_fallbacks: IntCounter,
    batch_verifier_failed_requests: IntCounterVec,

    // Pending attestations
    pending_attestations: IntGauge,
    pub pending_attestations_flushed: IntCounter,
    pending_attestations_dropped: IntCounterVec,

    // Block fetch
    pub block_fetch_times: HistogramVec,
    block_fetch_errors: IntCounterVec,
}

impl Metrics {
    #[expect(clippy::too_many_lines)]
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Overview
            live: IntGauge::new("IS_LIVE", "Node status")?,
            beacon_slot: IntGauge::new("BEACON_SLOT", "Latest slot seen by the node")?,

            // Collection Lengths
            collection_lengths: IntGaugeVec::new(
                opts!("COLLECTION_LENGTHS", "Number of items in each collection"),
                &["type", "name"],
            )?,

            // Gossip
            gossip_objects: IntCounterVec::new(
                opts!(
                    "RECEIVED_OBJECTS_OVER_GOSSIP",
                    "Counter for different objects received via gossip",
                ),
                &["type"],
            )?,

            gossip_validation_results: IntCounterVec::new(
                opts!(
                    "GOSSIP_VALIDATION_RESULTS",
                    "Counter for gossip validation results per topic",
                ),
                &["topic", "result"],
            )?,

            // Operation pools
            operation_pool_insertions: IntCounterVec::new(
                opts!(
                    "OPERATION_POOL_INSERTIONS",
                    "Number of objects inserted into each operation pool",
                ),
                &["pool"],
            )?,

            operation_pool_map_cycles: IntCounterVec::new(
                opts!(
                    "OPERATION_POOL_MAP_CYCLES",
                    "Number of times an operation pool rebuilt its map after shrinking",
                ),
                &["pool"],
            )?,

            bls_to_execution_change_rebroadcasts: IntCounter::new(
                "BLS_TO_EXECUTION_CHANGE_REBROADCASTS",
                "Number of BLS to execution changes rebroadcast at the Capella fork",
            )?,

            // Batch verifier
            batch_verifier_batch_sizes: Histogram::with_opts(
                histogram_opts!(
                    "BATCH_VERIFIER_BATCH_SIZES",
                    "Number of signatures verified in one batch",
                )
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0]),
            )?,

            batch_verifier_batch_times: Histogram::with_opts(histogram_opts!(
                "BATCH_VERIFIER_BATCH_TIMES",
                "Batch signature verification times",
            ))?,

            batch_verifier_fallbacks: IntCounter::new(
                "BATCH_VERIFIER_FALLBACKS",
                "Number of combined batches that failed and were verified per request",
            )?,

            batch_verifier_failed_requests: IntCounterVec::new(
                opts!(
                    "BATCH_VERIFIER_FAILED_REQUESTS",
                    "Number of verification requests that did not succeed",
                ),
                &["reason"],
            )?,

            // Pending attestations
            pending_attestations: IntGauge::new(
                "PENDING_ATTESTATIONS",
                "Number of aggregates waiting for their block",
            )?,

            pending_attestations_flushed: IntCounter::new(
                "PENDING_ATTESTATIONS_FLUSHED",
                "Number of pending aggregates delivered after their block arrived",
            )?,

            pending_attestations_dropped: IntCounterVec::new(
                opts!(
                    "PENDING_ATTESTATIONS_DROPPED",
                    "Number of pending aggregates dropped",
                ),
                &["reason"],
            )?,

            // Block fetch
            block_fetch_times: HistogramVec::new(
                histogram_opts!("BLOCK_FETCH_TIMES", "Block request round trip times"),
                &["protocol"],
            )?,

            block_fetch_errors: IntCounterVec::new(
                opts!("BLOCK_FETCH_ERRORS", "Number of failed block requests"),
                &["kind"],
            )?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        let default_registry = prometheus::default_registry();

        default_registry.register(Box::new(self.live.clone()))?;
        default_registry.register(Box::new(self.beacon_slot.clone()))?;
        default_registry.register(Box::new(self.collection_lengths.clone()))?;
        default_registry.register(Box::new(self.gossip_objects.clone()))?;
        default_registry.register(Box::new(self.gossip_validation_results.clone()))?;
        default_registry.register(Box::new(self.operation_pool_insertions.clone()))?;
        default_registry.register(Box::new(self.operation_pool_map_cycles.clone()))?;
        default_registry.register(Box::new(self.bls_to_execution_change_rebroadcasts.clone()))?;
        default_registry.register(Box::new(self.batch_verifier_batch_sizes.clone()))?;
        default_registry.register(Box::new(self.batch_verifier_batch_times.clone()))?;
        default_registry.register(Box::new(self.batch_verifier_fallbacks.clone()))?;
        default_registry.register(Box::new(self.batch_verifier_failed_requests.clone()))?;
        default_registry.register(Box::new(self.pending_attestations.clone()))?;
        default_registry.register(Box::new(self.pending_attestations_flushed.clone()))?;
        default_registry.register(Box::new(self.pending_attestations_dropped.clone()))?;
        default_registry.register(Box::new(self.block_fetch_times.clone()))?;
        default_registry.register(Box::new(self.block_fetch_errors.clone()))?;

        Ok(())
    }

    // Overview
    pub fn set_live(&self) {
        self.live.set(1)
    }

    pub fn set_slot(&self, slot: Slot) {
        self.beacon_slot.set(slot.try_into().unwrap_or(i64::MAX))
    }

    // Collection Lengths
    pub fn set_collection_length(&self, typename: &str, collection_name: &str, value: usize) {
        self.collection_lengths
            .get_metric_with_label_values(&[typename, collection_name])
            .expect(
                "the number of label values should match the number \
                 of labels that collection_lengths was created with",
            )
            .set(value.try_into().unwrap_or(i64::MAX))
    }

    // Gossip
    pub fn register_gossip_object(&self, labels: &[&str]) {
        match self.gossip_objects.get_metric_with_label_values(labels) {
            Ok(counter) => counter.inc(),
            Err(error) => {
                warn!("unable to register received object over gossip for {labels:?}: {error:?}")
            }
        }
    }

    pub fn register_gossip_validation_result(&self, topic: &str, result: &str) {
        match self
            .gossip_validation_results
            .get_metric_with_label_values(&[topic, result])
        {
            Ok(counter) => counter.inc(),
            Err(error) => {
                warn!("unable to register gossip validation result for {topic}: {error:?}")
            }
        }
    }

    // Operation pools
    pub fn register_pool_insertion(&self, pool: &str) {
        match self.operation_pool_insertions.get_metric_with_label_values(&[pool]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to register insertion into {pool}: {error:?}"),
        }
    }

    pub fn register_pool_map_cycle(&self, pool: &str) {
        match self.operation_pool_map_cycles.get_metric_with_label_values(&[pool]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to register map cycle of {pool}: {error:?}"),
        }
    }

    // Batch verifier
    pub fn register_batch_verifier_failure(&self, reason: &str) {
        match self
            .batch_verifier_failed_requests
            .get_metric_with_label_values(&[reason])
        {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to register batch verifier failure {reason}: {error:?}"),
        }
    }

    // Pending attestations
    pub fn set_pending_attestations(&self, count: usize) {
        self.pending_attestations
            .set(count.try_into().unwrap_or(i64::MAX))
    }

    pub fn register_pending_attestation_drop(&self, reason: &str) {
        match self
            .pending_attestations_dropped
            .get_metric_with_label_values(&[reason])
        {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to register pending attestation drop {reason}: {error:?}"),
        }
    }

    // Block fetch
    pub fn register_block_fetch_error(&self, kind: &str) {
        match self.block_fetch_errors.get_metric_with_label_values(&[kind]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to register block fetch error {kind}: {error:?}"),
        }
    }
}
