use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use batch_verifier::BatchVerifierHandle;
use futures::{
    channel::mpsc::{UnboundedReceiver, UnboundedSender},
    future::FutureExt as _,
    pin_mut, select,
    stream::StreamExt as _,
};
use helper_functions::misc;
use logging::{debug_with_status, info_with_status, warn_with_status, NODE_STATUS};
use operation_pools::{
    bls_to_execution_change_broadcaster, is_bls_to_execution_change_rebroadcast_slot,
    BlsToExecutionChangeBroadcaster, Manager, PoolToP2pMessage,
};
use prometheus_metrics::Metrics;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use types::{
    deneb::containers::SignedBeaconBlock,
    encoding::HashTreeRoot as _,
    phase0::primitives::{Slot, H256},
    traits::Chain,
};

use crate::{
    gossip::{GossipTopic, GossipValidator, PubsubMessage, SeenCacheConfig},
    messages::{ChainToP2p, P2pToChain, ServiceInboundMessage, ServiceOutboundMessage},
    misc::{GossipId, PeerId},
    pending_attestations::{PendingAttestations, PendingConfig},
    rpc::{
        BlockFetcher, BlocksByRangeRequest, BlocksByRootRequest, FetchError, ProcessOutcome,
        Protocol, RequestHandler, RequestLimits, Transport,
    },
    subscriber::Subscriber,
};

// Slot boundaries are detected by polling the clock.
const SLOT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[serde_as]
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub local_peer_id: PeerId,
    pub pending_attestations: PendingConfig,
    pub seen_caches: SeenCacheConfig,
    pub rebroadcast_batch_size: usize,
    #[serde_as(as = "DurationMilliSeconds")]
    pub rebroadcast_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_peer_id: PeerId::default(),
            pending_attestations: PendingConfig::default(),
            seen_caches: SeenCacheConfig::default(),
            rebroadcast_batch_size: bls_to_execution_change_broadcaster::DEFAULT_BATCH_SIZE,
            rebroadcast_interval: bls_to_execution_change_broadcaster::DEFAULT_INTERVAL,
        }
    }
}

pub struct Channels<S> {
    pub chain_to_p2p_rx: UnboundedReceiver<ChainToP2p>,
    pub p2p_to_chain_tx: UnboundedSender<P2pToChain>,
    pub pool_to_p2p_tx: UnboundedSender<PoolToP2pMessage>,
    pub pool_to_p2p_rx: UnboundedReceiver<PoolToP2pMessage>,
    pub network_to_service_tx: UnboundedSender<ServiceInboundMessage>,
    pub service_to_network_rx: UnboundedReceiver<ServiceOutboundMessage<S>>,
}

/// Connects the gossip pipeline, block requests and operation pools to the network transport.
pub struct Network<C, T: Transport> {
    chain: Arc<C>,
    pools: Arc<Manager>,
    pending: Arc<PendingAttestations>,
    validator: Arc<GossipValidator<C>>,
    subscriber: Arc<Subscriber>,
    fetcher: Arc<BlockFetcher<T>>,
    handler: Arc<RequestHandler<C>>,
    limits: Arc<RequestLimits>,
    channels: Channels<T::Stream>,
    rebroadcast_batch_size: usize,
    rebroadcast_interval: Duration,
    rebroadcast: Option<JoinHandle<()>>,
    last_slot: Option<Slot>,
    metrics: Option<Arc<Metrics>>,
}

impl<C: Chain, T: Transport> Network<C, T> {
    #[must_use]
    pub fn new(
        chain: Arc<C>,
        pools: Arc<Manager>,
        verifier: BatchVerifierHandle,
        transport: Arc<T>,
        network_config: NetworkConfig,
        channels: Channels<T::Stream>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let config = chain.chain_config().clone();
        let current_slot = misc::slot_at_time(&config, chain.genesis_time(), chain.now());
        let limits = Arc::new(RequestLimits::new(&config, current_slot));

        let pending = Arc::new(PendingAttestations::new(
            network_config.pending_attestations,
            metrics.clone(),
        ));

        let validator = Arc::new(GossipValidator::new(
            chain.clone(),
            pools.clone(),
            pending.clone(),
            verifier,
            network_config.seen_caches,
            network_config.local_peer_id,
            metrics.clone(),
        ));

        let subscriber = Arc::new(Subscriber::new(
            pools.clone(),
            channels.p2p_to_chain_tx.clone(),
        ));

        let fetcher = Arc::new(BlockFetcher::new(
            transport,
            config,
            limits.clone(),
            metrics.clone(),
        ));

        let handler = Arc::new(RequestHandler::new(chain.clone(), limits.clone()));

        Self {
            chain,
            pools,
            pending,
            validator,
            subscriber,
            fetcher,
            handler,
            limits,
            channels,
            rebroadcast_batch_size: network_config.rebroadcast_batch_size,
            rebroadcast_interval: network_config.rebroadcast_interval,
            rebroadcast: None,
            last_slot: None,
            metrics,
        }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<()> {
        let mut slot_check_interval =
            IntervalStream::new(tokio::time::interval(SLOT_CHECK_INTERVAL)).fuse();

        let cancelled = cancellation_token.cancelled().fuse();
        pin_mut!(cancelled);

        loop {
            select! {
                () = cancelled => break,

                _ = slot_check_interval.select_next_some() => {
                    self.check_slot(&cancellation_token);
                }

                message = self.channels.service_to_network_rx.select_next_some() => {
                    match message {
                        ServiceOutboundMessage::GossipMessage(gossip_id, topic, data) => {
                            self.handle_gossip_message(gossip_id, topic, data, &cancellation_token);
                        }
                        ServiceOutboundMessage::InboundStream(peer_id, protocol, stream) => {
                            self.handle_inbound_stream(peer_id, protocol, stream, &cancellation_token);
                        }
                    }
                }

                message = self.channels.chain_to_p2p_rx.select_next_some() => {
                    match message {
                        ChainToP2p::BlockImported(block) => {
                            self.handle_block_imported(&block, &cancellation_token);
                        }
                        ChainToP2p::BlockNeeded(block_root, peer_id) => {
                            self.request_block_by_root(block_root, peer_id, &cancellation_token);
                        }
                        ChainToP2p::BlocksByRangeNeeded(peer_id, start_slot, count) => {
                            self.request_blocks_by_range(
                                peer_id,
                                start_slot,
                                count,
                                &cancellation_token,
                            );
                        }
                    }
                }

                message = self.channels.pool_to_p2p_rx.select_next_some() => {
                    match message {
                        PoolToP2pMessage::PublishSignedBlsToExecutionChange(signed_change) => {
                            ServiceInboundMessage::Publish(PubsubMessage::BlsToExecutionChange(
                                signed_change,
                            ))
                            .send(&self.channels.network_to_service_tx);
                        }
                    }
                }

                complete => break,
            }
        }

        info_with_status!("network service stopped");

        Ok(())
    }

    fn check_slot(&mut self, cancellation_token: &CancellationToken) {
        let config = self.chain.chain_config();
        let slot = misc::slot_at_time(config, self.chain.genesis_time(), self.chain.now());

        if self.last_slot == Some(slot) {
            return;
        }

        // Slots skipped while the task was not scheduled are checked too.
        let first_new_slot = self.last_slot.map_or(slot, |last_slot| last_slot + 1);
        self.last_slot = Some(slot);

        NODE_STATUS.set_head_slot(self.chain.head_state().slot);
        NODE_STATUS.set_synced(self.chain.is_forward_synced());

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_slot(slot);
        }

        self.limits.on_slot(config, slot);

        let pruned = self.pending.prune(config, slot);

        if pruned > 0 {
            debug_with_status!("pruned {pruned} pending attestations at slot {slot}");
        }

        if (first_new_slot..=slot)
            .any(|slot| is_bls_to_execution_change_rebroadcast_slot(config, slot))
        {
            self.start_rebroadcast(cancellation_token);
        }
    }

    // Returns `false` if the previous rebroadcast is still running.
    fn start_rebroadcast(&mut self, cancellation_token: &CancellationToken) -> bool {
        if self
            .rebroadcast
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            debug_with_status!("BLS to execution change rebroadcast is already running");
            return false;
        }

        let broadcaster = BlsToExecutionChangeBroadcaster::new(
            self.chain.clone(),
            self.pools.bls_to_execution_change_pool.clone(),
            self.channels.pool_to_p2p_tx.clone(),
            self.rebroadcast_batch_size,
            self.rebroadcast_interval,
            self.metrics.clone(),
        );

        let cancellation_token = cancellation_token.clone();

        self.rebroadcast = Some(tokio::spawn(async move {
            if let Err(error) = broadcaster.run(cancellation_token).await {
                warn_with_status!("failed to rebroadcast BLS to execution changes: {error:#}");
            }
        }));

        true
    }

    fn handle_gossip_message(
        &self,
        gossip_id: GossipId,
        topic: GossipTopic,
        data: Vec<u8>,
        cancellation_token: &CancellationToken,
    ) {
        let validator = self.validator.clone();
        let subscriber = self.subscriber.clone();
        let network_to_service_tx = self.channels.network_to_service_tx.clone();
        let cancellation_token = cancellation_token.clone();

        tokio::spawn(async move {
            let (acceptance, message) = validator
                .validate(gossip_id, topic, &data, &cancellation_token)
                .await;

            if let Some(message) = message {
                subscriber.deliver(message);
            }

            ServiceInboundMessage::ReportMessageValidationResult(gossip_id, acceptance)
                .send(&network_to_service_tx);
        });
    }

    fn handle_inbound_stream(
        &self,
        peer_id: PeerId,
        protocol: Protocol,
        stream: T::Stream,
        cancellation_token: &CancellationToken,
    ) {
        let handler = self.handler.clone();
        let cancellation_token = cancellation_token.clone();

        tokio::spawn(async move {
            if let Err(error) = handler
                .handle(peer_id, protocol, stream, &cancellation_token)
                .await
            {
                debug_with_status!(
                    "failed to answer {} request from {peer_id}: {error:#}",
                    protocol.id(),
                );
            }
        });
    }

    fn handle_block_imported(
        &self,
        block: &SignedBeaconBlock,
        cancellation_token: &CancellationToken,
    ) {
        self.pools.on_block_imported(block);

        let block_root = block.message.hash_tree_root();

        if !self.pending.contains_root(block_root) {
            return;
        }

        let validator = self.validator.clone();
        let subscriber = self.subscriber.clone();
        let cancellation_token = cancellation_token.clone();

        tokio::spawn(async move {
            for message in validator
                .flush_pending(block_root, &cancellation_token)
                .await
            {
                subscriber.deliver(message);
            }
        });
    }

    fn request_block_by_root(
        &self,
        block_root: H256,
        peer_id: PeerId,
        cancellation_token: &CancellationToken,
    ) {
        let request = match BlocksByRootRequest::new([block_root], self.limits.get()) {
            Ok(request) => request,
            Err(error) => {
                debug_with_status!("cannot request block {block_root:?}: {error:#}");
                return;
            }
        };

        let fetcher = self.fetcher.clone();
        let network_to_service_tx = self.channels.network_to_service_tx.clone();
        let p2p_to_chain_tx = self.channels.p2p_to_chain_tx.clone();
        let cancellation_token = cancellation_token.clone();

        tokio::spawn(async move {
            let result = fetcher
                .fetch_blocks_by_root(
                    peer_id,
                    request,
                    |_| ProcessOutcome::Continue,
                    &cancellation_token,
                )
                .await;

            report_fetch_result(peer_id, result, &network_to_service_tx, &p2p_to_chain_tx);
        });
    }

    fn request_blocks_by_range(
        &self,
        peer_id: PeerId,
        start_slot: Slot,
        count: u64,
        cancellation_token: &CancellationToken,
    ) {
        let request = BlocksByRangeRequest::new(start_slot, count.min(self.limits.get()));
        let fetcher = self.fetcher.clone();
        let network_to_service_tx = self.channels.network_to_service_tx.clone();
        let p2p_to_chain_tx = self.channels.p2p_to_chain_tx.clone();
        let cancellation_token = cancellation_token.clone();

        tokio::spawn(async move {
            let result = fetcher
                .fetch_blocks_by_range(
                    peer_id,
                    request,
                    |_| ProcessOutcome::Continue,
                    &cancellation_token,
                )
                .await;

            report_fetch_result(peer_id, result, &network_to_service_tx, &p2p_to_chain_tx);
        });
    }
}

fn report_fetch_result(
    peer_id: PeerId,
    result: Result<Vec<Arc<SignedBeaconBlock>>, FetchError>,
    network_to_service_tx: &UnboundedSender<ServiceInboundMessage>,
    p2p_to_chain_tx: &UnboundedSender<P2pToChain>,
) {
    match result {
        Ok(blocks) => {
            for block in blocks {
                P2pToChain::RequestedBlock(block, peer_id).send(p2p_to_chain_tx);
            }
        }
        Err(error) => {
            // Peers are only penalized for responses that break the protocol.
            if !matches!(error, FetchError::Cancelled) && !error.is_connection_error() {
                ServiceInboundMessage::ReportPeer(peer_id, (&error).into())
                    .send(network_to_service_tx);
            }

            P2pToChain::BlockFetchFailed(peer_id).send(p2p_to_chain_tx);
        }
    }
}
