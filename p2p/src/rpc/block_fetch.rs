use core::{future::Future, time::Duration};
use std::{collections::HashSet, sync::Arc};

use futures::{SinkExt as _, StreamExt as _};
use log::debug;
use prometheus_metrics::Metrics;
use strum::IntoStaticStr;
use thiserror::Error;
use tokio::io::ReadHalf;
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use types::{
    config::Config,
    deneb::containers::SignedBeaconBlock,
    encoding::{self, HashTreeRoot as _},
    phase0::primitives::{Slot, H256},
};

use crate::{
    misc::PeerId,
    rpc::{
        codec::{CodecError, OutboundCodec, ResponseCode},
        methods::{BlocksByRangeRequest, BlocksByRootRequest},
        protocol::{Protocol, RequestLimits, Transport},
    },
};

/// Decision of a block processor about a block that passed protocol checks.
#[derive(Debug)]
pub enum ProcessOutcome {
    Continue,
    /// Return the blocks accepted so far. The current block is not included.
    Stop,
    /// Fail the request and discard the blocks accepted so far.
    Abort(anyhow::Error),
}

#[derive(Debug, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FetchError {
    #[error("failed to open stream to {peer_id}: {error:#}")]
    StreamOpen {
        peer_id: PeerId,
        error: anyhow::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no response within {duration:?}")]
    Timeout { duration: Duration },
    #[error("request cancelled")]
    Cancelled,
    #[error("failed to decode response: {error:#}")]
    Decode { error: anyhow::Error },
    #[error("peer responded with {code:?}: {message}")]
    ErrorResponse { code: ResponseCode, message: String },
    #[error("block at slot {slot} does not follow block at slot {previous_slot}")]
    OutOfOrder { slot: Slot, previous_slot: Slot },
    #[error("block at slot {slot} is outside of requested range {request:?}")]
    OutOfRange {
        slot: Slot,
        request: BlocksByRangeRequest,
    },
    #[error("peer sent more than {limit} blocks")]
    TooManyBlocks { limit: u64 },
    #[error("peer sent block {block_root:?} that was not requested")]
    UnrequestedBlock { block_root: H256 },
    #[error("peer sent block {block_root:?} more than once")]
    DuplicateBlock { block_root: H256 },
    #[error("invalid request: {error:#}")]
    InvalidRequest { error: anyhow::Error },
    #[error("block processing aborted: {error:#}")]
    Aborted { error: anyhow::Error },
}

impl FetchError {
    /// Whether the failure happened below the protocol level and says nothing about block validity.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::StreamOpen { .. } | Self::Io(_) | Self::Timeout { .. },
        )
    }
}

impl From<CodecError> for FetchError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Io(error) => Self::Io(error),
            _ => Self::Decode {
                error: error.into(),
            },
        }
    }
}

/// Requests blocks from peers and checks responses against the request.
pub struct BlockFetcher<T> {
    transport: Arc<T>,
    config: Arc<Config>,
    limits: Arc<RequestLimits>,
    metrics: Option<Arc<Metrics>>,
}

impl<T: Transport> BlockFetcher<T> {
    #[must_use]
    pub const fn new(
        transport: Arc<T>,
        config: Arc<Config>,
        limits: Arc<RequestLimits>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            transport,
            config,
            limits,
            metrics,
        }
    }

    /// Returns blocks in ascending slot order.
    ///
    /// Skipped slots have no blocks, so the result may be shorter than `request.count`.
    pub async fn fetch_blocks_by_range(
        &self,
        peer_id: PeerId,
        request: BlocksByRangeRequest,
        process: impl FnMut(&SignedBeaconBlock) -> ProcessOutcome + Send,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Arc<SignedBeaconBlock>>, FetchError> {
        let protocol = Protocol::BlocksByRange;
        let timer = self.start_timer(protocol);

        let result = self
            .blocks_by_range(peer_id, request, process, cancellation_token)
            .await;

        self.finish(peer_id, protocol, timer, result)
    }

    /// Returns blocks in the order the peer sent them.
    pub async fn fetch_blocks_by_root(
        &self,
        peer_id: PeerId,
        request: BlocksByRootRequest,
        process: impl FnMut(&SignedBeaconBlock) -> ProcessOutcome + Send,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Arc<SignedBeaconBlock>>, FetchError> {
        let protocol = Protocol::BlocksByRoot;
        let timer = self.start_timer(protocol);

        let result = self
            .blocks_by_root(peer_id, request, process, cancellation_token)
            .await;

        self.finish(peer_id, protocol, timer, result)
    }

    async fn blocks_by_range(
        &self,
        peer_id: PeerId,
        request: BlocksByRangeRequest,
        mut process: impl FnMut(&SignedBeaconBlock) -> ProcessOutcome + Send,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Arc<SignedBeaconBlock>>, FetchError> {
        request
            .validate()
            .map_err(|error| FetchError::InvalidRequest { error })?;

        if request.count == 0 {
            return Ok(vec![]);
        }

        let request_bytes = request
            .to_bytes()
            .map_err(|error| FetchError::InvalidRequest { error })?;

        let mut responses = self
            .open(
                peer_id,
                Protocol::BlocksByRange,
                request_bytes,
                cancellation_token,
            )
            .await?;

        let mut blocks = Vec::<Arc<SignedBeaconBlock>>::new();

        while (blocks.len() as u64) < request.count {
            let Some(block) = responses.next_block(&self.config).await? else {
                break;
            };

            let slot = block.slot();

            if !request.contains(slot) {
                return Err(FetchError::OutOfRange { slot, request });
            }

            if let Some(previous_slot) = blocks.last().map(|block| block.slot()) {
                if slot <= previous_slot {
                    return Err(FetchError::OutOfOrder {
                        slot,
                        previous_slot,
                    });
                }
            }

            match process(&block) {
                ProcessOutcome::Continue => {}
                ProcessOutcome::Stop => break,
                ProcessOutcome::Abort(error) => return Err(FetchError::Aborted { error }),
            }

            self.check_limit(blocks.len())?;

            blocks.push(Arc::new(block));
        }

        Ok(blocks)
    }

    async fn blocks_by_root(
        &self,
        peer_id: PeerId,
        request: BlocksByRootRequest,
        mut process: impl FnMut(&SignedBeaconBlock) -> ProcessOutcome + Send,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Arc<SignedBeaconBlock>>, FetchError> {
        request
            .validate(self.limits.get())
            .map_err(|error| FetchError::InvalidRequest { error })?;

        if request.block_roots.is_empty() {
            return Ok(vec![]);
        }

        let request_bytes = request
            .to_bytes()
            .map_err(|error| FetchError::InvalidRequest { error })?;

        let mut responses = self
            .open(
                peer_id,
                Protocol::BlocksByRoot,
                request_bytes,
                cancellation_token,
            )
            .await?;

        let mut remaining = request.block_roots.iter().copied().collect::<HashSet<_>>();
        let mut blocks = vec![];

        while !remaining.is_empty() {
            let Some(block) = responses.next_block(&self.config).await? else {
                break;
            };

            let block_root = block.message.hash_tree_root();

            if !remaining.remove(&block_root) {
                return Err(if request.block_roots.contains(&block_root) {
                    FetchError::DuplicateBlock { block_root }
                } else {
                    FetchError::UnrequestedBlock { block_root }
                });
            }

            match process(&block) {
                ProcessOutcome::Continue => {}
                ProcessOutcome::Stop => break,
                ProcessOutcome::Abort(error) => return Err(FetchError::Aborted { error }),
            }

            self.check_limit(blocks.len())?;

            blocks.push(Arc::new(block));
        }

        Ok(blocks)
    }

    async fn open<'token>(
        &self,
        peer_id: PeerId,
        protocol: Protocol,
        request_bytes: Vec<u8>,
        cancellation_token: &'token CancellationToken,
    ) -> Result<ResponseStream<'token, T::Stream>, FetchError> {
        let stream = guard(
            cancellation_token,
            self.config.ttfb_timeout,
            self.transport.open_stream(peer_id, protocol),
        )
        .await?
        .map_err(|error| FetchError::StreamOpen { peer_id, error })?;

        let (read_half, write_half) = tokio::io::split(stream);
        let mut requests = FramedWrite::new(write_half, OutboundCodec::new(self.config.max_chunk_size));

        // Closing the write half tells the peer the request is complete.
        guard(cancellation_token, self.config.resp_timeout, async {
            requests.send(request_bytes).await?;
            requests.close().await
        })
        .await??;

        Ok(ResponseStream {
            chunks: FramedRead::new(read_half, OutboundCodec::new(self.config.max_chunk_size)),
            resp_timeout: self.config.resp_timeout,
            cancellation_token,
        })
    }

    // Called before accepting another block so that a limit lowered by the processor applies to it.
    fn check_limit(&self, accepted: usize) -> Result<(), FetchError> {
        let limit = self.limits.get();

        if accepted as u64 >= limit {
            return Err(FetchError::TooManyBlocks { limit });
        }

        Ok(())
    }

    fn start_timer(&self, protocol: Protocol) -> Option<prometheus::HistogramTimer> {
        self.metrics.as_ref().and_then(|metrics| {
            prometheus_metrics::start_timer_vec(&metrics.block_fetch_times, protocol.into())
        })
    }

    fn finish(
        &self,
        peer_id: PeerId,
        protocol: Protocol,
        timer: Option<prometheus::HistogramTimer>,
        result: Result<Vec<Arc<SignedBeaconBlock>>, FetchError>,
    ) -> Result<Vec<Arc<SignedBeaconBlock>>, FetchError> {
        match &result {
            Ok(blocks) => {
                prometheus_metrics::stop_and_record(timer);

                debug!(
                    "received {} blocks from {peer_id} over {}",
                    blocks.len(),
                    protocol.id(),
                );
            }
            Err(error) => {
                prometheus_metrics::stop_and_discard(timer);

                if let Some(metrics) = self.metrics.as_ref() {
                    metrics.register_block_fetch_error(error.into());
                }

                debug!("{} request to {peer_id} failed: {error}", protocol.id());
            }
        }

        result
    }
}

struct ResponseStream<'token, S> {
    chunks: FramedRead<ReadHalf<S>, OutboundCodec>,
    resp_timeout: Duration,
    cancellation_token: &'token CancellationToken,
}

impl<S: tokio::io::AsyncRead> ResponseStream<'_, S> {
    /// Returns `None` once the peer closes the stream.
    async fn next_block(&mut self, config: &Config) -> Result<Option<SignedBeaconBlock>, FetchError> {
        let Some(chunk) = guard(
            self.cancellation_token,
            self.resp_timeout,
            self.chunks.next(),
        )
        .await?
        else {
            return Ok(None);
        };

        let chunk = chunk?;

        if chunk.code != ResponseCode::Success {
            return Err(FetchError::ErrorResponse {
                code: chunk.code,
                message: chunk.error_message(),
            });
        }

        encoding::from_bytes(&chunk.payload, config.max_chunk_size)
            .map(Some)
            .map_err(|error| FetchError::Decode { error })
    }
}

async fn guard<F: Future>(
    cancellation_token: &CancellationToken,
    duration: Duration,
    future: F,
) -> Result<F::Output, FetchError> {
    tokio::select! {
        biased;

        () = cancellation_token.cancelled() => Err(FetchError::Cancelled),
        result = tokio::time::timeout(duration, future) => {
            result.map_err(|_| FetchError::Timeout { duration })
        }
    }
}
