use core::time::Duration;
use std::sync::Arc;

use anyhow::{bail, Error as AnyhowError, Result};
use futures::{SinkExt as _, StreamExt as _};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use types::{deneb::containers::SignedBeaconBlock, encoding, traits::Chain};

use crate::{
    misc::PeerId,
    rpc::{
        codec::{InboundCodec, ResponseChunk, ResponseCode},
        methods::{BlocksByRangeRequest, BlocksByRootRequest},
        protocol::{Protocol, RequestLimits},
    },
};

/// Answers block requests from peers with blocks known to the chain.
pub struct RequestHandler<C> {
    chain: Arc<C>,
    limits: Arc<RequestLimits>,
}

impl<C: Chain> RequestHandler<C> {
    #[must_use]
    pub const fn new(chain: Arc<C>, limits: Arc<RequestLimits>) -> Self {
        Self { chain, limits }
    }

    /// Reads one request from `stream`, writes the response and closes the stream.
    ///
    /// Returns the number of blocks sent.
    pub async fn handle<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        peer_id: PeerId,
        protocol: Protocol,
        stream: S,
        cancellation_token: &CancellationToken,
    ) -> Result<usize> {
        let config = self.chain.chain_config();
        let timeout = config.resp_timeout;
        let (read_half, write_half) = tokio::io::split(stream);

        let mut requests = FramedRead::new(read_half, InboundCodec::new(config.max_chunk_size));
        let mut responses = FramedWrite::new(write_half, InboundCodec::new(config.max_chunk_size));

        let request_bytes = match guard(cancellation_token, timeout, requests.next()).await? {
            Some(Ok(bytes)) => bytes,
            Some(Err(error)) => {
                let error = AnyhowError::from(error);
                return self
                    .reject(peer_id, protocol, &mut responses, error, cancellation_token)
                    .await;
            }
            None => bail!("{peer_id} closed stream before sending a request"),
        };

        let blocks = match self.blocks_for_request(protocol, &request_bytes) {
            Ok(blocks) => blocks,
            Err(error) => {
                return self
                    .reject(peer_id, protocol, &mut responses, error, cancellation_token)
                    .await;
            }
        };

        let sent = blocks.len();

        for block in blocks {
            let chunk = ResponseChunk::success(encoding::to_bytes(&block)?);
            guard(cancellation_token, timeout, responses.send(chunk)).await??;
        }

        guard(cancellation_token, timeout, responses.close()).await??;

        debug!("sent {sent} blocks to {peer_id} over {}", protocol.id());

        Ok(sent)
    }

    fn blocks_for_request(
        &self,
        protocol: Protocol,
        request_bytes: &[u8],
    ) -> Result<Vec<Arc<SignedBeaconBlock>>> {
        let max_request_blocks = self.limits.get();

        match protocol {
            Protocol::BlocksByRange => {
                let mut request = BlocksByRangeRequest::from_bytes(request_bytes)?;

                request.validate()?;
                request.count = request.count.min(max_request_blocks);

                let blocks = self
                    .chain
                    .blocks_by_range(request.slots())
                    .into_iter()
                    .filter(|block| request.contains(block.slot()))
                    .collect();

                Ok(blocks)
            }
            Protocol::BlocksByRoot => {
                let request = BlocksByRootRequest::from_bytes(request_bytes, max_request_blocks)?;

                let blocks = request
                    .block_roots
                    .into_iter()
                    .filter_map(|block_root| self.chain.block_by_root(block_root))
                    .collect();

                Ok(blocks)
            }
        }
    }

    async fn reject<W: AsyncWrite + Unpin>(
        &self,
        peer_id: PeerId,
        protocol: Protocol,
        responses: &mut FramedWrite<W, InboundCodec>,
        error: AnyhowError,
        cancellation_token: &CancellationToken,
    ) -> Result<usize> {
        debug!("invalid {} request from {peer_id}: {error:#}", protocol.id());

        let timeout = self.chain.chain_config().resp_timeout;
        let chunk = ResponseChunk::error(ResponseCode::InvalidRequest, &format!("{error:#}"));

        guard(cancellation_token, timeout, responses.send(chunk)).await??;
        guard(cancellation_token, timeout, responses.close()).await??;

        Ok(0)
    }
}

async fn guard<F: core::future::Future>(
    cancellation_token: &CancellationToken,
    duration: Duration,
    future: F,
) -> Result<F::Output> {
    tokio::select! {
        biased;

        () = cancellation_token.cancelled() => bail!("request handling cancelled"),
        result = tokio::time::timeout(duration, future) => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use types::phase0::primitives::H256;

    use crate::{
        rpc::{
            block_fetch::{BlockFetcher, ProcessOutcome},
            codec::OutboundCodec,
        },
        test_utils::{self, LocalPeer, TestChain},
    };

    use super::*;

    const PEER: PeerId = PeerId(5);

    fn setup(slots: impl IntoIterator<Item = u64>) -> (Arc<TestChain>, Arc<RequestLimits>, Vec<H256>) {
        let chain = Arc::new(TestChain::new(test_utils::config()));
        let limits = Arc::new(RequestLimits::new(
            chain.chain_config(),
            test_utils::CURRENT_SLOT,
        ));

        let roots = slots
            .into_iter()
            .map(|slot| chain.add_block(test_utils::block(slot, H256::zero())))
            .collect();

        (chain, limits, roots)
    }

    fn fetcher(
        chain: &Arc<TestChain>,
        limits: &Arc<RequestLimits>,
    ) -> BlockFetcher<LocalPeer> {
        let handler = Arc::new(RequestHandler::new(chain.clone(), limits.clone()));

        BlockFetcher::new(
            Arc::new(LocalPeer { handler }),
            chain.chain_config().clone(),
            limits.clone(),
            None,
        )
    }

    #[tokio::test]
    async fn range_request_is_served_with_skipped_slots() -> Result<()> {
        let (chain, limits, _) = setup([20, 21, 23, 26, 40]);

        let blocks = fetcher(&chain, &limits)
            .fetch_blocks_by_range(
                PEER,
                BlocksByRangeRequest::new(20, 10),
                |_| ProcessOutcome::Continue,
                &CancellationToken::new(),
            )
            .await?;

        let slots = blocks.iter().map(|block| block.slot()).collect_vec();

        assert_eq!(slots, [20, 21, 23, 26]);

        Ok(())
    }

    #[test]
    fn range_request_is_capped_at_limit() -> Result<()> {
        let (chain, limits, _) = setup(20..40);
        let handler = RequestHandler::new(chain.clone(), limits.clone());

        limits.set(5);

        let request = BlocksByRangeRequest::new(20, 20).to_bytes()?;
        let blocks = handler.blocks_for_request(Protocol::BlocksByRange, &request)?;

        assert_eq!(blocks.len(), 5);

        Ok(())
    }

    #[tokio::test]
    async fn root_request_skips_unknown_roots() -> Result<()> {
        let (chain, limits, roots) = setup([20, 21]);
        let request = BlocksByRootRequest::new([roots[1], H256::repeat_byte(9), roots[0]], 10)?;

        let blocks = fetcher(&chain, &limits)
            .fetch_blocks_by_root(
                PEER,
                request,
                |_| ProcessOutcome::Continue,
                &CancellationToken::new(),
            )
            .await?;

        let slots = blocks.iter().map(|block| block.slot()).collect_vec();

        assert_eq!(slots, [21, 20]);

        Ok(())
    }

    #[tokio::test]
    async fn zero_step_is_answered_with_invalid_request() -> Result<()> {
        let (chain, limits, _) = setup([20]);
        let handler = RequestHandler::new(chain.clone(), limits);
        let (client, server) = tokio::io::duplex(1 << 16);

        let request = BlocksByRangeRequest {
            start_slot: 20,
            count: 1,
            step: 0,
        };

        let cancellation_token = CancellationToken::new();
        let serve = handler.handle(
            PEER,
            Protocol::BlocksByRange,
            server,
            &cancellation_token,
        );

        let request_and_read = async {
            let (read_half, write_half) = tokio::io::split(client);
            let max_chunk_size = chain.chain_config().max_chunk_size;

            let mut requests = FramedWrite::new(write_half, OutboundCodec::new(max_chunk_size));
            requests.send(request.to_bytes()?).await?;
            requests.close().await?;

            let chunks = FramedRead::new(read_half, OutboundCodec::new(max_chunk_size))
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, AnyhowError>(chunks)
        };

        let (sent, chunks) = tokio::join!(serve, request_and_read);

        assert_eq!(sent?, 0);

        let chunks = chunks?;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].code, ResponseCode::InvalidRequest);

        Ok(())
    }
}
