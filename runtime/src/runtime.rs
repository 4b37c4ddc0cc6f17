use core::future::Future;
use std::sync::Arc;

use anyhow::Result;
use batch_verifier::BatchVerifier;
use helper_functions::verifier::SignatureBackend;
use log::info;
use operation_pools::Manager;
use p2p::{rpc::Transport, Channels, Network};
use prometheus_metrics::{Metrics, METRICS};
use tokio::select;
use tokio_util::sync::CancellationToken;
use types::traits::Chain;

use crate::node_config::NodeConfig;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;

/// Installs the logger and the global thread pool. Must be called once before [`run`].
pub fn initialize() -> Result<()> {
    binary_utils::initialize_logger(module_path!(), false)?;
    binary_utils::initialize_rayon()
}

/// Creates the metrics registry if enabled in `node_config`.
pub fn initialize_metrics(node_config: &NodeConfig) -> Result<Option<Arc<Metrics>>> {
    if !node_config.metrics {
        return Ok(None);
    }

    let metrics = Metrics::new()?;
    metrics.register_with_default_metrics()?;

    let metrics = Arc::new(metrics);
    METRICS.get_or_init(|| metrics.clone());
    metrics.set_live();

    Ok(Some(metrics))
}

/// Runs the verifier and the network service until one of them fails, a shutdown signal arrives
/// or `cancellation_token` is cancelled.
///
/// `cancellation_token` is cancelled before returning, which stops every task started here.
#[expect(clippy::too_many_arguments)]
pub async fn run<C: Chain, B: SignatureBackend, T: Transport>(
    chain: Arc<C>,
    pools: Arc<Manager>,
    signature_backend: Arc<B>,
    transport: Arc<T>,
    node_config: NodeConfig,
    channels: Channels<T::Stream>,
    metrics: Option<Arc<Metrics>>,
    cancellation_token: CancellationToken,
) -> Result<()> {
    let (batch_verifier, verifier_handle) = BatchVerifier::new(
        signature_backend,
        node_config.batch_verifier,
        metrics.clone(),
    );

    let network = Network::new(
        chain,
        pools,
        verifier_handle,
        transport,
        node_config.network,
        channels,
        metrics,
    );

    info!("starting services (local peer: {})", node_config.network.local_peer_id);

    let result = select! {
        result = spawn_fallible(batch_verifier.run(cancellation_token.clone())) => result,
        result = spawn_fallible(network.run(cancellation_token.clone())) => result,
        result = wait_for_signal() => result,
        () = cancellation_token.cancelled() => Ok(()),
    };

    cancellation_token.cancel();

    info!("services stopped");

    result
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut interrupt = tokio::signal::unix::signal(SignalKind::interrupt())?;
        let mut terminate = tokio::signal::unix::signal(SignalKind::terminate())?;

        select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

// This exists mainly to flatten the nested `Result` returned by `tokio::spawn`.
async fn spawn_fallible<T: Send + 'static>(
    task: impl Future<Output = Result<T>> + Send + 'static,
) -> Result<T> {
    tokio::spawn(task).await?
}
