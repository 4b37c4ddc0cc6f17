use core::time::Duration;
use std::sync::Arc;

use anyhow::{Error as AnyhowError, Result};
use helper_functions::verifier::{SignatureBackend, SignatureSet};
use log::{debug, warn};
use prometheus_metrics::Metrics;
use rayon::iter::{IntoParallelIterator as _, ParallelIterator as _};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use strum::IntoStaticStr;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_QUEUE_CAPACITY: usize = 16_384;
pub const DEFAULT_BATCH_LIMIT: usize = 64;
pub const DEFAULT_BATCH_PERIOD: Duration = Duration::from_millis(10);
pub const DEFAULT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Error {
    #[error("signature verification timed out")]
    Timeout,
    #[error("signature verification was cancelled")]
    Cancelled,
    #[error("batch verifier has stopped")]
    Stopped,
    #[error("signature set is invalid: {0}")]
    Invalid(AnyhowError),
}

impl Error {
    /// Returns `true` if the signatures themselves were found to be invalid.
    ///
    /// Other errors say nothing about the signatures.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

#[serde_as]
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchVerifierConfig {
    pub queue_capacity: usize,
    // Signatures, not requests. A single request larger than this is still verified in one batch.
    pub batch_limit: usize,
    #[serde_as(as = "DurationMilliSeconds")]
    pub batch_period: Duration,
    #[serde_as(as = "DurationMilliSeconds")]
    pub verification_timeout: Duration,
}

impl Default for BatchVerifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_limit: DEFAULT_BATCH_LIMIT,
            batch_period: DEFAULT_BATCH_PERIOD,
            verification_timeout: DEFAULT_VERIFICATION_TIMEOUT,
        }
    }
}

struct VerificationRequest {
    signature_set: SignatureSet,
    sender: oneshot::Sender<Result<()>>,
}

impl VerificationRequest {
    fn respond(self, result: Result<()>) {
        if self.sender.send(result).is_err() {
            debug!("verification result was not delivered because the caller stopped waiting");
        }
    }
}

#[derive(Clone)]
pub struct BatchVerifierHandle {
    tx: mpsc::Sender<VerificationRequest>,
    verification_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl BatchVerifierHandle {
    /// Waits until `signature_set` has been verified, the timeout expires or
    /// `cancellation_token` is cancelled.
    ///
    /// A full queue counts against the timeout.
    pub async fn verify(
        &self,
        signature_set: SignatureSet,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        let result = self.verify_inner(signature_set, cancellation_token).await;

        if let Err(error) = &result {
            if let Some(metrics) = self.metrics.as_ref() {
                metrics.register_batch_verifier_failure(error.into());
            }
        }

        result
    }

    async fn verify_inner(
        &self,
        signature_set: SignatureSet,
        cancellation_token: &CancellationToken,
    ) -> Result<(), Error> {
        if signature_set.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + self.verification_timeout;
        let (sender, receiver) = oneshot::channel();

        let request = VerificationRequest {
            signature_set,
            sender,
        };

        tokio::select! {
            biased;

            () = cancellation_token.cancelled() => return Err(Error::Cancelled),
            sent = tokio::time::timeout_at(deadline, self.tx.send(request)) => match sent {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(Error::Stopped),
                Err(_) => return Err(Error::Timeout),
            },
        }

        tokio::select! {
            biased;

            () = cancellation_token.cancelled() => Err(Error::Cancelled),
            response = tokio::time::timeout_at(deadline, receiver) => match response {
                Ok(Ok(result)) => result.map_err(Error::Invalid),
                Ok(Err(_)) => Err(Error::Stopped),
                Err(_) => Err(Error::Timeout),
            },
        }
    }
}

pub struct BatchVerifier<B> {
    backend: Arc<B>,
    batch_limit: usize,
    batch_period: Duration,
    metrics: Option<Arc<Metrics>>,
    rx: mpsc::Receiver<VerificationRequest>,
}

impl<B: SignatureBackend> BatchVerifier<B> {
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        config: BatchVerifierConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> (Self, BatchVerifierHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let verifier = Self {
            backend,
            batch_limit: config.batch_limit.max(1),
            batch_period: config.batch_period,
            metrics: metrics.clone(),
            rx,
        };

        let handle = BatchVerifierHandle {
            tx,
            verification_timeout: config.verification_timeout,
            metrics,
        };

        (verifier, handle)
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<()> {
        loop {
            let first = tokio::select! {
                biased;

                () = cancellation_token.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let requests = self.coalesce(first).await;
            let backend = Arc::clone(&self.backend);
            let metrics = self.metrics.clone();

            tokio::task::spawn_blocking(move || {
                verify_requests(backend.as_ref(), requests, metrics.as_ref());
            })
            .await?;
        }

        // Requests still in the queue are dropped along with their senders.
        // Callers waiting on them observe `Error::Stopped`.
        debug!("batch verifier stopped");

        Ok(())
    }

    async fn coalesce(&mut self, first: VerificationRequest) -> Vec<VerificationRequest> {
        let deadline = Instant::now() + self.batch_period;
        let mut signature_count = first.signature_set.len();
        let mut requests = vec![first];

        while signature_count < self.batch_limit {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(request)) => {
                    signature_count += request.signature_set.len();
                    requests.push(request);
                }
                Ok(None) | Err(_) => break,
            }
        }

        requests
    }
}

fn verify_requests(
    backend: &impl SignatureBackend,
    mut requests: Vec<VerificationRequest>,
    metrics: Option<&Arc<Metrics>>,
) {
    let _timer = metrics.map(|metrics| metrics.batch_verifier_batch_times.start_timer());

    if requests.len() == 1 {
        if let Some(request) = requests.pop() {
            if let Some(metrics) = metrics {
                metrics
                    .batch_verifier_batch_sizes
                    .observe(request.signature_set.len() as f64);
            }

            let result = request.signature_set.verify_with(backend);
            request.respond(result);
        }

        return;
    }

    let mut combined = SignatureSet::default();

    for request in &requests {
        combined.append(&mut request.signature_set.clone());
    }

    if let Some(metrics) = metrics {
        metrics.batch_verifier_batch_sizes.observe(combined.len() as f64);
    }

    if backend.verify_multiple(combined.items()) {
        for request in requests {
            request.respond(Ok(()));
        }

        return;
    }

    warn!(
        "combined signature batch of {} requests failed; verifying requests separately",
        requests.len(),
    );

    if let Some(metrics) = metrics {
        metrics.batch_verifier_fallbacks.inc();
    }

    requests.into_par_iter().for_each(|request| {
        let result = request.signature_set.verify_with(backend);
        request.respond(result);
    });
}
