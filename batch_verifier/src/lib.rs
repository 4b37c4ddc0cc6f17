pub use crate::batch_verifier::{
    BatchVerifier, BatchVerifierConfig, BatchVerifierHandle, Error, DEFAULT_BATCH_LIMIT,
    DEFAULT_BATCH_PERIOD, DEFAULT_QUEUE_CAPACITY, DEFAULT_VERIFICATION_TIMEOUT,
};

mod batch_verifier;
