//! Deterministic stand-in for a real signature scheme.
//!
//! A signature is valid if and only if it is the digest of the message and every signing key.

use core::sync::atomic::{AtomicUsize, Ordering};

use types::phase0::primitives::{PublicKeyBytes, SignatureBytes, H256};

use crate::verifier::{SignatureBackend, SignatureItem};

#[must_use]
pub fn sign(message: H256, public_keys: &[PublicKeyBytes]) -> SignatureBytes {
    let parts = core::iter::once(message.as_bytes())
        .chain(public_keys.iter().map(PublicKeyBytes::as_bytes));

    let digest = hashing::hash_concatenated(parts);

    let mut signature = SignatureBytes::zero();

    for chunk in signature.as_bytes_mut().chunks_exact_mut(32) {
        chunk.copy_from_slice(digest.as_bytes());
    }

    signature
}

#[derive(Default)]
pub struct MockBackend {
    batch_calls: AtomicUsize,
    single_calls: AtomicUsize,
}

impl MockBackend {
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::Relaxed)
    }

    fn is_valid(item: &SignatureItem) -> bool {
        !item.public_keys.is_empty() && item.signature == sign(item.message, &item.public_keys)
    }
}

impl SignatureBackend for MockBackend {
    fn verify_multiple(&self, items: &[SignatureItem]) -> bool {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        items.iter().all(Self::is_valid)
    }

    fn verify_single(&self, item: &SignatureItem) -> bool {
        self.single_calls.fetch_add(1, Ordering::Relaxed);
        Self::is_valid(item)
    }
}
