#![expect(clippy::module_name_repetitions)]

use anyhow::{bail, ensure, Result};
use rayon::iter::{IndexedParallelIterator as _, IntoParallelRefIterator as _};
use types::phase0::primitives::{PublicKeyBytes, SignatureBytes, H256};

use crate::error::{Error, SignatureKind};

/// Signature scheme implementation.
///
/// Batch verification only reports whether every signature in the batch is valid.
/// Callers that need to know which signature failed fall back to [`SignatureSet::verify_with`].
pub trait SignatureBackend: Send + Sync + 'static {
    fn verify_multiple(&self, items: &[SignatureItem]) -> bool;

    fn verify_single(&self, item: &SignatureItem) -> bool {
        self.verify_multiple(core::slice::from_ref(item))
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignatureItem {
    pub message: H256,
    pub signature: SignatureBytes,
    // A single key for singular signatures, all participants for aggregates.
    pub public_keys: Vec<PublicKeyBytes>,
    pub kind: SignatureKind,
}

pub trait Verifier {
    const IS_NULL: bool;

    fn verify_singular(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn verify_aggregate(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()>;
}

impl<V: Verifier> Verifier for &mut V {
    const IS_NULL: bool = V::IS_NULL;

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_singular(message, signature, public_key, signature_kind)
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_aggregate(message, signature, public_keys, signature_kind)
    }
}

/// Skips signature checks entirely.
///
/// Used when revalidating objects whose signatures were already verified on arrival.
pub struct NullVerifier;

impl Verifier for NullVerifier {
    const IS_NULL: bool = true;

    #[inline]
    fn verify_singular(
        &mut self,
        _message: H256,
        _signature: SignatureBytes,
        _public_key: PublicKeyBytes,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        _message: H256,
        _signature: SignatureBytes,
        _public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }
}

/// Verifies each signature immediately.
pub struct SingleVerifier<'backend, B> {
    backend: &'backend B,
}

impl<'backend, B: SignatureBackend> SingleVerifier<'backend, B> {
    #[must_use]
    pub const fn new(backend: &'backend B) -> Self {
        Self { backend }
    }
}

impl<B: SignatureBackend> Verifier for SingleVerifier<'_, B> {
    const IS_NULL: bool = false;

    fn verify_singular(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        self.verify_aggregate(message, signature, [public_key], signature_kind)
    }

    fn verify_aggregate(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let item = SignatureItem {
            message,
            signature,
            public_keys: public_keys.into_iter().collect(),
            kind: signature_kind,
        };

        ensure!(
            self.backend.verify_single(&item),
            Error::SignatureInvalid(signature_kind),
        );

        Ok(())
    }
}

/// Signatures collected for verification in a single batch.
#[derive(Clone, Default, Debug)]
pub struct SignatureSet {
    items: Vec<SignatureItem>,
}

impl Verifier for SignatureSet {
    const IS_NULL: bool = false;

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        self.verify_aggregate(message, signature, [public_key], signature_kind)
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        self.items.push(SignatureItem {
            message,
            signature,
            public_keys: public_keys.into_iter().collect(),
            kind: signature_kind,
        });

        Ok(())
    }
}

impl From<Vec<SignatureItem>> for SignatureSet {
    fn from(items: Vec<SignatureItem>) -> Self {
        Self { items }
    }
}

impl SignatureSet {
    #[must_use]
    pub fn items(&self) -> &[SignatureItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn append(&mut self, other: &mut Self) {
        self.items.append(&mut other.items);
    }

    /// Verifies the whole set as one batch, falling back to verifying items one at a time if the
    /// batch fails in order to report which item is invalid.
    pub fn verify_with(&self, backend: &impl SignatureBackend) -> Result<()> {
        if self.items.is_empty() || backend.verify_multiple(&self.items) {
            return Ok(());
        }

        self.find_invalid(backend)
    }

    fn find_invalid(&self, backend: &impl SignatureBackend) -> Result<()> {
        let invalid = self
            .items
            .par_iter()
            .position_first(|item| !backend.verify_single(item));

        match invalid {
            Some(index) => bail!(Error::SignatureInSetInvalid {
                index,
                kind: self.items[index].kind,
            }),
            // Every item is valid on its own but the batch is not.
            // This can only happen with a broken backend, so the whole set is treated as invalid.
            None => bail!(Error::SignatureInvalid(SignatureKind::Multi)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::{sign, MockBackend};

    use super::*;

    fn valid_item(byte: u8, kind: SignatureKind) -> SignatureItem {
        let message = H256::repeat_byte(byte);
        let public_key = PublicKeyBytes::repeat_byte(byte);

        SignatureItem {
            message,
            signature: sign(message, &[public_key]),
            public_keys: vec![public_key],
            kind,
        }
    }

    #[test]
    fn empty_set_is_valid() -> Result<()> {
        SignatureSet::default().verify_with(&MockBackend::default())
    }

    #[test]
    fn valid_set_is_verified_in_one_batch() -> Result<()> {
        let backend = MockBackend::default();

        let set = SignatureSet::from(vec![
            valid_item(1, SignatureKind::Attestation),
            valid_item(2, SignatureKind::SelectionProof),
        ]);

        set.verify_with(&backend)?;

        assert_eq!(backend.batch_calls(), 1);
        assert_eq!(backend.single_calls(), 0);

        Ok(())
    }

    #[test]
    fn invalid_item_is_attributed() {
        let backend = MockBackend::default();

        let mut bad_item = valid_item(3, SignatureKind::AggregateAndProof);
        bad_item.signature = SignatureBytes::repeat_byte(0xff);

        let set = SignatureSet::from(vec![
            valid_item(1, SignatureKind::Attestation),
            valid_item(2, SignatureKind::SelectionProof),
            bad_item,
        ]);

        let error = set
            .verify_with(&backend)
            .expect_err("set contains an invalid signature");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::SignatureInSetInvalid {
                index: 2,
                kind: SignatureKind::AggregateAndProof,
            }),
        ));
    }

    #[test]
    fn single_verifier_checks_immediately() {
        let backend = MockBackend::default();
        let item = valid_item(4, SignatureKind::VoluntaryExit);

        let mut verifier = SingleVerifier::new(&backend);

        verifier
            .verify_singular(item.message, item.signature, item.public_keys[0], item.kind)
            .expect("signature is valid");

        verifier
            .verify_singular(
                item.message,
                SignatureBytes::zero(),
                item.public_keys[0],
                item.kind,
            )
            .expect_err("signature is invalid");
    }

    #[test]
    fn null_verifier_accepts_anything() -> Result<()> {
        NullVerifier.verify_singular(
            H256::zero(),
            SignatureBytes::zero(),
            PublicKeyBytes::zero(),
            SignatureKind::BlockHeader,
        )
    }
}
