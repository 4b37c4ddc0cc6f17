use ethereum_types::H256;
use sha2::{Digest as _, Sha256};

#[inline]
#[must_use]
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes).into())
}

#[inline]
#[must_use]
pub fn hash_64(value: u64) -> H256 {
    hash_bytes(value.to_le_bytes())
}

#[inline]
#[must_use]
pub fn hash_256_64(left: H256, right: u64) -> H256 {
    output(Sha256::new().chain_update(left).chain_update(right.to_le_bytes()))
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    output(Sha256::new().chain_update(left).chain_update(right))
}

/// Hashes a sequence of byte strings as if they were concatenated.
#[must_use]
pub fn hash_concatenated<'bytes>(parts: impl IntoIterator<Item = &'bytes [u8]>) -> H256 {
    let hasher = parts
        .into_iter()
        .fold(Sha256::new(), |hasher, part| hasher.chain_update(part));

    output(hasher)
}

fn output(hasher: Sha256) -> H256 {
    H256(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use test_case::test_case;

    use super::*;

    // The first two zero hashes of SSZ Merkleization.
    #[test_case(H256::zero(), H256::zero() => H256(hex!("f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b")))]
    #[test_case(
        H256(hex!("f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b")),
        H256(hex!("f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b"))
        => H256(hex!("db56114e00fdd4c1f85c892bf35ac9a89289aaecb1ebd0a96cde606a748b5d71"))
    )]
    fn hash_256_256_matches_known_digests(left: H256, right: H256) -> H256 {
        hash_256_256(left, right)
    }

    #[test]
    fn hash_concatenated_matches_hash_bytes() {
        let left = H256::repeat_byte(1);
        let right = H256::repeat_byte(2);

        assert_eq!(
            hash_concatenated([left.as_bytes(), right.as_bytes()]),
            hash_256_256(left, right),
        );

        assert_eq!(hash_concatenated([&7_u64.to_le_bytes()[..]]), hash_64(7));
    }

    #[test]
    fn hash_of_empty_input() {
        assert_eq!(
            hash_bytes(b""),
            H256(hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")),
        );
    }
}
