//! Canonical encoding of containers.
//!
//! Containers are encoded with `bincode` using fixed-width little-endian integers.
//! For containers made only of fixed-size fields this produces the same bytes as SSZ.
//! Roots are the SHA-256 digest of the canonical encoding.

use anyhow::{ensure, Result};
use bincode::Options as _;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::phase0::primitives::{Slot, H256};

#[derive(Debug, Error)]
pub enum Error {
    #[error("encoded container is too large ({size} bytes, limit {max_size} bytes)")]
    TooLarge { size: usize, max_size: usize },
}

fn options() -> impl bincode::Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

pub fn to_bytes(value: &impl Serialize) -> Result<Vec<u8>> {
    options().serialize(value).map_err(Into::into)
}

/// Decodes a container, rejecting inputs larger than `max_size` and trailing bytes.
///
/// The limit also bounds allocations driven by length prefixes in untrusted input.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8], max_size: usize) -> Result<T> {
    ensure!(
        bytes.len() <= max_size,
        Error::TooLarge {
            size: bytes.len(),
            max_size,
        },
    );

    let limit = u64::try_from(max_size)?;

    options()
        .with_limit(limit)
        .deserialize(bytes)
        .map_err(Into::into)
}

pub trait HashTreeRoot: Serialize {
    /// # Panics
    ///
    /// Panics if `self` fails to serialize. Containers are built from integers, fixed-size hashes,
    /// bit lists and vectors, so serializing them into memory cannot fail.
    fn hash_tree_root(&self) -> H256 {
        let bytes = options()
            .serialize(self)
            .expect("containers contain no types that fail to serialize");

        hashing::hash_bytes(bytes)
    }
}

impl HashTreeRoot for Slot {}

impl HashTreeRoot for H256 {}
