use crate::phase0::primitives::{H256, H384};

pub type BlobIndex = u64;
pub type KzgCommitment = H384;
pub type KzgProof = H384;
pub type BlobCommitmentInclusionProof = Vec<H256>;
