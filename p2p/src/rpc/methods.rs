use core::ops::Range;

use anyhow::{ensure, Result};
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use types::{
    encoding,
    phase0::primitives::{Slot, H256},
};

// Request sizes: the range request is three integers, the root request a length and 32 byte roots.
const BLOCKS_BY_RANGE_REQUEST_SIZE: usize = 3 * size_of::<u64>();

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlocksByRangeRequest {
    pub start_slot: Slot,
    pub count: u64,
    pub step: u64,
}

impl BlocksByRangeRequest {
    #[must_use]
    pub const fn new(start_slot: Slot, count: u64) -> Self {
        Self {
            start_slot,
            count,
            step: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.step > 0, "blocks by range request has zero step");
        Ok(())
    }

    /// Slots covered by the request, including skipped ones.
    #[must_use]
    pub fn slots(&self) -> Range<Slot> {
        let end_slot = self
            .start_slot
            .saturating_add(self.count.saturating_mul(self.step));

        self.start_slot..end_slot
    }

    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        self.step > 0
            && self.slots().contains(&slot)
            && (slot - self.start_slot) % self.step == 0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encoding::to_bytes(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        encoding::from_bytes(bytes, BLOCKS_BY_RANGE_REQUEST_SIZE)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlocksByRootRequest {
    pub block_roots: Vec<H256>,
}

impl BlocksByRootRequest {
    /// Builds a request for `block_roots` without duplicates.
    pub fn new(block_roots: impl IntoIterator<Item = H256>, max_request_blocks: u64) -> Result<Self> {
        let block_roots = block_roots.into_iter().unique().collect_vec();

        let request = Self { block_roots };
        request.validate(max_request_blocks)?;

        Ok(request)
    }

    pub fn validate(&self, max_request_blocks: u64) -> Result<()> {
        let count = u64::try_from(self.block_roots.len())?;

        ensure!(
            count <= max_request_blocks,
            "blocks by root request for {count} blocks exceeds limit of {max_request_blocks}",
        );

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encoding::to_bytes(self)
    }

    pub fn from_bytes(bytes: &[u8], max_request_blocks: u64) -> Result<Self> {
        let max_roots = usize::try_from(max_request_blocks)?;
        let max_size = size_of::<u64>() + max_roots.saturating_mul(size_of::<H256>());
        let request = encoding::from_bytes::<Self>(bytes, max_size)?;

        request.validate(max_request_blocks)?;

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(20, true)]
    #[test_case(22, true)]
    #[test_case(21, false)]
    #[test_case(19, false)]
    #[test_case(26, false)]
    fn range_with_step_contains_only_matching_slots(slot: Slot, expected: bool) {
        let request = BlocksByRangeRequest {
            start_slot: 20,
            count: 3,
            step: 2,
        };

        assert_eq!(request.contains(slot), expected);
    }

    #[test]
    fn root_request_drops_duplicates_and_respects_limit() -> Result<()> {
        let root_1 = H256::repeat_byte(1);
        let root_2 = H256::repeat_byte(2);

        let request = BlocksByRootRequest::new([root_1, root_2, root_1], 2)?;

        assert_eq!(request.block_roots, [root_1, root_2]);
        assert!(BlocksByRootRequest::new([root_1, root_2], 1).is_err());

        Ok(())
    }

    #[test]
    fn oversized_root_request_is_not_decoded() -> Result<()> {
        let roots = (0..4).map(H256::repeat_byte).collect_vec();
        let bytes = BlocksByRootRequest::new(roots, 4)?.to_bytes()?;

        assert!(BlocksByRootRequest::from_bytes(&bytes, 4).is_ok());
        assert!(BlocksByRootRequest::from_bytes(&bytes, 3).is_err());

        Ok(())
    }
}
