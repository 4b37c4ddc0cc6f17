use crate::{
    deneb::containers::{BeaconBlock, BeaconBlockBody, BlobSidecar, SignedBeaconBlock},
    encoding::HashTreeRoot,
    phase0::{
        containers::{BeaconBlockHeader, SignedBeaconBlockHeader},
        primitives::{Slot, ValidatorIndex, H256},
    },
};

impl HashTreeRoot for BeaconBlockBody {}

// A block and its header share a root, which lets sidecars refer to blocks through headers.
impl HashTreeRoot for BeaconBlock {
    fn hash_tree_root(&self) -> H256 {
        self.to_header().hash_tree_root()
    }
}

impl BeaconBlock {
    #[must_use]
    pub fn to_header(&self) -> BeaconBlockHeader {
        let Self {
            slot,
            proposer_index,
            parent_root,
            state_root,
            ref body,
        } = *self;

        BeaconBlockHeader {
            slot,
            proposer_index,
            parent_root,
            state_root,
            body_root: body.hash_tree_root(),
        }
    }
}

impl SignedBeaconBlock {
    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.message.slot
    }

    #[must_use]
    pub fn to_header(&self) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self.message.to_header(),
            signature: self.signature,
        }
    }
}

impl BlobSidecar {
    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }

    #[must_use]
    pub const fn proposer_index(&self) -> ValidatorIndex {
        self.signed_block_header.message.proposer_index
    }

    #[must_use]
    pub fn block_root(&self) -> H256 {
        self.signed_block_header.message.hash_tree_root()
    }
}
