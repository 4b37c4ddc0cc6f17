use crate::{capella::containers::BlsToExecutionChange, encoding::HashTreeRoot};

impl HashTreeRoot for BlsToExecutionChange {}
