pub use ethereum_types::{H160, H256, H32};
pub use primitive_types::{H384, H768};

pub type CommitteeIndex = u64;
pub type DomainType = H32;
pub type Epoch = u64;
pub type ExecutionAddress = H160;
pub type ForkDigest = H32;
pub type Gwei = u64;
pub type Slot = u64;
pub type SubnetId = u64;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;
pub type Version = H32;

// Signatures and public keys are only ever handled in compressed form here.
// Decompression and the pairing checks belong to the signature backend.
pub type PublicKeyBytes = H384;
pub type SignatureBytes = H768;
