pub mod accessors;
pub mod error;
pub mod misc;
pub mod predicates;
pub mod signing;
pub mod verifier;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
