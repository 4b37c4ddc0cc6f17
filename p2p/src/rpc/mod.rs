pub use block_fetch::{BlockFetcher, FetchError, ProcessOutcome};
pub use codec::{CodecError, InboundCodec, OutboundCodec, ResponseChunk, ResponseCode};
pub use handler::RequestHandler;
pub use methods::{BlocksByRangeRequest, BlocksByRootRequest};
pub use protocol::{Protocol, RequestLimits, Transport};

mod block_fetch;
mod codec;
mod handler;
mod methods;
mod protocol;
