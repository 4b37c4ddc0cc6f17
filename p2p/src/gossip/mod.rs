pub use error::Error;
pub use message::PubsubMessage;
pub use seen::{SeenCacheConfig, SeenCaches, SeenSet};
pub use topics::{GossipKind, GossipTopic};
pub use validator::GossipValidator;

mod error;
mod message;
mod seen;
mod topics;
mod validator;
