pub use crate::{
    node_config::NodeConfig,
    runtime::{initialize, initialize_metrics, run},
};

mod node_config;
mod runtime;
