use std::path::Path;

use anyhow::Result;
use batch_verifier::BatchVerifierConfig;
use p2p::NetworkConfig;
use serde::Deserialize;

/// Tunables of the components started by [`crate::run`].
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Copy, Default, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub metrics: bool,
    pub batch_verifier: BatchVerifierConfig,
    pub network: NetworkConfig,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs_err::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(yaml).map_err(Into::into)
    }
}
