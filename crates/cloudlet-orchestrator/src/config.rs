use cloudlet_common::{CloudletError, Result, RpcVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_COMPUTE_TOPIC: &str = "compute";
pub const DEFAULT_RPC_VERSION: RpcVersion = RpcVersion::new(2, 28);
pub const DEFAULT_INHERITED_PREFIX: &str = "image_";

/// Settings shared by the coordinators. Built once at startup and injected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudletConfig {
    /// Base topic; casts go to `{compute_topic}.{host}`.
    pub compute_topic: String,
    pub rpc_version: RpcVersion,
    /// Keys never copied from instance system metadata onto new images.
    pub non_inheritable_image_properties: BTreeSet<String>,
    pub inherited_property_prefix: String,
}

impl Default for CloudletConfig {
    fn default() -> Self {
        Self {
            compute_topic: DEFAULT_COMPUTE_TOPIC.to_string(),
            rpc_version: DEFAULT_RPC_VERSION,
            non_inheritable_image_properties: ["cache_in_nova", "bittorrent"]
                .into_iter()
                .map(String::from)
                .collect(),
            inherited_property_prefix: DEFAULT_INHERITED_PREFIX.to_string(),
        }
    }
}

impl CloudletConfig {
    /// Defaults overlaid with `CLOUDLET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(topic) = lookup("CLOUDLET_COMPUTE_TOPIC") {
            if topic.trim().is_empty() {
                return Err(CloudletError::Config(
                    "CLOUDLET_COMPUTE_TOPIC must not be empty".to_string(),
                ));
            }
            config.compute_topic = topic.trim().to_string();
        }
        if let Some(version) = lookup("CLOUDLET_RPC_VERSION") {
            config.rpc_version = version.parse()?;
        }
        if let Some(keys) = lookup("CLOUDLET_NON_INHERITABLE_PROPERTIES") {
            config.non_inheritable_image_properties = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}
