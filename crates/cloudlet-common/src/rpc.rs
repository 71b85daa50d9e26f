//! Versioned cast messages sent to compute nodes

use crate::{CloudletError, Instance};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// `major.minor` protocol version carried by every cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RpcVersion {
    pub major: u32,
    pub minor: u32,
}

impl RpcVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// A recipient speaking `self` accepts any message of the same major
    /// version whose minor version is not newer than its own.
    pub fn can_accept(&self, requested: &RpcVersion) -> bool {
        self.major == requested.major && requested.minor <= self.minor
    }
}

impl Display for RpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for RpcVersion {
    type Err = CloudletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CloudletError::Config(format!("Invalid RPC version: {}", s));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for RpcVersion {
    type Error = CloudletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RpcVersion> for String {
    fn from(version: RpcVersion) -> Self {
        version.to_string()
    }
}

/// Instructions a compute node executes on behalf of a coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum ComputeMessage {
    CloudletCreateBase {
        instance: Instance,
        vm_name: String,
        disk_meta_id: String,
        memory_meta_id: String,
        diskhash_meta_id: String,
        memoryhash_meta_id: String,
    },
    CloudletOverlayFinish {
        instance: Instance,
        overlay_name: String,
        overlay_id: String,
    },
}

impl ComputeMessage {
    pub fn method(&self) -> &'static str {
        match self {
            ComputeMessage::CloudletCreateBase { .. } => "cloudlet_create_base",
            ComputeMessage::CloudletOverlayFinish { .. } => "cloudlet_overlay_finish",
        }
    }

    pub fn instance(&self) -> &Instance {
        match self {
            ComputeMessage::CloudletCreateBase { instance, .. }
            | ComputeMessage::CloudletOverlayFinish { instance, .. } => instance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedMessage {
    pub version: RpcVersion,
    pub message: ComputeMessage,
}

impl VersionedMessage {
    pub fn new(version: RpcVersion, message: ComputeMessage) -> Self {
        Self { version, message }
    }
}
