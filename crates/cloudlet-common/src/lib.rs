// Re-export dependencies used in public interfaces of common types

use thiserror::Error;

pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use uuid;

pub mod rpc;
pub mod services;
pub mod types;

pub use rpc::{ComputeMessage, RpcVersion, VersionedMessage};
pub use services::{
    AllowAll, DiscoveryCollector, DispatchGateway, ImageCatalog, InstanceStore, NetworkTopology,
    PolicyEnforcer,
};
pub use types::*;

#[derive(Error, Debug)]
pub enum CloudletError {
    #[error("Instance {instance_uuid} in {attr} {state}. Cannot {method} while the instance is in this state.")]
    InvalidState {
        instance_uuid: String,
        attr: String,
        state: String,
        method: String,
    },

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Policy does not allow {action} to be performed")]
    PolicyDenied { action: String },

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Image Storage Error: {0}")]
    Storage(String),

    #[error("Conflict updating instance {instance_uuid}: expected task state {expected}, found {actual}")]
    Conflict {
        instance_uuid: String,
        expected: String,
        actual: String,
    },

    #[error("Dispatch Error: {0}")]
    Dispatch(String),

    #[error("Collaborator Unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl CloudletError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudletError::Conflict { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CloudletError::CollaboratorUnavailable(_))
    }
}

// Define the primary Result type for cloudlet operations
pub type Result<T> = std::result::Result<T, CloudletError>;
