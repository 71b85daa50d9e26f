use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Image property map. Values are plain strings for inherited metadata and
/// structured JSON for cloudlet markers such as the network list.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Persisted key/value attributes attached to an instance by the platform.
pub type SystemMetadata = BTreeMap<String, String>;

pub const PROPERTY_KEY_CLOUDLET: &str = "is_cloudlet";
pub const PROPERTY_KEY_CLOUDLET_TYPE: &str = "cloudlet_type";
pub const PROPERTY_KEY_NETWORK_INFO: &str = "network";
pub const PROPERTY_KEY_BASE_UUID: &str = "base_sha256_uuid";

/// Security/tenant context of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: String,
    pub project_id: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            project_id: project_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Active,
    Building,
    Paused,
    Suspended,
    Stopped,
    Rescued,
    Resized,
    SoftDeleted,
    Deleted,
    Error,
}

impl VmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmState::Active => "active",
            VmState::Building => "building",
            VmState::Paused => "paused",
            VmState::Suspended => "suspended",
            VmState::Stopped => "stopped",
            VmState::Rescued => "rescued",
            VmState::Resized => "resized",
            VmState::SoftDeleted => "soft_deleted",
            VmState::Deleted => "deleted",
            VmState::Error => "error",
        }
    }
}

impl Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient marker for an in-flight orchestration operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    ImageSnapshot,
    ImageBackup,
    Suspending,
    Resuming,
    Rebooting,
    Deleting,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::ImageSnapshot => "image_snapshot",
            TaskState::ImageBackup => "image_backup",
            TaskState::Suspending => "suspending",
            TaskState::Resuming => "resuming",
            TaskState::Rebooting => "rebooting",
            TaskState::Deleting => "deleting",
        }
    }

    /// Renders an optional task state, using "none" for the unset marker.
    pub fn describe(state: Option<TaskState>) -> &'static str {
        state.map(|s| s.as_str()).unwrap_or("none")
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub memory_mb: u32,
    pub root_gb: u32,
}

/// The slice of a platform instance this crate reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: String,
    pub display_name: Option<String>,
    pub vm_state: VmState,
    pub task_state: Option<TaskState>,
    /// Compute node that owns the instance; unset until scheduled.
    pub host: Option<String>,
    /// Source image the instance was booted from.
    pub image_ref: Option<String>,
    pub flavor: Flavor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub mac_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudletImageType {
    #[serde(rename = "cloudlet_base_disk")]
    BaseDisk,
    #[serde(rename = "cloudlet_base_memory")]
    BaseMemory,
    #[serde(rename = "cloudlet_base_disk_hash")]
    BaseDiskHash,
    #[serde(rename = "cloudlet_base_memory_hash")]
    BaseMemoryHash,
    #[serde(rename = "cloudlet_overlay")]
    Overlay,
}

impl CloudletImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudletImageType::BaseDisk => "cloudlet_base_disk",
            CloudletImageType::BaseMemory => "cloudlet_base_memory",
            CloudletImageType::BaseDiskHash => "cloudlet_base_disk_hash",
            CloudletImageType::BaseMemoryHash => "cloudlet_base_memory_hash",
            CloudletImageType::Overlay => "cloudlet_overlay",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "cloudlet_base_disk" => Some(CloudletImageType::BaseDisk),
            "cloudlet_base_memory" => Some(CloudletImageType::BaseMemory),
            "cloudlet_base_disk_hash" => Some(CloudletImageType::BaseDiskHash),
            "cloudlet_base_memory_hash" => Some(CloudletImageType::BaseMemoryHash),
            "cloudlet_overlay" => Some(CloudletImageType::Overlay),
            _ => None,
        }
    }

    /// Suffix appended to the requested base name for each member of a base family.
    pub fn name_suffix(&self) -> &'static str {
        match self {
            CloudletImageType::BaseDisk => "-disk",
            CloudletImageType::BaseMemory => "-mem",
            CloudletImageType::BaseDiskHash => "-disk-meta",
            CloudletImageType::BaseMemoryHash => "-mem-meta",
            CloudletImageType::Overlay => "",
        }
    }

    pub fn is_base(&self) -> bool {
        !matches!(self, CloudletImageType::Overlay)
    }
}

impl Display for CloudletImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image type tag passed to property inheritance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKind {
    Snapshot,
    Backup { backup_type: String },
    Other(String),
}

impl ImageKind {
    pub fn as_str(&self) -> &str {
        match self {
            ImageKind::Snapshot => "snapshot",
            ImageKind::Backup { .. } => "backup",
            ImageKind::Other(tag) => tag,
        }
    }
}

/// Request body for creating an image record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub name: String,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ram: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_disk: Option<u32>,
    pub properties: PropertyMap,
}

/// An image record as stored by the image service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub is_public: bool,
    pub min_ram: Option<u32>,
    pub min_disk: Option<u32>,
    pub disk_format: Option<String>,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(|v| v.as_str())
    }

    pub fn cloudlet_type(&self) -> Option<CloudletImageType> {
        self.property_str(PROPERTY_KEY_CLOUDLET_TYPE)
            .and_then(CloudletImageType::from_tag)
    }
}
