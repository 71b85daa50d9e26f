//! Property maps for new images.
//!
//! Precedence, highest first: caller extras, computed seed values, then
//! properties inherited from the instance's system metadata.

use crate::config::CloudletConfig;
use cloudlet_common::{
    CloudletImageType, ImageKind, ImageRecord, Instance, NetworkInterface, PropertyMap,
    RequestContext, SystemMetadata, PROPERTY_KEY_BASE_UUID, PROPERTY_KEY_CLOUDLET,
    PROPERTY_KEY_CLOUDLET_TYPE, PROPERTY_KEY_NETWORK_INFO,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// System-metadata key holding the instance's base image reference.
const BASE_IMAGE_REF_KEY: &str = "image_base_image_ref";

#[derive(Debug, Clone)]
pub struct PropertyInheritance {
    prefix: String,
    non_inheritable: BTreeSet<String>,
}

impl PropertyInheritance {
    pub fn new(config: &CloudletConfig) -> Self {
        Self {
            prefix: config.inherited_property_prefix.clone(),
            non_inheritable: config.non_inheritable_image_properties.clone(),
        }
    }

    /// Computes the property map for an image derived from `instance`.
    /// Pure: the result depends only on the arguments.
    pub fn build(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        kind: &ImageKind,
        system_metadata: &SystemMetadata,
        extra_properties: Option<&PropertyMap>,
    ) -> PropertyMap {
        let mut properties = PropertyMap::new();
        properties.insert("instance_uuid".to_string(), Value::from(instance.uuid.as_str()));
        properties.insert("user_id".to_string(), Value::from(ctx.user_id.as_str()));
        properties.insert("image_type".to_string(), Value::from(kind.as_str()));

        if let Some(base_image_ref) = system_metadata.get(BASE_IMAGE_REF_KEY) {
            if !base_image_ref.is_empty() {
                properties.insert(
                    "base_image_ref".to_string(),
                    Value::from(base_image_ref.as_str()),
                );
            }
        }

        if let ImageKind::Backup { backup_type } = kind {
            properties.insert("backup_type".to_string(), Value::from(backup_type.as_str()));
        }

        if let Some(extra) = extra_properties {
            properties.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        for (key, value) in system_metadata {
            let key = key.strip_prefix(self.prefix.as_str()).unwrap_or(key);
            if self.non_inheritable.contains(key) {
                continue;
            }
            properties
                .entry(key.to_string())
                .or_insert_with(|| Value::from(value.as_str()));
        }

        properties
    }
}

/// Minimum RAM/disk hints for a snapshot of `instance`, taken from the image
/// it was booted from. Returns `(None, None)` when that image is unknown.
pub fn sizing_hints(source: Option<&ImageRecord>, instance: &Instance) -> (Option<u32>, Option<u32>) {
    let Some(source) = source else {
        return (None, None);
    };
    // vhd disks cannot shrink below the flavor's root disk
    let min_disk = if source.disk_format.as_deref() == Some("vhd") {
        Some(instance.flavor.root_gb)
    } else {
        source.min_disk
    };
    (source.min_ram, min_disk)
}

/// Grouping key shared by every image of one base family.
pub fn base_sha256_uuid(instance_uuid: &str) -> String {
    format!("{:x}", Sha256::digest(instance_uuid.as_bytes()))
}

/// Cloudlet marker properties for `image_type`, with caller extras applied on top.
pub fn cloudlet_markers(
    image_type: CloudletImageType,
    network: Option<&[NetworkInterface]>,
    base_uuid: Option<&str>,
    extra_properties: Option<&PropertyMap>,
) -> PropertyMap {
    let mut properties = PropertyMap::new();
    properties.insert(PROPERTY_KEY_CLOUDLET.to_string(), Value::Bool(true));
    properties.insert(
        PROPERTY_KEY_CLOUDLET_TYPE.to_string(),
        Value::from(image_type.as_str()),
    );
    if let Some(network) = network {
        let entries = network
            .iter()
            .map(|vif| serde_json::json!({ "id": vif.id, "mac_address": vif.mac_address }))
            .collect();
        properties.insert(PROPERTY_KEY_NETWORK_INFO.to_string(), Value::Array(entries));
    }
    if let Some(base_uuid) = base_uuid {
        properties.insert(PROPERTY_KEY_BASE_UUID.to_string(), Value::from(base_uuid));
    }
    if let Some(extra) = extra_properties {
        properties.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cloudlet_common::{Flavor, VmState};
    use serde_json::json;

    fn instance() -> Instance {
        Instance {
            uuid: "abc".to_string(),
            display_name: Some("i1".to_string()),
            vm_state: VmState::Active,
            task_state: None,
            host: Some("node-1".to_string()),
            image_ref: Some("img-src".to_string()),
            flavor: Flavor {
                memory_mb: 2048,
                root_gb: 20,
            },
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("alice", "demo")
    }

    fn system_metadata() -> SystemMetadata {
        [
            ("image_base_image_ref", "img-src"),
            ("image_os_type", "linux"),
            ("image_min_ram", "512"),
            ("image_bittorrent", "yes"),
            ("image_instance_uuid", "spoofed"),
            ("instance_type_name", "m1.small"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_seed_and_inherit() {
        let inheritance = PropertyInheritance::new(&CloudletConfig::default());
        let props = inheritance.build(
            &ctx(),
            &instance(),
            &ImageKind::Snapshot,
            &system_metadata(),
            None,
        );

        assert_eq!(props["instance_uuid"], json!("abc"));
        assert_eq!(props["user_id"], json!("alice"));
        assert_eq!(props["image_type"], json!("snapshot"));
        assert_eq!(props["base_image_ref"], json!("img-src"));
        assert_eq!(props["os_type"], json!("linux"));
        // unprefixed keys are inherited verbatim
        assert_eq!(props["instance_type_name"], json!("m1.small"));
        assert!(!props.contains_key("backup_type"));
    }

    #[test]
    fn test_inherited_never_overwrites_seed() {
        let inheritance = PropertyInheritance::new(&CloudletConfig::default());
        let props = inheritance.build(
            &ctx(),
            &instance(),
            &ImageKind::Snapshot,
            &system_metadata(),
            None,
        );
        assert_eq!(props["instance_uuid"], json!("abc"));
    }

    #[test]
    fn test_extras_beat_seed_and_inherited() {
        let inheritance = PropertyInheritance::new(&CloudletConfig::default());
        let mut extra = PropertyMap::new();
        extra.insert("image_type".to_string(), json!("cloudlet"));
        extra.insert("os_type".to_string(), json!("windows"));

        let props = inheritance.build(
            &ctx(),
            &instance(),
            &ImageKind::Snapshot,
            &system_metadata(),
            Some(&extra),
        );
        assert_eq!(props["image_type"], json!("cloudlet"));
        assert_eq!(props["os_type"], json!("windows"));
    }

    #[test]
    fn test_non_inheritable_excluded_unless_explicit() {
        let inheritance = PropertyInheritance::new(&CloudletConfig::default());
        let props = inheritance.build(
            &ctx(),
            &instance(),
            &ImageKind::Snapshot,
            &system_metadata(),
            None,
        );
        assert!(!props.contains_key("bittorrent"));

        let mut extra = PropertyMap::new();
        extra.insert("bittorrent".to_string(), json!("explicit"));
        let props = inheritance.build(
            &ctx(),
            &instance(),
            &ImageKind::Snapshot,
            &system_metadata(),
            Some(&extra),
        );
        assert_eq!(props["bittorrent"], json!("explicit"));
    }

    #[test]
    fn test_backup_rotation_tag() {
        let inheritance = PropertyInheritance::new(&CloudletConfig::default());
        let kind = ImageKind::Backup {
            backup_type: "daily".to_string(),
        };
        let props = inheritance.build(&ctx(), &instance(), &kind, &SystemMetadata::new(), None);
        assert_eq!(props["image_type"], json!("backup"));
        assert_eq!(props["backup_type"], json!("daily"));
        assert!(!props.contains_key("base_image_ref"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let inheritance = PropertyInheritance::new(&CloudletConfig::default());
        let a = inheritance.build(&ctx(), &instance(), &ImageKind::Snapshot, &system_metadata(), None);
        let b = inheritance.build(&ctx(), &instance(), &ImageKind::Snapshot, &system_metadata(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sizing_hints() {
        let mut source = ImageRecord {
            id: "img-src".to_string(),
            name: "ubuntu".to_string(),
            is_public: true,
            min_ram: Some(512),
            min_disk: Some(5),
            disk_format: Some("qcow2".to_string()),
            properties: PropertyMap::new(),
            created_at: Utc::now(),
        };
        assert_eq!(sizing_hints(Some(&source), &instance()), (Some(512), Some(5)));

        source.disk_format = Some("vhd".to_string());
        assert_eq!(sizing_hints(Some(&source), &instance()), (Some(512), Some(20)));

        assert_eq!(sizing_hints(None, &instance()), (None, None));
    }

    #[test]
    fn test_base_sha256_uuid() {
        assert_eq!(
            base_sha256_uuid("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_markers() {
        let vifs = vec![
            NetworkInterface {
                id: "vif-1".to_string(),
                mac_address: "fa:16:3e:00:00:01".to_string(),
            },
            NetworkInterface {
                id: "vif-2".to_string(),
                mac_address: "fa:16:3e:00:00:02".to_string(),
            },
        ];
        let mut extra = PropertyMap::new();
        extra.insert(PROPERTY_KEY_CLOUDLET_TYPE.to_string(), json!("custom"));

        let props = cloudlet_markers(
            CloudletImageType::BaseMemory,
            Some(&vifs),
            Some("hash"),
            Some(&extra),
        );
        assert_eq!(props[PROPERTY_KEY_CLOUDLET], json!(true));
        assert_eq!(props[PROPERTY_KEY_CLOUDLET_TYPE], json!("custom"));
        assert_eq!(props[PROPERTY_KEY_NETWORK_INFO][1]["id"], json!("vif-2"));
        assert_eq!(props[PROPERTY_KEY_BASE_UUID], json!("hash"));

        let overlay = cloudlet_markers(CloudletImageType::Overlay, None, None, None);
        assert_eq!(overlay.len(), 2);
    }
}
