//! In-memory collaborators for development and testing

use async_trait::async_trait;
use chrono::Utc;
use cloudlet_common::{
    CloudletError, DiscoveryCollector, ImageCatalog, ImageMetadata, ImageRecord, Instance,
    InstanceStore, NetworkInterface, NetworkTopology, PropertyMap, RequestContext, Result,
    SystemMetadata, TaskState,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Image catalog keeping records in creation order.
#[derive(Default)]
pub struct InMemoryImageCatalog {
    images: Arc<RwLock<Vec<ImageRecord>>>,
    failing_names: Arc<RwLock<HashSet<String>>>,
    quota: Option<usize>,
}

impl InMemoryImageCatalog {
    pub fn new() -> Self {
        Default::default()
    }

    /// Refuses creation once `quota` records exist.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Default::default()
        }
    }

    /// Makes every create of an image called `name` fail with a storage error.
    pub async fn fail_on(&self, name: impl Into<String>) {
        self.failing_names.write().await.insert(name.into());
    }

    /// Stores an existing record, e.g. the image an instance was booted from.
    pub async fn insert(&self, record: ImageRecord) {
        self.images.write().await.push(record);
    }

    pub async fn images(&self) -> Vec<ImageRecord> {
        self.images.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }
}

#[async_trait]
impl ImageCatalog for InMemoryImageCatalog {
    async fn create(&self, _ctx: &RequestContext, metadata: ImageMetadata) -> Result<ImageRecord> {
        if self.failing_names.read().await.contains(&metadata.name) {
            return Err(CloudletError::Storage(format!(
                "Image service rejected {}",
                metadata.name
            )));
        }

        let mut images = self.images.write().await;
        if let Some(quota) = self.quota {
            if images.len() >= quota {
                return Err(CloudletError::Storage(format!(
                    "Image quota of {} exceeded",
                    quota
                )));
            }
        }

        let record = ImageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: metadata.name,
            is_public: metadata.is_public,
            min_ram: metadata.min_ram,
            min_disk: metadata.min_disk,
            disk_format: None,
            properties: metadata.properties,
            created_at: Utc::now(),
        };
        images.push(record.clone());
        Ok(record)
    }

    async fn show(&self, _ctx: &RequestContext, image_id: &str) -> Result<Option<ImageRecord>> {
        Ok(self
            .images
            .read()
            .await
            .iter()
            .find(|image| image.id == image_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryInstanceStore {
    instances: Arc<RwLock<HashMap<String, Instance>>>,
    system_metadata: Arc<RwLock<HashMap<String, SystemMetadata>>>,
    node_statistics: PropertyMap,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_node_statistics(node_statistics: PropertyMap) -> Self {
        Self {
            node_statistics,
            ..Default::default()
        }
    }

    pub async fn insert(&self, instance: Instance, system_metadata: SystemMetadata) {
        let uuid = instance.uuid.clone();
        self.instances.write().await.insert(uuid.clone(), instance);
        self.system_metadata.write().await.insert(uuid, system_metadata);
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn get(&self, _ctx: &RequestContext, instance_uuid: &str) -> Result<Instance> {
        self.instances
            .read()
            .await
            .get(instance_uuid)
            .cloned()
            .ok_or_else(|| CloudletError::NotFound(format!("Instance {}", instance_uuid)))
    }

    async fn system_metadata(
        &self,
        _ctx: &RequestContext,
        instance_uuid: &str,
    ) -> Result<SystemMetadata> {
        Ok(self
            .system_metadata
            .read()
            .await
            .get(instance_uuid)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_task_state(
        &self,
        _ctx: &RequestContext,
        instance: &Instance,
        new_state: Option<TaskState>,
        expected: Option<TaskState>,
    ) -> Result<Instance> {
        let mut instances = self.instances.write().await;
        let stored = instances
            .get_mut(&instance.uuid)
            .ok_or_else(|| CloudletError::NotFound(format!("Instance {}", instance.uuid)))?;

        if stored.task_state != expected {
            return Err(CloudletError::Conflict {
                instance_uuid: instance.uuid.clone(),
                expected: TaskState::describe(expected).to_string(),
                actual: TaskState::describe(stored.task_state).to_string(),
            });
        }
        stored.task_state = new_state;
        Ok(stored.clone())
    }

    async fn compute_node_statistics(&self, _ctx: &RequestContext) -> Result<PropertyMap> {
        Ok(self.node_statistics.clone())
    }
}

/// Fixed interface assignments keyed by instance uuid.
#[derive(Debug, Default, Clone)]
pub struct StaticNetworkTopology {
    interfaces: HashMap<String, Vec<NetworkInterface>>,
}

impl StaticNetworkTopology {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_interfaces(
        mut self,
        instance_uuid: impl Into<String>,
        interfaces: Vec<NetworkInterface>,
    ) -> Self {
        self.interfaces.insert(instance_uuid.into(), interfaces);
        self
    }
}

#[async_trait]
impl NetworkTopology for StaticNetworkTopology {
    async fn interfaces(
        &self,
        _ctx: &RequestContext,
        instance: &Instance,
    ) -> Result<Vec<NetworkInterface>> {
        Ok(self
            .interfaces
            .get(&instance.uuid)
            .cloned()
            .unwrap_or_default())
    }
}

/// Collector reporting fixed resources on top of the node statistics it is handed.
#[derive(Debug, Default, Clone)]
pub struct StaticDiscoveryCollector {
    static_resources: PropertyMap,
    dynamic_resources: PropertyMap,
}

impl StaticDiscoveryCollector {
    pub fn new(static_resources: PropertyMap, dynamic_resources: PropertyMap) -> Self {
        Self {
            static_resources,
            dynamic_resources,
        }
    }
}

#[async_trait]
impl DiscoveryCollector for StaticDiscoveryCollector {
    async fn static_resource(&self, node_stats: &PropertyMap) -> Result<PropertyMap> {
        let mut stats = node_stats.clone();
        stats.extend(self.static_resources.clone());
        Ok(stats)
    }

    async fn dynamic_resource(&self, _node_stats: &PropertyMap) -> Result<PropertyMap> {
        Ok(self.dynamic_resources.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudlet_common::{Flavor, VmState};

    fn instance() -> Instance {
        Instance {
            uuid: "abc".to_string(),
            display_name: None,
            vm_state: VmState::Active,
            task_state: None,
            host: Some("node-1".to_string()),
            image_ref: None,
            flavor: Flavor::default(),
        }
    }

    #[tokio::test]
    async fn test_conditional_task_state() {
        let store = InMemoryInstanceStore::new();
        store.insert(instance(), SystemMetadata::new()).await;
        let ctx = RequestContext::new("u", "p");

        let updated = store
            .set_task_state(&ctx, &instance(), Some(TaskState::ImageSnapshot), None)
            .await
            .unwrap();
        assert_eq!(updated.task_state, Some(TaskState::ImageSnapshot));

        let err = store
            .set_task_state(&ctx, &instance(), Some(TaskState::ImageSnapshot), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_catalog_quota_and_failures() {
        let catalog = InMemoryImageCatalog::with_quota(1);
        let ctx = RequestContext::new("u", "p");
        let meta = |name: &str| ImageMetadata {
            name: name.to_string(),
            is_public: true,
            ..Default::default()
        };

        let first = catalog.create(&ctx, meta("a")).await.unwrap();
        assert!(catalog.show(&ctx, &first.id).await.unwrap().is_some());
        assert!(matches!(
            catalog.create(&ctx, meta("b")).await,
            Err(CloudletError::Storage(_))
        ));

        let catalog = InMemoryImageCatalog::new();
        catalog.fail_on("bad").await;
        assert!(catalog.create(&ctx, meta("bad")).await.is_err());
        assert!(catalog.is_empty().await);
    }
}
