//! Contracts of the external services the cloudlet core calls into

use crate::{
    ImageMetadata, ImageRecord, Instance, NetworkInterface, PropertyMap, RequestContext, Result,
    SystemMetadata, TaskState, VersionedMessage,
};
use async_trait::async_trait;

/// Image/blob storage service.
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Creates an image record. Fails with `Storage` on unavailability or
    /// quota; no record is left behind on failure.
    async fn create(&self, ctx: &RequestContext, metadata: ImageMetadata) -> Result<ImageRecord>;

    /// Looks up an image, returning `None` when it does not exist.
    async fn show(&self, ctx: &RequestContext, image_id: &str) -> Result<Option<ImageRecord>>;
}

/// Instance records and task-state persistence of the orchestration platform.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get(&self, ctx: &RequestContext, instance_uuid: &str) -> Result<Instance>;

    async fn system_metadata(
        &self,
        ctx: &RequestContext,
        instance_uuid: &str,
    ) -> Result<SystemMetadata>;

    /// Conditional task-state update. Fails with `Conflict` when the stored
    /// task state differs from `expected`.
    async fn set_task_state(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        new_state: Option<TaskState>,
        expected: Option<TaskState>,
    ) -> Result<Instance>;

    /// Aggregate compute-node statistics, used as the baseline for resource discovery.
    async fn compute_node_statistics(&self, ctx: &RequestContext) -> Result<PropertyMap>;
}

#[async_trait]
pub trait NetworkTopology: Send + Sync {
    /// Virtual interfaces of the instance, in attachment order.
    async fn interfaces(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
    ) -> Result<Vec<NetworkInterface>>;
}

/// One-way message transport to compute nodes.
#[async_trait]
pub trait DispatchGateway: Send + Sync {
    /// Enqueues `message` for `topic`. Returns once enqueued; the remote
    /// work is never awaited.
    async fn cast(&self, ctx: &RequestContext, topic: &str, message: VersionedMessage)
        -> Result<()>;
}

/// Optional resource-monitoring collector.
#[async_trait]
pub trait DiscoveryCollector: Send + Sync {
    async fn static_resource(&self, node_stats: &PropertyMap) -> Result<PropertyMap>;

    async fn dynamic_resource(&self, node_stats: &PropertyMap) -> Result<PropertyMap>;
}

/// Caller authorization for cloudlet actions.
pub trait PolicyEnforcer: Send + Sync {
    fn enforce(&self, ctx: &RequestContext, action: &str, instance: &Instance) -> Result<()>;
}

/// Policy that authorizes every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PolicyEnforcer for AllowAll {
    fn enforce(&self, _ctx: &RequestContext, _action: &str, _instance: &Instance) -> Result<()> {
        Ok(())
    }
}
