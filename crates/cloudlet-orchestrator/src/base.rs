//! Base VM creation: four linked image records, then a cast to the compute node.
//!
//! The memory, disk-hash and memory-hash images are created first so the
//! disk image can carry their ids. Nothing created here is rolled back on a
//! later failure; orphaned records are logged and left to an external sweep.

use crate::config::CloudletConfig;
use crate::dispatch::compute_topic;
use crate::guard::{self, CREATE_BASE_ACTION};
use crate::image::ImageWriter;
use crate::properties::{base_sha256_uuid, cloudlet_markers};
use cloudlet_common::{
    CloudletError, CloudletImageType, ComputeMessage, DispatchGateway, ImageKind, ImageRecord,
    Instance, InstanceStore, NetworkTopology, PolicyEnforcer, PropertyMap, RequestContext,
    Result, TaskState, VersionedMessage, VmState,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Progress of a single base creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BasePhase {
    Requested,
    MemCreated,
    DiskHashCreated,
    MemHashCreated,
    Linked,
    DiskCreated,
    TaskStateTransitioning,
    Dispatched,
}

impl BasePhase {
    pub fn next(self) -> Option<BasePhase> {
        match self {
            BasePhase::Requested => Some(BasePhase::MemCreated),
            BasePhase::MemCreated => Some(BasePhase::DiskHashCreated),
            BasePhase::DiskHashCreated => Some(BasePhase::MemHashCreated),
            BasePhase::MemHashCreated => Some(BasePhase::Linked),
            BasePhase::Linked => Some(BasePhase::DiskCreated),
            BasePhase::DiskCreated => Some(BasePhase::TaskStateTransitioning),
            BasePhase::TaskStateTransitioning => Some(BasePhase::Dispatched),
            BasePhase::Dispatched => None,
        }
    }
}

#[derive(Debug)]
struct BaseProgress {
    phase: BasePhase,
    created: Vec<String>,
}

impl BaseProgress {
    fn new() -> Self {
        Self {
            phase: BasePhase::Requested,
            created: Vec::new(),
        }
    }

    fn advance(&mut self, to: BasePhase) {
        debug_assert_eq!(self.phase.next(), Some(to), "base phases must advance in order");
        debug!(from = ?self.phase, ?to, "Base creation phase");
        self.phase = to;
    }

    fn image_created(&mut self, record: &ImageRecord, to: BasePhase) {
        self.created.push(record.id.clone());
        self.advance(to);
    }

    fn abandon(&self, err: &CloudletError) {
        if self.created.is_empty() {
            return;
        }
        warn!(
            phase = ?self.phase,
            orphaned = ?self.created,
            error = %err,
            "Base creation aborted after image records were created"
        );
    }
}

/// The four records of one base family.
#[derive(Debug, Clone, Serialize)]
pub struct BaseImageSet {
    pub disk: ImageRecord,
    pub memory: ImageRecord,
    pub disk_hash: ImageRecord,
    pub memory_hash: ImageRecord,
}

impl BaseImageSet {
    pub fn disk_id(&self) -> &str {
        &self.disk.id
    }

    pub fn memory_id(&self) -> &str {
        &self.memory.id
    }

    pub fn records(&self) -> [&ImageRecord; 4] {
        [&self.memory, &self.disk_hash, &self.memory_hash, &self.disk]
    }
}

pub struct BaseSnapshotCoordinator {
    config: Arc<CloudletConfig>,
    writer: ImageWriter,
    instances: Arc<dyn InstanceStore>,
    network: Arc<dyn NetworkTopology>,
    dispatcher: Arc<dyn DispatchGateway>,
    policy: Arc<dyn PolicyEnforcer>,
}

impl BaseSnapshotCoordinator {
    pub fn new(
        config: Arc<CloudletConfig>,
        writer: ImageWriter,
        instances: Arc<dyn InstanceStore>,
        network: Arc<dyn NetworkTopology>,
        dispatcher: Arc<dyn DispatchGateway>,
        policy: Arc<dyn PolicyEnforcer>,
    ) -> Self {
        Self {
            config,
            writer,
            instances,
            network,
            dispatcher,
            policy,
        }
    }

    /// Creates the base image family for `instance` and casts the snapshot
    /// request to its compute node. Returns as soon as the cast is enqueued.
    #[instrument(skip(self, ctx, instance, extra_properties), fields(instance_uuid = %instance.uuid))]
    pub async fn create_base(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        base_name: &str,
        extra_properties: Option<&PropertyMap>,
    ) -> Result<BaseImageSet> {
        guard::require_name(base_name, "base VM name")?;
        guard::check_policy(self.policy.as_ref(), ctx, CREATE_BASE_ACTION, instance)?;
        guard::check_instance_state(instance, &[VmState::Active], "cloudlet_create_base")?;

        let mut progress = BaseProgress::new();
        let result = self
            .run(ctx, instance, base_name, extra_properties, &mut progress)
            .await;
        if let Err(err) = &result {
            progress.abandon(err);
        }
        result
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        base_name: &str,
        extra_properties: Option<&PropertyMap>,
        progress: &mut BaseProgress,
    ) -> Result<BaseImageSet> {
        let interfaces = self.network.interfaces(ctx, instance).await?;
        let base_uuid = base_sha256_uuid(&instance.uuid);

        let markers = |image_type: CloudletImageType| {
            cloudlet_markers(
                image_type,
                Some(interfaces.as_slice()),
                Some(base_uuid.as_str()),
                extra_properties,
            )
        };
        let mut disk_properties = markers(CloudletImageType::BaseDisk);
        let memory_properties = markers(CloudletImageType::BaseMemory);
        let disk_hash_properties = markers(CloudletImageType::BaseDiskHash);
        let memory_hash_properties = markers(CloudletImageType::BaseMemoryHash);

        let memory = self
            .create_member(
                ctx,
                instance,
                base_name,
                CloudletImageType::BaseMemory,
                &memory_properties,
            )
            .await?;
        progress.image_created(&memory, BasePhase::MemCreated);

        let disk_hash = self
            .create_member(
                ctx,
                instance,
                base_name,
                CloudletImageType::BaseDiskHash,
                &disk_hash_properties,
            )
            .await?;
        progress.image_created(&disk_hash, BasePhase::DiskHashCreated);

        let memory_hash = self
            .create_member(
                ctx,
                instance,
                base_name,
                CloudletImageType::BaseMemoryHash,
                &memory_hash_properties,
            )
            .await?;
        progress.image_created(&memory_hash, BasePhase::MemHashCreated);

        disk_properties.insert(
            CloudletImageType::BaseMemory.as_str().to_string(),
            Value::from(memory.id.as_str()),
        );
        disk_properties.insert(
            CloudletImageType::BaseDiskHash.as_str().to_string(),
            Value::from(disk_hash.id.as_str()),
        );
        disk_properties.insert(
            CloudletImageType::BaseMemoryHash.as_str().to_string(),
            Value::from(memory_hash.id.as_str()),
        );
        progress.advance(BasePhase::Linked);

        let disk = self
            .create_member(
                ctx,
                instance,
                base_name,
                CloudletImageType::BaseDisk,
                &disk_properties,
            )
            .await?;
        progress.image_created(&disk, BasePhase::DiskCreated);

        progress.advance(BasePhase::TaskStateTransitioning);
        let instance = self
            .instances
            .set_task_state(ctx, instance, Some(TaskState::ImageSnapshot), None)
            .await?;

        let topic = compute_topic(&self.config.compute_topic, &instance)?;
        let message = VersionedMessage::new(
            self.config.rpc_version,
            ComputeMessage::CloudletCreateBase {
                instance,
                vm_name: base_name.to_string(),
                disk_meta_id: disk.id.clone(),
                memory_meta_id: memory.id.clone(),
                diskhash_meta_id: disk_hash.id.clone(),
                memoryhash_meta_id: memory_hash.id.clone(),
            },
        );
        self.dispatcher.cast(ctx, &topic, message).await?;
        progress.advance(BasePhase::Dispatched);

        info!(
            disk = %disk.id,
            memory = %memory.id,
            disk_hash = %disk_hash.id,
            memory_hash = %memory_hash.id,
            %topic,
            "Base VM creation dispatched"
        );

        Ok(BaseImageSet {
            disk,
            memory,
            disk_hash,
            memory_hash,
        })
    }

    async fn create_member(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        base_name: &str,
        image_type: CloudletImageType,
        properties: &PropertyMap,
    ) -> Result<ImageRecord> {
        let name = format!("{}{}", base_name, image_type.name_suffix());
        self.writer
            .create(ctx, instance, &name, &ImageKind::Snapshot, Some(properties))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phase = BasePhase::Requested;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(phase, BasePhase::Dispatched);
        assert!(BasePhase::MemHashCreated < BasePhase::DiskCreated);
    }
}
