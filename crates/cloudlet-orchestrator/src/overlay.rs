use crate::config::CloudletConfig;
use crate::dispatch::compute_topic;
use crate::guard::{self, CREATE_OVERLAY_START_ACTION};
use crate::image::ImageWriter;
use crate::properties::cloudlet_markers;
use cloudlet_common::{
    CloudletImageType, ComputeMessage, DispatchGateway, ImageKind, ImageRecord, Instance,
    InstanceStore, PolicyEnforcer, PropertyMap, RequestContext, Result, TaskState,
    VersionedMessage, VmState,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct OverlaySnapshotCoordinator {
    config: Arc<CloudletConfig>,
    writer: ImageWriter,
    instances: Arc<dyn InstanceStore>,
    dispatcher: Arc<dyn DispatchGateway>,
    policy: Arc<dyn PolicyEnforcer>,
}

impl OverlaySnapshotCoordinator {
    pub fn new(
        config: Arc<CloudletConfig>,
        writer: ImageWriter,
        instances: Arc<dyn InstanceStore>,
        dispatcher: Arc<dyn DispatchGateway>,
        policy: Arc<dyn PolicyEnforcer>,
    ) -> Self {
        Self {
            config,
            writer,
            instances,
            dispatcher,
            policy,
        }
    }

    /// Reserved for matching the resuming instance's configuration against
    /// its base VM. Accepts the call and does nothing beyond the policy check.
    #[instrument(skip(self, ctx, instance, _extra_properties), fields(instance_uuid = %instance.uuid))]
    pub async fn create_overlay_start(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        basevm_name: &str,
        _extra_properties: Option<&PropertyMap>,
    ) -> Result<()> {
        guard::check_policy(self.policy.as_ref(), ctx, CREATE_OVERLAY_START_ACTION, instance)?;
        debug!(%basevm_name, "Overlay start requested; nothing to negotiate");
        Ok(())
    }

    /// Creates the overlay image record and casts the overlay request to the
    /// instance's compute node. Returns once the cast is enqueued.
    #[instrument(skip(self, ctx, instance, extra_properties), fields(instance_uuid = %instance.uuid))]
    pub async fn create_overlay_finish(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        overlay_name: &str,
        extra_properties: Option<&PropertyMap>,
    ) -> Result<ImageRecord> {
        guard::require_name(overlay_name, "overlay name")?;
        guard::check_instance_state(instance, &[VmState::Active], "cloudlet_create_overlay_finish")?;

        let properties =
            cloudlet_markers(CloudletImageType::Overlay, None, None, extra_properties);
        let overlay = self
            .writer
            .create(ctx, instance, overlay_name, &ImageKind::Snapshot, Some(&properties))
            .await?;

        let dispatched = self.transition_and_cast(ctx, instance, overlay_name, &overlay).await;
        if let Err(err) = &dispatched {
            warn!(orphaned = %overlay.id, error = %err, "Overlay creation aborted after image record was created");
        }
        dispatched?;

        info!(overlay = %overlay.id, %overlay_name, "Overlay creation dispatched");
        Ok(overlay)
    }

    async fn transition_and_cast(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        overlay_name: &str,
        overlay: &ImageRecord,
    ) -> Result<()> {
        let instance = self
            .instances
            .set_task_state(ctx, instance, Some(TaskState::ImageSnapshot), None)
            .await?;

        let topic = compute_topic(&self.config.compute_topic, &instance)?;
        let message = VersionedMessage::new(
            self.config.rpc_version,
            ComputeMessage::CloudletOverlayFinish {
                instance,
                overlay_name: overlay_name.to_string(),
                overlay_id: overlay.id.clone(),
            },
        );
        self.dispatcher.cast(ctx, &topic, message).await
    }
}
