//! Cloudlet image composition and dispatch.
//!
//! `CloudletApi` is the entry point used by the request-handling layer. It
//! owns one coordinator per operation and the shared collaborators they
//! call through.

pub mod base;
pub mod config;
pub mod dispatch;
pub mod guard;
pub mod image;
pub mod memory;
pub mod overlay;
pub mod properties;
pub mod status;

pub use cloudlet_common as common;

pub use base::{BaseImageSet, BasePhase, BaseSnapshotCoordinator};
pub use config::CloudletConfig;
pub use dispatch::{ChannelDispatcher, CastEnvelope, DispatchReceiver};
pub use overlay::OverlaySnapshotCoordinator;
pub use properties::PropertyInheritance;
pub use status::{StatusQuery, StatusReport, DISCOVERY_UNAVAILABLE};

use cloudlet_common::{
    AllowAll, DiscoveryCollector, DispatchGateway, ImageCatalog, ImageRecord, Instance,
    InstanceStore, NetworkTopology, PolicyEnforcer, PropertyMap, RequestContext, Result,
};
use image::ImageWriter;
use std::sync::Arc;
use tracing::info;

/// External services the coordinators call through.
#[derive(Clone)]
pub struct Collaborators {
    pub images: Arc<dyn ImageCatalog>,
    pub instances: Arc<dyn InstanceStore>,
    pub network: Arc<dyn NetworkTopology>,
    pub dispatcher: Arc<dyn DispatchGateway>,
    pub policy: Arc<dyn PolicyEnforcer>,
    pub discovery: Option<Arc<dyn DiscoveryCollector>>,
}

impl Collaborators {
    /// Collaborators with an allow-all policy and no discovery collector.
    pub fn new(
        images: Arc<dyn ImageCatalog>,
        instances: Arc<dyn InstanceStore>,
        network: Arc<dyn NetworkTopology>,
        dispatcher: Arc<dyn DispatchGateway>,
    ) -> Self {
        Self {
            images,
            instances,
            network,
            dispatcher,
            policy: Arc::new(AllowAll),
            discovery: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEnforcer>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryCollector>) -> Self {
        self.discovery = Some(discovery);
        self
    }
}

#[derive(Clone)]
pub struct CloudletApi {
    config: Arc<CloudletConfig>,
    instances: Arc<dyn InstanceStore>,
    base: Arc<BaseSnapshotCoordinator>,
    overlay: Arc<OverlaySnapshotCoordinator>,
    status: Arc<StatusQuery>,
}

impl CloudletApi {
    pub fn new(config: CloudletConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let writer = ImageWriter::new(
            collaborators.images.clone(),
            collaborators.instances.clone(),
            PropertyInheritance::new(&config),
        );

        info!(
            topic = %config.compute_topic,
            version = %config.rpc_version,
            discovery = collaborators.discovery.is_some(),
            "Initializing cloudlet API"
        );

        let base = BaseSnapshotCoordinator::new(
            config.clone(),
            writer.clone(),
            collaborators.instances.clone(),
            collaborators.network.clone(),
            collaborators.dispatcher.clone(),
            collaborators.policy.clone(),
        );
        let overlay = OverlaySnapshotCoordinator::new(
            config.clone(),
            writer,
            collaborators.instances.clone(),
            collaborators.dispatcher.clone(),
            collaborators.policy.clone(),
        );
        let status = StatusQuery::new(collaborators.instances.clone(), collaborators.discovery);

        Self {
            config,
            instances: collaborators.instances,
            base: Arc::new(base),
            overlay: Arc::new(overlay),
            status: Arc::new(status),
        }
    }

    pub fn config(&self) -> &CloudletConfig {
        &self.config
    }

    pub async fn get_instance(&self, ctx: &RequestContext, instance_uuid: &str) -> Result<Instance> {
        self.instances.get(ctx, instance_uuid).await
    }

    pub async fn create_base(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        base_name: &str,
        extra_properties: Option<&PropertyMap>,
    ) -> Result<BaseImageSet> {
        self.base
            .create_base(ctx, instance, base_name, extra_properties)
            .await
    }

    pub async fn create_overlay_start(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        basevm_name: &str,
        extra_properties: Option<&PropertyMap>,
    ) -> Result<()> {
        self.overlay
            .create_overlay_start(ctx, instance, basevm_name, extra_properties)
            .await
    }

    pub async fn create_overlay_finish(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        overlay_name: &str,
        extra_properties: Option<&PropertyMap>,
    ) -> Result<ImageRecord> {
        self.overlay
            .create_overlay_finish(ctx, instance, overlay_name, extra_properties)
            .await
    }

    pub async fn get_static_status(&self, ctx: &RequestContext) -> Result<StatusReport> {
        self.status.get_static_status(ctx).await
    }

    pub async fn get_status(
        &self,
        ctx: &RequestContext,
        app_request: Option<&serde_json::Value>,
    ) -> Result<StatusReport> {
        self.status.get_status(ctx, app_request).await
    }
}
