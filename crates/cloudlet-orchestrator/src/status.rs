//! Resource status reads backed by the optional discovery collector

use cloudlet_common::{DiscoveryCollector, InstanceStore, PropertyMap, RequestContext, Result};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DISCOVERY_UNAVAILABLE: &str = "Cloudlet Discovery is not available";

#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Available(PropertyMap),
    /// The collector is not installed or not reachable.
    Unavailable,
}

impl StatusReport {
    pub fn is_available(&self) -> bool {
        matches!(self, StatusReport::Available(_))
    }

    pub fn stats(&self) -> Option<&PropertyMap> {
        match self {
            StatusReport::Available(stats) => Some(stats),
            StatusReport::Unavailable => None,
        }
    }
}

// Unavailable renders as a one-element set: ["Cloudlet Discovery is not available"]
impl Serialize for StatusReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            StatusReport::Available(stats) => stats.serialize(serializer),
            StatusReport::Unavailable => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(DISCOVERY_UNAVAILABLE)?;
                seq.end()
            }
        }
    }
}

pub struct StatusQuery {
    instances: Arc<dyn InstanceStore>,
    collector: Option<Arc<dyn DiscoveryCollector>>,
}

impl StatusQuery {
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        collector: Option<Arc<dyn DiscoveryCollector>>,
    ) -> Self {
        Self {
            instances,
            collector,
        }
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_static_status(&self, ctx: &RequestContext) -> Result<StatusReport> {
        let Some(collector) = &self.collector else {
            debug!("No discovery collector configured");
            return Ok(StatusReport::Unavailable);
        };
        let node_stats = self.instances.compute_node_statistics(ctx).await?;
        Ok(absorb(collector.static_resource(&node_stats).await)?
            .map_or(StatusReport::Unavailable, StatusReport::Available))
    }

    /// Static resources overlaid with point-in-time metrics.
    #[instrument(skip(self, ctx, app_request))]
    pub async fn get_status(
        &self,
        ctx: &RequestContext,
        app_request: Option<&serde_json::Value>,
    ) -> Result<StatusReport> {
        let Some(collector) = &self.collector else {
            debug!("No discovery collector configured");
            return Ok(StatusReport::Unavailable);
        };
        if let Some(request) = app_request {
            debug!(%request, "Status requested for application");
        }
        let node_stats = self.instances.compute_node_statistics(ctx).await?;

        let Some(mut stats) = absorb(collector.static_resource(&node_stats).await)? else {
            return Ok(StatusReport::Unavailable);
        };
        let Some(dynamic) = absorb(collector.dynamic_resource(&node_stats).await)? else {
            return Ok(StatusReport::Unavailable);
        };
        stats.extend(dynamic);
        Ok(StatusReport::Available(stats))
    }
}

/// Maps collector unavailability to `None`; other failures propagate.
fn absorb(result: Result<PropertyMap>) -> Result<Option<PropertyMap>> {
    match result {
        Ok(stats) => Ok(Some(stats)),
        Err(err) if err.is_unavailable() => {
            warn!(error = %err, "Discovery collector unavailable");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
