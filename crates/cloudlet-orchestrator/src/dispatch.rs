//! Fire-and-forget delivery of compute-node instructions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudlet_common::{
    CloudletError, DispatchGateway, Instance, RequestContext, Result, RpcVersion,
    VersionedMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Topic of the compute node that owns `instance`.
pub fn compute_topic(base_topic: &str, instance: &Instance) -> Result<String> {
    match instance.host.as_deref() {
        Some(host) if !host.is_empty() => Ok(format!("{}.{}", base_topic, host)),
        _ => Err(CloudletError::Dispatch(format!(
            "Unable to find host for Instance {}",
            instance.uuid
        ))),
    }
}

/// A cast as it sits in the compute queue.
#[derive(Debug, Clone)]
pub struct CastEnvelope {
    pub topic: String,
    pub request_id: String,
    pub user_id: String,
    pub message: VersionedMessage,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue-backed dispatcher. Enqueueing never waits on the consumer.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<CastEnvelope>,
    accepted: RpcVersion,
}

impl ChannelDispatcher {
    /// Creates a dispatcher whose recipient accepts protocol versions
    /// compatible with `accepted`, and the receiving end of its queue.
    pub fn channel(accepted: RpcVersion) -> (Self, DispatchReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, accepted }, DispatchReceiver { rx })
    }
}

#[async_trait]
impl DispatchGateway for ChannelDispatcher {
    async fn cast(
        &self,
        ctx: &RequestContext,
        topic: &str,
        message: VersionedMessage,
    ) -> Result<()> {
        if !self.accepted.can_accept(&message.version) {
            warn!(%topic, version = %message.version, accepted = %self.accepted, "Rejecting incompatible cast");
            return Err(CloudletError::Dispatch(format!(
                "Recipient accepts {} but message is version {}",
                self.accepted, message.version
            )));
        }

        debug!(%topic, method = message.message.method(), version = %message.version, "Enqueueing cast");
        let envelope = CastEnvelope {
            topic: topic.to_string(),
            request_id: ctx.request_id.clone(),
            user_id: ctx.user_id.clone(),
            message,
            enqueued_at: Utc::now(),
        };
        self.tx
            .send(envelope)
            .map_err(|_| CloudletError::Dispatch(format!("Queue for {} is closed", topic)))
    }
}

#[derive(Debug)]
pub struct DispatchReceiver {
    rx: mpsc::UnboundedReceiver<CastEnvelope>,
}

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<CastEnvelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CastEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued, oldest first.
    pub fn drain(&mut self) -> Vec<CastEnvelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
