use async_trait::async_trait;
use cloudlet_orchestrator::common::{
    CloudletError, DiscoveryCollector, PropertyMap, RequestContext, Result,
};
use cloudlet_orchestrator::memory::{InMemoryInstanceStore, StaticDiscoveryCollector};
use cloudlet_orchestrator::{StatusQuery, StatusReport, DISCOVERY_UNAVAILABLE};
use serde_json::json;
use std::sync::Arc;

fn map(entries: &[(&str, serde_json::Value)]) -> PropertyMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn node_store() -> Arc<InMemoryInstanceStore> {
    Arc::new(InMemoryInstanceStore::with_node_statistics(map(&[
        ("vcpus", json!(16)),
        ("memory_mb", json!(65536)),
    ])))
}

fn collector() -> Arc<dyn DiscoveryCollector> {
    Arc::new(StaticDiscoveryCollector::new(
        map(&[("machine_arch", json!("x86_64")), ("cpu_clock_mhz", json!(2400))]),
        map(&[("cpu_usage_percent", json!(12.5)), ("mem_free_mb", json!(40000))]),
    ))
}

#[tokio::test]
async fn test_collector_absent_degrades() {
    let status = StatusQuery::new(node_store(), None);
    let ctx = RequestContext::new("alice", "demo");

    let static_report = status.get_static_status(&ctx).await.unwrap();
    let report = status.get_status(&ctx, None).await.unwrap();
    assert_eq!(static_report, StatusReport::Unavailable);
    assert_eq!(report, StatusReport::Unavailable);
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!([DISCOVERY_UNAVAILABLE])
    );
}

#[tokio::test]
async fn test_status_is_superset_of_static() {
    let status = StatusQuery::new(node_store(), Some(collector()));
    let ctx = RequestContext::new("alice", "demo");

    let static_report = status.get_static_status(&ctx).await.unwrap();
    let request = json!({"app_id": "face-recognition"});
    let report = status.get_status(&ctx, Some(&request)).await.unwrap();

    let static_stats = static_report.stats().unwrap();
    let stats = report.stats().unwrap();
    assert!(static_stats.contains_key("vcpus"));
    assert!(static_stats.contains_key("machine_arch"));
    assert!(!static_stats.contains_key("cpu_usage_percent"));
    for key in static_stats.keys() {
        assert!(stats.contains_key(key), "missing {key}");
    }
    assert_eq!(stats["cpu_usage_percent"], json!(12.5));
}

struct Unreachable;

#[async_trait]
impl DiscoveryCollector for Unreachable {
    async fn static_resource(&self, _node_stats: &PropertyMap) -> Result<PropertyMap> {
        Err(CloudletError::CollaboratorUnavailable(
            "resource monitor socket closed".to_string(),
        ))
    }

    async fn dynamic_resource(&self, _node_stats: &PropertyMap) -> Result<PropertyMap> {
        Err(CloudletError::CollaboratorUnavailable(
            "resource monitor socket closed".to_string(),
        ))
    }
}

struct Broken;

#[async_trait]
impl DiscoveryCollector for Broken {
    async fn static_resource(&self, _node_stats: &PropertyMap) -> Result<PropertyMap> {
        Err(CloudletError::Storage("stats table corrupt".to_string()))
    }

    async fn dynamic_resource(&self, _node_stats: &PropertyMap) -> Result<PropertyMap> {
        Ok(PropertyMap::new())
    }
}

#[tokio::test]
async fn test_unreachable_collector_is_absorbed() {
    let collector: Arc<dyn DiscoveryCollector> = Arc::new(Unreachable);
    let status = StatusQuery::new(node_store(), Some(collector));
    let ctx = RequestContext::new("alice", "demo");

    assert!(!status.get_static_status(&ctx).await.unwrap().is_available());
    assert!(!status.get_status(&ctx, None).await.unwrap().is_available());
}

#[tokio::test]
async fn test_other_collector_errors_propagate() {
    let collector: Arc<dyn DiscoveryCollector> = Arc::new(Broken);
    let status = StatusQuery::new(node_store(), Some(collector));
    let ctx = RequestContext::new("alice", "demo");

    assert!(matches!(
        status.get_static_status(&ctx).await,
        Err(CloudletError::Storage(_))
    ));
}
