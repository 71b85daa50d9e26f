use cloudlet_common::{ComputeMessage, Flavor, Instance, SystemMetadata, VmState};
use cloudlet_gateway::{cloudlet_routes, AppState};
use cloudlet_orchestrator::memory::{
    InMemoryImageCatalog, InMemoryInstanceStore, StaticNetworkTopology,
};
use cloudlet_orchestrator::{ChannelDispatcher, CloudletApi, CloudletConfig, Collaborators};
use color_eyre::eyre;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cloudlet=debug".into()),
        )
        .init();

    info!("Starting cloudlet service...");

    let config = CloudletConfig::from_env()?;
    let store = Arc::new(InMemoryInstanceStore::new());

    // Development instance so the action endpoints have something to act on
    if let Ok(uuid) = std::env::var("CLOUDLET_DEV_INSTANCE") {
        info!("Seeding development instance {}", uuid);
        store.insert(dev_instance(uuid), SystemMetadata::new()).await;
    }

    let (dispatcher, mut receiver) = ChannelDispatcher::channel(config.rpc_version);
    let collaborators = Collaborators::new(
        Arc::new(InMemoryImageCatalog::new()),
        store,
        Arc::new(StaticNetworkTopology::new()),
        Arc::new(dispatcher),
    );

    // Stand-in for the compute node consumer
    tokio::spawn(async move {
        while let Some(cast) = receiver.recv().await {
            match &cast.message.message {
                ComputeMessage::CloudletCreateBase { vm_name, .. } => {
                    info!(topic = %cast.topic, version = %cast.message.version, %vm_name, "Received base creation cast");
                }
                ComputeMessage::CloudletOverlayFinish { overlay_name, .. } => {
                    info!(topic = %cast.topic, version = %cast.message.version, %overlay_name, "Received overlay finish cast");
                }
            }
        }
        info!("Compute queue closed");
    });

    let api = CloudletApi::new(config, collaborators);
    let app = cloudlet_routes(Arc::new(AppState { api }));

    let host = std::env::var("CLOUDLET_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("CLOUDLET_API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8774);
    let addr = format!("{}:{}", host, port);
    info!("Cloudlet API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn dev_instance(uuid: String) -> Instance {
    Instance {
        uuid,
        display_name: Some("dev".to_string()),
        vm_state: VmState::Active,
        task_state: None,
        host: Some("localhost".to_string()),
        image_ref: None,
        flavor: Flavor {
            memory_mb: 2048,
            root_gb: 20,
        },
    }
}
