#![allow(dead_code)]

use cloudlet_orchestrator::common::{
    DispatchGateway, Flavor, Instance, NetworkInterface, RequestContext, SystemMetadata, VmState,
};
use cloudlet_orchestrator::memory::{
    InMemoryImageCatalog, InMemoryInstanceStore, StaticNetworkTopology,
};
use cloudlet_orchestrator::{
    ChannelDispatcher, CloudletApi, CloudletConfig, Collaborators, DispatchReceiver,
};
use std::sync::Arc;

pub const INSTANCE_UUID: &str = "abc";
pub const HOST: &str = "node-1";

pub fn instance_i1() -> Instance {
    Instance {
        uuid: INSTANCE_UUID.to_string(),
        display_name: Some("i1".to_string()),
        vm_state: VmState::Active,
        task_state: None,
        host: Some(HOST.to_string()),
        image_ref: Some("img-src".to_string()),
        flavor: Flavor {
            memory_mb: 2048,
            root_gb: 20,
        },
    }
}

pub fn interfaces() -> Vec<NetworkInterface> {
    vec![
        NetworkInterface {
            id: "vif-1".to_string(),
            mac_address: "fa:16:3e:00:00:01".to_string(),
        },
        NetworkInterface {
            id: "vif-2".to_string(),
            mac_address: "fa:16:3e:00:00:02".to_string(),
        },
    ]
}

pub fn system_metadata() -> SystemMetadata {
    [
        ("image_base_image_ref", "img-src"),
        ("image_os_type", "linux"),
        ("image_bittorrent", "seed"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn ctx() -> RequestContext {
    RequestContext::new("alice", "demo")
}

pub struct Harness {
    pub api: CloudletApi,
    pub catalog: Arc<InMemoryImageCatalog>,
    pub store: Arc<InMemoryInstanceStore>,
    pub receiver: Option<DispatchReceiver>,
    pub ctx: RequestContext,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(InMemoryImageCatalog::new(), instance_i1(), None).await
    }

    pub async fn with_instance(instance: Instance) -> Self {
        Self::build(InMemoryImageCatalog::new(), instance, None).await
    }

    pub async fn with_catalog(catalog: InMemoryImageCatalog) -> Self {
        Self::build(catalog, instance_i1(), None).await
    }

    pub async fn with_dispatcher(dispatcher: Arc<dyn DispatchGateway>) -> Self {
        Self::build(InMemoryImageCatalog::new(), instance_i1(), Some(dispatcher)).await
    }

    async fn build(
        catalog: InMemoryImageCatalog,
        instance: Instance,
        dispatcher: Option<Arc<dyn DispatchGateway>>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let store = Arc::new(InMemoryInstanceStore::new());
        store.insert(instance.clone(), system_metadata()).await;
        let network = Arc::new(StaticNetworkTopology::new().with_interfaces(&instance.uuid, interfaces()));

        let config = CloudletConfig::default();
        let (dispatcher, receiver) = match dispatcher {
            Some(dispatcher) => (dispatcher, None),
            None => {
                let (channel, receiver) = ChannelDispatcher::channel(config.rpc_version);
                (Arc::new(channel) as Arc<dyn DispatchGateway>, Some(receiver))
            }
        };

        let collaborators = Collaborators::new(catalog.clone(), store.clone(), network, dispatcher);
        Self {
            api: CloudletApi::new(config, collaborators),
            catalog,
            store,
            receiver,
            ctx: ctx(),
        }
    }

    pub async fn instance(&self) -> Instance {
        self.api
            .get_instance(&self.ctx, INSTANCE_UUID)
            .await
            .expect("instance should exist")
    }

    pub fn receiver(&mut self) -> &mut DispatchReceiver {
        self.receiver.as_mut().expect("harness uses the channel dispatcher")
    }
}
