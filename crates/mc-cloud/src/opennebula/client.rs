use std::sync::Arc;

use async_trait::async_trait;
use one_api::{OneClient, Template, Vm, VmAction, VmPool};

use super::Config;

/// The VM operations the provider issues against an OpenNebula front-end.
#[async_trait]
pub trait VmController: Send + Sync {
    /// Submit a template and return the ID the platform assigned.
    async fn allocate(&self, template: &Template) -> one_api::Result<i32>;

    /// Full VM info, including the template `CONTEXT`.
    async fn info(&self, id: i32) -> one_api::Result<Vm>;

    /// All VMs visible to the session; entries lack `CONTEXT`.
    async fn list(&self) -> one_api::Result<VmPool>;

    async fn terminate_hard(&self, id: i32) -> one_api::Result<()>;
}

#[async_trait]
impl VmController for OneClient {
    async fn allocate(&self, template: &Template) -> one_api::Result<i32> {
        self.allocate_vm(&template.to_string(), false).await
    }

    async fn info(&self, id: i32) -> one_api::Result<Vm> {
        self.vm_info(id).await
    }

    async fn list(&self) -> one_api::Result<VmPool> {
        self.vm_pool_info().await
    }

    async fn terminate_hard(&self, id: i32) -> one_api::Result<()> {
        self.vm_action(VmAction::TerminateHard, id).await
    }
}

/// Opens a controller for a resolved config. Called once per provider
/// operation; controllers are not reused across calls.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, config: &Config) -> Arc<dyn VmController>;
}

/// Connects over XML-RPC with the config's credentials.
pub struct XmlRpcConnector;

impl Connector for XmlRpcConnector {
    fn connect(&self, config: &Config) -> Arc<dyn VmController> {
        Arc::new(OneClient::new(
            &config.username,
            &config.password,
            config.endpoint.clone(),
        ))
    }
}
