//! OpenNebula machine provider.

mod client;
mod instance;

pub use client::{Connector, VmController, XmlRpcConnector};
pub use instance::{OpenNebulaInstance, status_from_states};

use std::sync::Arc;

use async_trait::async_trait;
use one_api::{Template, Vm, keys};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::lookup::{CorrelatedLookup, find_by_identity};
use crate::providerconfig::{
    ConfigError, ConfigVarBool, ConfigVarResolver, ConfigVarString, ProviderConfig,
};
use crate::types::{Instance, Machine, MachineSpec, ProviderSpec};
use crate::{CloudProvider, CloudProviderName, Error, Result, TerminalError};

/// Context key carrying the owning machine's UID.
const MACHINE_UID_CONTEXT_KEY: &str = "K8S_MACHINE_UID";
const USER_DATA_CONTEXT_KEY: &str = "USER_DATA";

const ENV_USERNAME: &str = "ONE_USERNAME";
const ENV_PASSWORD: &str = "ONE_PASSWORD";
const ENV_ENDPOINT: &str = "ONE_ENDPOINT";

/// The `cloudProviderSpec` document as written in a machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub username: ConfigVarString,
    #[serde(default)]
    pub password: ConfigVarString,
    #[serde(default)]
    pub endpoint: ConfigVarString,

    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub vcpu: Option<i32>,
    #[serde(default)]
    pub memory: Option<i32>,
    #[serde(default)]
    pub image: ConfigVarString,
    #[serde(default)]
    pub datastore: ConfigVarString,
    #[serde(default)]
    pub disk_size: Option<i32>,
    #[serde(default)]
    pub network: ConfigVarString,
    #[serde(default, rename = "enableVNC")]
    pub enable_vnc: ConfigVarBool,
}

impl RawConfig {
    pub fn from_provider_config(config: &ProviderConfig) -> std::result::Result<Self, ConfigError> {
        Ok(serde_json::from_value(config.cloud_provider_spec.clone())?)
    }
}

/// Provider-wide switches read during validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudProviderSpec {
    #[serde(default, rename = "passValidation")]
    pub pass_validation: bool,
}

/// Fully resolved settings for one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub endpoint: String,

    pub cpu: Option<f64>,
    pub vcpu: Option<i32>,
    pub memory: Option<i32>,
    pub image: String,
    pub datastore: String,
    pub disk_size: Option<i32>,
    pub network: String,
    pub enable_vnc: bool,
}

/// OpenNebula provider. Every operation resolves its config afresh and
/// opens its own controller through the injected [`Connector`].
pub struct OpenNebulaProvider {
    resolver: ConfigVarResolver,
    connector: Arc<dyn Connector>,
}

impl OpenNebulaProvider {
    pub fn new(resolver: ConfigVarResolver) -> Self {
        Self::with_connector(resolver, XmlRpcConnector)
    }

    pub fn with_connector(resolver: ConfigVarResolver, connector: impl Connector) -> Self {
        Self {
            resolver,
            connector: Arc::new(connector),
        }
    }

    /// Resolve the machine's provider spec. Credentials fall back to
    /// `ONE_USERNAME`, `ONE_PASSWORD` and `ONE_ENDPOINT`.
    pub fn get_config(
        &self,
        spec: &ProviderSpec,
    ) -> std::result::Result<(Config, ProviderConfig), ConfigError> {
        let pconfig = ProviderConfig::from_provider_spec(spec)?;
        let raw = RawConfig::from_provider_config(&pconfig)?;
        let r = &self.resolver;

        let config = Config {
            username: r
                .get_string_value_or_env(&raw.username, ENV_USERNAME)
                .map_err(|e| ConfigError::field("username", e))?,
            password: r
                .get_string_value_or_env(&raw.password, ENV_PASSWORD)
                .map_err(|e| ConfigError::field("password", e))?,
            endpoint: r
                .get_string_value_or_env(&raw.endpoint, ENV_ENDPOINT)
                .map_err(|e| ConfigError::field("endpoint", e))?,
            cpu: raw.cpu,
            vcpu: raw.vcpu,
            memory: raw.memory,
            image: r.get_string_value(&raw.image),
            datastore: r.get_string_value(&raw.datastore),
            disk_size: raw.disk_size,
            network: r.get_string_value(&raw.network),
            enable_vnc: r.get_bool_value(&raw.enable_vnc).0,
        };

        Ok((config, pconfig))
    }

    fn resolve(&self, spec: &ProviderSpec) -> Result<Config> {
        self.get_config(spec).map(|(config, _)| config).map_err(|e| {
            TerminalError::invalid_configuration(format!(
                "Failed to parse MachineSpec, due to {e}"
            ))
            .into()
        })
    }

    async fn find_vm(&self, controller: &dyn VmController, machine: &Machine) -> Result<Option<Vm>> {
        find_by_identity(&VmLookup { controller }, machine.spec.name(), machine.uid()).await
    }
}

/// Build the allocation template for a machine.
fn build_template(
    machine: &Machine,
    config: &Config,
    userdata: &str,
) -> std::result::Result<Template, ConfigError> {
    let cpu = config.cpu.ok_or(ConfigError::Missing("cpu"))?;
    let memory = config.memory.ok_or(ConfigError::Missing("memory"))?;
    let vcpu = config.vcpu.ok_or(ConfigError::Missing("vcpu"))?;

    let mut tpl = Template::new();
    tpl.add(keys::NAME, machine.spec.name());
    tpl.cpu(cpu).memory(memory).vcpu(vcpu);

    let disk = tpl.add_disk();
    disk.add(keys::IMAGE, &config.image)
        .add(keys::DATASTORE, &config.datastore)
        .add(keys::DEV_PREFIX, "vd");
    if let Some(size) = config.disk_size {
        disk.add(keys::SIZE, size);
    }

    tpl.add_nic()
        .add(keys::NETWORK, &config.network)
        .add(keys::MODEL, "virtio");

    if config.enable_vnc {
        tpl.add_graphics(keys::TYPE, "VNC");
        tpl.add_graphics(keys::LISTEN, "0.0.0.0");
    }

    tpl.add_ctx(keys::NETWORK, "YES")
        .add_ctx(keys::SSH_PUBLIC_KEY, "$USER[SSH_PUBLIC_KEY]")
        .add_ctx(MACHINE_UID_CONTEXT_KEY, machine.uid())
        .add_ctx(USER_DATA_CONTEXT_KEY, userdata);

    Ok(tpl)
}

/// Name-then-UID lookup over a VM controller. Pool entries carry no
/// `CONTEXT`, so every same-named VM is fetched individually.
struct VmLookup<'a> {
    controller: &'a dyn VmController,
}

#[async_trait]
impl<'a> CorrelatedLookup for VmLookup<'a> {
    type Id = i32;
    type Handle = Vm;

    async fn candidates(&self, name: &str) -> Result<Vec<i32>> {
        let pool = self.controller.list().await.map_err(|e| {
            TerminalError::invalid_configuration(format!(
                "failed to list virtual machines, due to {e}"
            ))
        })?;

        Ok(pool
            .vms
            .into_iter()
            .filter(|vm| vm.name == name)
            .map(|vm| vm.id)
            .collect())
    }

    async fn confirm(&self, id: &i32, uid: &str) -> Result<Option<Vm>> {
        let vm = self.controller.info(*id).await.map_err(|e| {
            TerminalError::invalid_configuration(format!(
                "failed to get info for VM {id}, due to {e}"
            ))
        })?;

        let matches = match vm.template.context(MACHINE_UID_CONTEXT_KEY) {
            Some(found) => found == uid,
            None => {
                debug!(vm_id = *id, "opennebula: vm has no {MACHINE_UID_CONTEXT_KEY}, skipping");
                false
            }
        };

        Ok(matches.then_some(vm))
    }
}

#[async_trait]
impl CloudProvider for OpenNebulaProvider {
    async fn validate(&self, spec: &MachineSpec) -> Result<()> {
        let (_, pconfig) = self
            .get_config(&spec.provider_spec)
            .map_err(ConfigError::parse)?;

        let cloud_spec: CloudProviderSpec =
            serde_json::from_value(pconfig.cloud_provider_spec).map_err(ConfigError::from)?;
        debug!(
            pass_validation = cloud_spec.pass_validation,
            "opennebula: machine spec validated"
        );
        Ok(())
    }

    async fn get(&self, machine: &Machine) -> Result<Box<dyn Instance>> {
        let config = self.resolve(&machine.spec.provider_spec)?;
        let controller = self.connector.connect(&config);

        match self.find_vm(controller.as_ref(), machine).await? {
            Some(vm) => Ok(Box::new(OpenNebulaInstance::new(vm))),
            None => Err(Error::InstanceNotFound),
        }
    }

    async fn create(&self, machine: &Machine, userdata: &str) -> Result<Box<dyn Instance>> {
        let config = self.resolve(&machine.spec.provider_spec)?;
        let template = build_template(machine, &config, userdata).map_err(|e| {
            TerminalError::invalid_configuration(format!(
                "Failed to parse MachineSpec, due to {e}"
            ))
        })?;

        let controller = self.connector.connect(&config);
        let vm_id = controller.allocate(&template).await?;
        let vm = controller.info(vm_id).await?;

        info!(vm_id, machine = machine.spec.name(), "opennebula: vm created");
        Ok(Box::new(OpenNebulaInstance::new(vm)))
    }

    async fn cleanup(&self, machine: &Machine) -> Result<bool> {
        let config = self.resolve(&machine.spec.provider_spec)?;
        let controller = self.connector.connect(&config);

        let Some(vm) = self.find_vm(controller.as_ref(), machine).await? else {
            debug!(machine = machine.spec.name(), "opennebula: no vm left to delete");
            return Ok(true);
        };

        if let Err(e) = controller.terminate_hard(vm.id).await {
            // The platform reports vanished VMs as e.g.
            // "OpenNebula error [NO_EXISTS]: [one.vm.action] Error getting virtual machine [42]."
            if e.to_string().contains("NO_EXISTS") {
                warn!(vm_id = vm.id, "opennebula: vm already deleted");
                return Ok(true);
            }
            return Err(TerminalError::invalid_configuration(format!(
                "failed to delete virtual machine, due to {e}"
            ))
            .into());
        }

        info!(vm_id = vm.id, machine = machine.spec.name(), "opennebula: vm terminated");
        Ok(true)
    }

    fn name(&self) -> CloudProviderName {
        CloudProviderName::Opennebula
    }
}
