pub mod lookup;
pub mod opennebula;
pub mod providerconfig;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use providerconfig::{ConfigError, ConfigVarResolver, ProviderConfig};
use types::{CloudConfig, Instance, Machine, MachineSpec};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Raw platform failure. The caller may retry.
    #[error("opennebula api error: {0}")]
    OpenNebula(#[from] one_api::Error),

    /// The machine can not be reconciled as specified. The caller must not retry.
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    /// No instance exists for the machine. Not a failure by itself.
    #[error("instance not found")]
    InstanceNotFound,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(CloudProviderName),
}

impl Error {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Terminal(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::InstanceNotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reason codes reported on a machine's status for terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineErrorReason {
    InvalidConfiguration,
    UnsupportedChange,
    Update,
    Create,
    Delete,
    InsufficientResources,
}

impl MachineErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::UnsupportedChange => "UnsupportedChange",
            Self::Update => "UpdateError",
            Self::Create => "CreateError",
            Self::Delete => "DeleteError",
            Self::InsufficientResources => "InsufficientResources",
        }
    }
}

impl fmt::Display for MachineErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error the controller surfaces on the machine and does not retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("an error of type {reason} occurred: {message}")]
pub struct TerminalError {
    pub reason: MachineErrorReason,
    pub message: String,
}

impl TerminalError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self {
            reason: MachineErrorReason::InvalidConfiguration,
            message: message.into(),
        }
    }
}

/// Known cloud provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProviderName {
    Alibaba,
    Anexia,
    Aws,
    Azure,
    Baremetal,
    Digitalocean,
    EquinixMetal,
    External,
    Fake,
    Gce,
    Hetzner,
    Kubevirt,
    Linode,
    Nutanix,
    Opennebula,
    Openstack,
    Packet,
    Scaleway,
    #[serde(rename = "vmware-cloud-director")]
    VmwareCloudDirector,
    Vsphere,
}

impl CloudProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alibaba => "alibaba",
            Self::Anexia => "anexia",
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Baremetal => "baremetal",
            Self::Digitalocean => "digitalocean",
            Self::EquinixMetal => "equinixmetal",
            Self::External => "external",
            Self::Fake => "fake",
            Self::Gce => "gce",
            Self::Hetzner => "hetzner",
            Self::Kubevirt => "kubevirt",
            Self::Linode => "linode",
            Self::Nutanix => "nutanix",
            Self::Opennebula => "opennebula",
            Self::Openstack => "openstack",
            Self::Packet => "packet",
            Self::Scaleway => "scaleway",
            Self::VmwareCloudDirector => "vmware-cloud-director",
            Self::Vsphere => "vsphere",
        }
    }
}

impl fmt::Display for CloudProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProviderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "alibaba" => Ok(Self::Alibaba),
            "anexia" => Ok(Self::Anexia),
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "baremetal" => Ok(Self::Baremetal),
            "digitalocean" => Ok(Self::Digitalocean),
            "equinixmetal" => Ok(Self::EquinixMetal),
            "external" => Ok(Self::External),
            "fake" => Ok(Self::Fake),
            "gce" => Ok(Self::Gce),
            "hetzner" => Ok(Self::Hetzner),
            "kubevirt" => Ok(Self::Kubevirt),
            "linode" => Ok(Self::Linode),
            "nutanix" => Ok(Self::Nutanix),
            "opennebula" => Ok(Self::Opennebula),
            "openstack" => Ok(Self::Openstack),
            "packet" => Ok(Self::Packet),
            "scaleway" => Ok(Self::Scaleway),
            "vmware-cloud-director" => Ok(Self::VmwareCloudDirector),
            "vsphere" => Ok(Self::Vsphere),
            other => Err(Error::UnknownProvider(other.to_string())),
        }
    }
}

/// Backend-specific machine lifecycle operations.
///
/// The controller calls `validate`, then `create` once, polls with `get`,
/// and calls `cleanup` until it reports completion when the machine is
/// deleted. Implementations hold no state between calls beyond injected
/// dependencies.
#[async_trait]
pub trait CloudProvider: Send + Sync + 'static {
    /// Fill in provider defaults on a machine spec before validation.
    fn add_defaults(&self, spec: MachineSpec) -> Result<MachineSpec> {
        Ok(spec)
    }

    /// Check that the machine spec can be provisioned.
    async fn validate(&self, spec: &MachineSpec) -> Result<()>;

    /// Look up the instance belonging to the machine.
    ///
    /// Returns [`Error::InstanceNotFound`] when there is none.
    async fn get(&self, machine: &Machine) -> Result<Box<dyn Instance>>;

    /// Cloud config handed to the kubelet, if the provider needs one.
    fn get_cloud_config(&self, _spec: &MachineSpec) -> Result<CloudConfig> {
        Ok(CloudConfig::default())
    }

    /// Create the instance for the machine, booting it with `userdata`.
    async fn create(&self, machine: &Machine, userdata: &str) -> Result<Box<dyn Instance>>;

    /// Delete the machine's instance. `Ok(true)` means deletion is complete.
    async fn cleanup(&self, machine: &Machine) -> Result<bool>;

    /// Re-tag the machine's instance with a new machine UID.
    async fn migrate_uid(&self, _machine: &Machine, _new_uid: &str) -> Result<()> {
        Ok(())
    }

    /// Extra labels for the machine's metrics series.
    fn machine_metrics_labels(&self, _machine: &Machine) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    /// Publish provider-specific metrics for the given machines.
    fn set_metrics_for_machines(&self, _machines: &[Machine]) -> Result<()> {
        Ok(())
    }

    /// Provider identifier.
    fn name(&self) -> CloudProviderName;
}

/// Registry of all configured cloud providers.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<CloudProviderName, Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    /// Look up a provider by name.
    pub fn get(&self, name: CloudProviderName) -> Option<&Arc<dyn CloudProvider>> {
        self.providers.get(&name)
    }

    /// Resolve the provider a machine spec asks for through its provider config.
    pub fn for_spec(&self, spec: &MachineSpec) -> Result<&Arc<dyn CloudProvider>> {
        let config = ProviderConfig::from_provider_spec(&spec.provider_spec)?;
        self.get(config.cloud_provider)
            .ok_or(Error::ProviderNotConfigured(config.cloud_provider))
    }

    /// List the names of all available providers.
    pub fn available(&self) -> Vec<CloudProviderName> {
        self.providers.keys().copied().collect()
    }

    /// Returns `true` if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build all providers, sharing one config variable resolver.
pub fn build_providers(resolver: ConfigVarResolver) -> ProviderRegistry {
    let mut providers: HashMap<CloudProviderName, Arc<dyn CloudProvider>> = HashMap::new();

    providers.insert(
        CloudProviderName::Opennebula,
        Arc::new(opennebula::OpenNebulaProvider::new(resolver)),
    );
    tracing::info!("registered OpenNebula machine provider");

    ProviderRegistry { providers }
}
