use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ── Machine resource ─────────────────────────────────────────────────

/// Identity metadata of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Server-assigned unique identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

/// Declarative desired state of one compute instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: MachineSpec,
}

impl Machine {
    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Metadata for the node; its name is the instance name.
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub provider_spec: ProviderSpec,
}

impl MachineSpec {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Opaque provider-specific configuration embedded in a machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Cloud config for the kubelet and the provider name to pass with it.
/// Both empty when the provider needs none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudConfig {
    pub config: String,
    pub name: String,
}

// ── Instances ────────────────────────────────────────────────────────

/// Coarse lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    Creating,
    Running,
    Deleting,
    Deleted,
    Unknown,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        })
    }
}

/// Kind of a node address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeAddressType {
    Hostname,
    ExternalIP,
    InternalIP,
    ExternalDNS,
    InternalDNS,
}

/// Provider-side view of a machine's instance.
pub trait Instance: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn id(&self) -> String;

    /// `<provider>://<id>`, recorded on the node object.
    fn provider_id(&self) -> String;

    fn addresses(&self) -> HashMap<String, NodeAddressType>;

    fn status(&self) -> InstanceStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_machine_manifest() {
        let machine: Machine = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "worker-0", "namespace": "kube-system", "uid": "c0ffee" },
            "spec": {
                "metadata": { "name": "worker-0-node" },
                "providerSpec": { "value": { "cloudProvider": "opennebula" } }
            }
        }))
        .unwrap();

        assert_eq!(machine.uid(), "c0ffee");
        assert_eq!(machine.spec.name(), "worker-0-node");
        assert!(machine.spec.provider_spec.value.is_some());
    }

    #[test]
    fn provider_spec_value_may_be_absent() {
        let machine: Machine =
            serde_json::from_value(serde_json::json!({ "spec": { "providerSpec": {} } })).unwrap();
        assert!(machine.spec.provider_spec.value.is_none());
    }
}
