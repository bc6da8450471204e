//! Machine manifests as stored on disk (YAML or JSON).

use std::path::Path;

use mc_cloud::types::Machine;

use crate::error::{Error, Result, read};

pub fn load_machine(path: &Path) -> Result<Machine> {
    let raw = read(path)?;
    parse_machine(&raw).map_err(|source| Error::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a machine. The node name defaults to the machine's own name.
pub fn parse_machine(raw: &[u8]) -> std::result::Result<Machine, serde_yaml::Error> {
    let mut machine: Machine = serde_yaml::from_slice(raw)?;
    if machine.spec.metadata.name.is_empty() {
        machine.spec.metadata.name = machine.metadata.name.clone();
    }
    Ok(machine)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: cluster.k8s.io/v1alpha1
kind: Machine
metadata:
  name: worker-0
  namespace: kube-system
  uid: 5c2a0f6e-1d2b-4c71-9d8e-3f0c9a6b7e21
spec:
  providerSpec:
    value:
      cloudProvider: opennebula
      cloudProviderSpec:
        endpoint: http://one.example.com:2633/RPC2
        cpu: 1
        vcpu: 2
        memory: 4096
        image: { value: flatcar-stable }
        enableVNC: true
      operatingSystem: flatcar
      operatingSystemSpec:
        disableAutoUpdate: true
"#;

    #[test]
    fn parses_yaml_manifest() {
        let machine = parse_machine(MANIFEST.as_bytes()).unwrap();
        assert_eq!(machine.uid(), "5c2a0f6e-1d2b-4c71-9d8e-3f0c9a6b7e21");
        assert_eq!(machine.metadata.namespace.as_deref(), Some("kube-system"));
        assert_eq!(machine.spec.name(), "worker-0");

        let value = machine.spec.provider_spec.value.unwrap();
        assert_eq!(value["cloudProvider"], "opennebula");
        assert_eq!(value["cloudProviderSpec"]["image"]["value"], "flatcar-stable");
    }

    #[test]
    fn explicit_node_name_is_kept() {
        let raw = br#"{"metadata":{"name":"m"},"spec":{"metadata":{"name":"node-a"}}}"#;
        assert_eq!(parse_machine(raw).unwrap().spec.name(), "node-a");
    }

    #[test]
    fn rejects_manifest_without_spec() {
        assert!(parse_machine(b"metadata: {name: m}").is_err());
    }
}
