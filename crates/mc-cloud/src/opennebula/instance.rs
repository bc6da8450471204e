use std::collections::HashMap;

use one_api::{LcmState, Nic, Vm, VmState};

use crate::types::{Instance, InstanceStatus, NodeAddressType};

const PROVIDER_ID_SCHEME: &str = "opennebula";

#[derive(Debug, Clone)]
pub struct OpenNebulaInstance {
    vm: Vm,
}

impl OpenNebulaInstance {
    pub fn new(vm: Vm) -> Self {
        Self { vm }
    }

    /// IPs of the VM's NICs, all reported as external.
    ///
    /// Not part of [`Instance::addresses`], which stays empty for this
    /// provider until its consumers are confirmed to expect NIC addresses.
    pub fn nic_addresses(&self) -> HashMap<String, NodeAddressType> {
        self.vm
            .template
            .nics
            .iter()
            .filter_map(Nic::ip)
            .map(|ip| (ip.to_string(), NodeAddressType::ExternalIP))
            .collect()
    }
}

impl Instance for OpenNebulaInstance {
    fn name(&self) -> &str {
        &self.vm.name
    }

    fn id(&self) -> String {
        self.vm.id.to_string()
    }

    fn provider_id(&self) -> String {
        format!("{PROVIDER_ID_SCHEME}://{}", self.vm.id)
    }

    fn addresses(&self) -> HashMap<String, NodeAddressType> {
        HashMap::new()
    }

    fn status(&self) -> InstanceStatus {
        let (state, lcm_state) = self.vm.state();
        status_from_states(state, lcm_state)
    }
}

/// Map the general and life-cycle-manager states onto a coarse status.
/// The LCM state is only consulted while the VM is active.
pub fn status_from_states(state: VmState, lcm_state: LcmState) -> InstanceStatus {
    match state {
        VmState::Init | VmState::Pending | VmState::Hold => InstanceStatus::Creating,
        VmState::Active => match lcm_state {
            LcmState::LcmInit | LcmState::Prolog | LcmState::Boot => InstanceStatus::Creating,
            LcmState::Epilog => InstanceStatus::Deleting,
            _ => InstanceStatus::Running,
        },
        VmState::Done => InstanceStatus::Deleted,
        _ => InstanceStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use one_api::VmTemplate;

    fn vm(state: VmState, lcm_state: LcmState) -> Vm {
        Vm {
            id: 118,
            name: "worker-0".into(),
            state,
            lcm_state,
            template: VmTemplate::default(),
        }
    }

    #[test]
    fn status_table() {
        use InstanceStatus::*;

        let cases = [
            (VmState::Init, LcmState::LcmInit, Creating),
            (VmState::Pending, LcmState::LcmInit, Creating),
            (VmState::Hold, LcmState::LcmInit, Creating),
            (VmState::Active, LcmState::LcmInit, Creating),
            (VmState::Active, LcmState::Prolog, Creating),
            (VmState::Active, LcmState::Boot, Creating),
            (VmState::Active, LcmState::Epilog, Deleting),
            (VmState::Active, LcmState::Running, Running),
            (VmState::Active, LcmState::Hotplug, Running),
            (VmState::Active, LcmState::Other(77), Running),
            (VmState::Done, LcmState::LcmInit, Deleted),
            (VmState::Poweroff, LcmState::LcmInit, Unknown),
            (VmState::Stopped, LcmState::LcmInit, Unknown),
            (VmState::Other(99), LcmState::Running, Unknown),
        ];

        for (state, lcm_state, expected) in cases {
            assert_eq!(
                status_from_states(state, lcm_state),
                expected,
                "{state:?}/{lcm_state:?}"
            );
        }
    }

    #[test]
    fn lcm_state_is_ignored_outside_active() {
        assert_eq!(
            status_from_states(VmState::Pending, LcmState::Epilog),
            InstanceStatus::Creating
        );
        assert_eq!(
            status_from_states(VmState::Done, LcmState::Running),
            InstanceStatus::Deleted
        );
    }

    #[test]
    fn identity_accessors() {
        let instance = OpenNebulaInstance::new(vm(VmState::Active, LcmState::Running));
        assert_eq!(instance.name(), "worker-0");
        assert_eq!(instance.id(), "118");
        assert_eq!(instance.provider_id(), "opennebula://118");
        assert_eq!(instance.status(), InstanceStatus::Running);
    }

    #[test]
    fn addresses_stay_empty_while_nics_have_ips() {
        let mut v = vm(VmState::Active, LcmState::Running);
        v.template.nics = vec![
            Nic {
                attributes: HashMap::from([("IP".to_string(), "10.0.0.5".to_string())]),
            },
            Nic::default(),
        ];
        let instance = OpenNebulaInstance::new(v);

        assert!(instance.addresses().is_empty());
        assert_eq!(
            instance.nic_addresses(),
            HashMap::from([("10.0.0.5".to_string(), NodeAddressType::ExternalIP)])
        );
    }
}
