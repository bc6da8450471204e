use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::{Error, Result};

// ── Virtual machines ─────────────────────────────────────────────────

/// A virtual machine as returned by `one.vm.info` or inside `one.vmpool.info`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename = "VM")]
pub struct Vm {
    #[serde(rename = "ID")]
    pub id: i32,
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "STATE")]
    pub state: VmState,
    #[serde(rename = "LCM_STATE", default)]
    pub lcm_state: LcmState,
    #[serde(rename = "TEMPLATE", default)]
    pub template: VmTemplate,
}

impl Vm {
    /// Parse a `<VM>` document.
    pub fn from_xml(body: &str) -> Result<Self> {
        quick_xml::de::from_str(body)
            .map_err(|e| Error::Decode(format!("invalid <VM> document: {e}")))
    }

    /// General state and life-cycle-manager state. The LCM state only
    /// carries meaning while the VM is [`VmState::Active`].
    pub fn state(&self) -> (VmState, LcmState) {
        (self.state, self.lcm_state)
    }
}

/// Result of `one.vmpool.info`. Pool entries carry an abbreviated template;
/// in particular the `CONTEXT` section is not included.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename = "VM_POOL")]
pub struct VmPool {
    #[serde(rename = "VM", default)]
    pub vms: Vec<Vm>,
}

impl VmPool {
    pub fn from_xml(body: &str) -> Result<Self> {
        quick_xml::de::from_str(body)
            .map_err(|e| Error::Decode(format!("invalid <VM_POOL> document: {e}")))
    }
}

/// The parts of a VM template the client reads back.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VmTemplate {
    #[serde(rename = "NIC", default)]
    pub nics: Vec<Nic>,
    #[serde(rename = "CONTEXT", default)]
    pub context: HashMap<String, String>,
}

impl VmTemplate {
    /// Look up a `CONTEXT` entry.
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Nic {
    pub attributes: HashMap<String, String>,
}

impl Nic {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn ip(&self) -> Option<&str> {
        self.get("IP")
    }
}

// ── States ───────────────────────────────────────────────────────────

/// General VM state (`STATE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "i32")]
pub enum VmState {
    Init,
    Pending,
    Hold,
    Active,
    Stopped,
    Suspended,
    Done,
    Poweroff,
    Undeployed,
    Cloning,
    CloningFailure,
    /// A code this client does not know about.
    Other(i32),
}

impl VmState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Init,
            1 => Self::Pending,
            2 => Self::Hold,
            3 => Self::Active,
            4 => Self::Stopped,
            5 => Self::Suspended,
            6 => Self::Done,
            8 => Self::Poweroff,
            9 => Self::Undeployed,
            10 => Self::Cloning,
            11 => Self::CloningFailure,
            other => Self::Other(other),
        }
    }
}

/// Life-cycle-manager state (`LCM_STATE`), nested under [`VmState::Active`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "i32")]
pub enum LcmState {
    #[default]
    LcmInit,
    Prolog,
    Boot,
    Running,
    Migrate,
    SaveStop,
    SaveSuspend,
    SaveMigrate,
    PrologMigrate,
    PrologResume,
    EpilogStop,
    Epilog,
    Shutdown,
    CleanupResubmit,
    Unknown,
    Hotplug,
    ShutdownPoweroff,
    BootUnknown,
    BootPoweroff,
    BootSuspended,
    BootStopped,
    CleanupDelete,
    HotplugSnapshot,
    HotplugNic,
    HotplugSaveas,
    ShutdownUndeploy,
    EpilogUndeploy,
    PrologUndeploy,
    BootUndeploy,
    Other(i32),
}

impl LcmState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::LcmInit,
            1 => Self::Prolog,
            2 => Self::Boot,
            3 => Self::Running,
            4 => Self::Migrate,
            5 => Self::SaveStop,
            6 => Self::SaveSuspend,
            7 => Self::SaveMigrate,
            8 => Self::PrologMigrate,
            9 => Self::PrologResume,
            10 => Self::EpilogStop,
            11 => Self::Epilog,
            12 => Self::Shutdown,
            15 => Self::CleanupResubmit,
            16 => Self::Unknown,
            17 => Self::Hotplug,
            18 => Self::ShutdownPoweroff,
            19 => Self::BootUnknown,
            20 => Self::BootPoweroff,
            21 => Self::BootSuspended,
            22 => Self::BootStopped,
            23 => Self::CleanupDelete,
            24 => Self::HotplugSnapshot,
            25 => Self::HotplugNic,
            26 => Self::HotplugSaveas,
            29 => Self::ShutdownUndeploy,
            30 => Self::EpilogUndeploy,
            31 => Self::PrologUndeploy,
            32 => Self::BootUndeploy,
            other => Self::Other(other),
        }
    }
}

impl From<i32> for VmState {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl From<i32> for LcmState {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

// ── Actions ──────────────────────────────────────────────────────────

/// Operations accepted by `one.vm.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmAction {
    /// Delete the VM immediately, without a guest shutdown.
    TerminateHard,
}

impl VmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TerminateHard => "terminate-hard",
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Response codes ───────────────────────────────────────────────────

/// Error class OpenNebula attaches to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    Authentication,
    Authorization,
    NoExists,
    Action,
    XmlRpcApi,
    Internal,
    Allocate,
    Locked,
    Other(i64),
}

impl ResponseCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0x0000 => Self::Success,
            0x0100 => Self::Authentication,
            0x0200 => Self::Authorization,
            0x0400 => Self::NoExists,
            0x0800 => Self::Action,
            0x1000 => Self::XmlRpcApi,
            0x2000 => Self::Internal,
            0x4000 => Self::Allocate,
            0x8000 => Self::Locked,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Authentication => f.write_str("AUTHENTICATION"),
            Self::Authorization => f.write_str("AUTHORIZATION"),
            Self::NoExists => f.write_str("NO_EXISTS"),
            Self::Action => f.write_str("ACTION"),
            Self::XmlRpcApi => f.write_str("XML_RPC_API"),
            Self::Internal => f.write_str("INTERNAL"),
            Self::Allocate => f.write_str("ALLOCATE"),
            Self::Locked => f.write_str("LOCKED"),
            Self::Other(code) => write!(f, "{code:#06x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_INFO: &str = r#"<VM>
  <ID>118</ID>
  <UID>0</UID>
  <NAME><![CDATA[worker-0]]></NAME>
  <STATE>3</STATE>
  <LCM_STATE>3</LCM_STATE>
  <TEMPLATE>
    <CONTEXT>
      <K8S_MACHINE_UID><![CDATA[6f1c9d0e-1111-4a0b-9c55-000000000001]]></K8S_MACHINE_UID>
      <NETWORK><![CDATA[YES]]></NETWORK>
    </CONTEXT>
    <NIC>
      <IP><![CDATA[192.168.150.10]]></IP>
      <MODEL><![CDATA[virtio]]></MODEL>
    </NIC>
    <NIC>
      <IP><![CDATA[10.10.0.10]]></IP>
    </NIC>
  </TEMPLATE>
  <USER_TEMPLATE>
    <LOGO><![CDATA[images/logos/flatcar.png]]></LOGO>
  </USER_TEMPLATE>
</VM>"#;

    #[test]
    fn parses_vm_info() {
        let vm = Vm::from_xml(VM_INFO).unwrap();

        assert_eq!(vm.id, 118);
        assert_eq!(vm.name, "worker-0");
        assert_eq!(vm.state(), (VmState::Active, LcmState::Running));
        assert_eq!(
            vm.template.context("K8S_MACHINE_UID"),
            Some("6f1c9d0e-1111-4a0b-9c55-000000000001")
        );
        assert_eq!(vm.template.nics.len(), 2);
        assert_eq!(vm.template.nics[0].ip(), Some("192.168.150.10"));
        assert_eq!(vm.template.nics[0].get("MODEL"), Some("virtio"));
        assert_eq!(vm.template.nics[1].ip(), Some("10.10.0.10"));
    }

    #[test]
    fn missing_lcm_state_reads_as_init() {
        let vm = Vm::from_xml("<VM><ID>4</ID><NAME>n</NAME><STATE>1</STATE></VM>").unwrap();
        assert_eq!(vm.state(), (VmState::Pending, LcmState::LcmInit));
        assert_eq!(vm.template, VmTemplate::default());
    }

    #[test]
    fn malformed_documents_are_decode_errors() {
        assert!(matches!(
            Vm::from_xml("<VM><ID>x</ID><STATE>1</STATE></VM>"),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            Vm::from_xml("<VM><NAME>n</NAME></VM>"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn parses_pool_without_context() {
        let pool = VmPool::from_xml(
            "<VM_POOL>\
             <VM><ID>1</ID><NAME>a</NAME><STATE>1</STATE><LCM_STATE>0</LCM_STATE><TEMPLATE/></VM>\
             <VM><ID>2</ID><NAME>b</NAME><STATE>6</STATE><LCM_STATE>0</LCM_STATE></VM>\
             </VM_POOL>",
        )
        .unwrap();

        assert_eq!(pool.vms.len(), 2);
        assert_eq!(pool.vms[0].state, VmState::Pending);
        assert_eq!(pool.vms[1].state, VmState::Done);
        assert!(pool.vms[0].template.context.is_empty());
    }

    #[test]
    fn empty_pool() {
        assert!(VmPool::from_xml("<VM_POOL/>").unwrap().vms.is_empty());
    }

    #[test]
    fn unknown_codes_are_kept() {
        assert_eq!(VmState::from_code(42), VmState::Other(42));
        assert_eq!(LcmState::from_code(99), LcmState::Other(99));
        assert_eq!(ResponseCode::from_code(0x0400).to_string(), "NO_EXISTS");
        assert_eq!(VmAction::TerminateHard.to_string(), "terminate-hard");
    }
}
