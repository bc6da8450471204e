//! Operating-system provisioning configs embedded in a machine's
//! `operatingSystemSpec`.

pub mod flatcar;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tool that applies the userdata on first boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningUtility {
    #[serde(rename = "ignition")]
    Ignition,
    #[serde(rename = "cloud-init")]
    CloudInit,
}

impl ProvisioningUtility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignition => "ignition",
            Self::CloudInit => "cloud-init",
        }
    }
}

impl std::fmt::Display for ProvisioningUtility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
