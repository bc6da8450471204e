//! Flatcar Container Linux provisioning config.

use mc_cloud::CloudProviderName;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{ProvisioningUtility, Result};

/// Update and provisioning switches for a Flatcar machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub disable_auto_update: bool,
    #[serde(default, rename = "disableLocksmithD")]
    pub disable_locksmith_d: bool,
    #[serde(default)]
    pub disable_update_engine: bool,

    /// Unset means Ignition.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_utility_as_none"
    )]
    pub provisioning_utility: Option<ProvisioningUtility>,
}

/// `""` is the unset value written by older configs.
fn empty_utility_as_none<'de, D>(de: D) -> std::result::Result<Option<ProvisioningUtility>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(de)?.as_deref() {
        None | Some("") => Ok(None),
        Some("ignition") => Ok(Some(ProvisioningUtility::Ignition)),
        Some("cloud-init") => Ok(Some(ProvisioningUtility::CloudInit)),
        Some(other) => Err(D::Error::unknown_variant(other, &["ignition", "cloud-init"])),
    }
}

impl Config {
    /// The utility actually used at boot.
    pub fn effective_provisioning_utility(&self) -> ProvisioningUtility {
        self.provisioning_utility
            .unwrap_or(ProvisioningUtility::Ignition)
    }

    /// Encode the config as an `operatingSystemSpec` document.
    pub fn spec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// `raw` untouched, or the encoded default config when `raw` is absent or
/// empty. AWS machines default to cloud-init.
pub fn default_config_for_cloud(
    raw: Option<&[u8]>,
    cloud: Option<CloudProviderName>,
) -> Result<Vec<u8>> {
    match raw {
        Some(raw) if !raw.is_empty() => Ok(raw.to_vec()),
        _ => {
            let config = Config {
                provisioning_utility: (cloud == Some(CloudProviderName::Aws))
                    .then_some(ProvisioningUtility::CloudInit),
                ..Config::default()
            };
            config.spec()
        }
    }
}

pub fn default_config(raw: Option<&[u8]>) -> Result<Vec<u8>> {
    default_config_for_cloud(raw, None)
}

/// Decode a Flatcar config, falling back to the cloud's default.
pub fn load_config_for_cloud(raw: Option<&[u8]>, cloud: Option<CloudProviderName>) -> Result<Config> {
    let raw = default_config_for_cloud(raw, cloud)?;
    Ok(serde_json::from_slice(&raw)?)
}

pub fn load_config(raw: Option<&[u8]>) -> Result<Config> {
    load_config_for_cloud(raw, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_defaults_to_cloud_init() {
        let raw = default_config_for_cloud(None, Some(CloudProviderName::Aws)).unwrap();
        assert_eq!(
            String::from_utf8(raw).unwrap(),
            r#"{"disableAutoUpdate":false,"disableLocksmithD":false,"disableUpdateEngine":false,"provisioningUtility":"cloud-init"}"#
        );

        let config = load_config_for_cloud(Some(b""), Some(CloudProviderName::Aws)).unwrap();
        assert_eq!(config.provisioning_utility, Some(ProvisioningUtility::CloudInit));
    }

    #[test]
    fn other_clouds_leave_the_utility_unset() {
        for cloud in [Some(CloudProviderName::Opennebula), Some(CloudProviderName::Azure), None] {
            let config = load_config_for_cloud(None, cloud).unwrap();
            assert_eq!(config, Config::default(), "{cloud:?}");
            assert_eq!(
                config.effective_provisioning_utility(),
                ProvisioningUtility::Ignition
            );
        }

        let raw = default_config(None).unwrap();
        assert!(!String::from_utf8(raw).unwrap().contains("provisioningUtility"));
    }

    #[test]
    fn given_config_is_kept_verbatim() {
        let raw = br#"{"disableAutoUpdate":true,"provisioningUtility":"ignition"}"#;
        assert_eq!(
            default_config_for_cloud(Some(raw), Some(CloudProviderName::Aws)).unwrap(),
            raw.to_vec()
        );

        let config = load_config_for_cloud(Some(raw), Some(CloudProviderName::Aws)).unwrap();
        assert!(config.disable_auto_update);
        assert!(!config.disable_locksmith_d);
        assert_eq!(config.provisioning_utility, Some(ProvisioningUtility::Ignition));
    }

    #[test]
    fn empty_utility_reads_as_unset() {
        let config = load_config(Some(br#"{"disableUpdateEngine":true,"provisioningUtility":""}"#))
            .unwrap();
        assert!(config.disable_update_engine);
        assert_eq!(config.provisioning_utility, None);

        let config = load_config(Some(br#"{"provisioningUtility":null}"#)).unwrap();
        assert_eq!(config.provisioning_utility, None);
    }

    #[test]
    fn spec_decodes_back_to_the_same_config() {
        let config = Config {
            disable_auto_update: true,
            disable_locksmith_d: true,
            disable_update_engine: false,
            provisioning_utility: Some(ProvisioningUtility::CloudInit),
        };
        let raw = config.spec().unwrap();
        assert_eq!(load_config(Some(&raw)).unwrap(), config);
    }

    #[test]
    fn malformed_config_is_reported() {
        let err = load_config(Some(b"{not json")).unwrap_err();
        assert!(matches!(err, crate::Error::Json(_)));

        let err = load_config(Some(br#"{"provisioningUtility":"puppet"}"#)).unwrap_err();
        assert!(err.to_string().contains("unknown variant"), "{err}");
    }
}
