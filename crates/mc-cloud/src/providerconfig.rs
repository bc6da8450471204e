//! Generic provider configuration and config variable resolution.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::CloudProviderName;
use crate::types::ProviderSpec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("machine.spec.providerconfig.value is nil")]
    NilValue,

    #[error("failed to decode provider config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no value given and environment variable {env} is not set")]
    Unset { env: &'static str },

    #[error("failed to get the value of \"{field}\" field, error = {source}")]
    Field {
        field: &'static str,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("failed to parse config: {0}")]
    Parse(#[source] Box<ConfigError>),
}

impl ConfigError {
    pub(crate) fn field(field: &'static str, source: ConfigError) -> Self {
        Self::Field {
            field,
            source: Box::new(source),
        }
    }

    pub(crate) fn parse(source: ConfigError) -> Self {
        Self::Parse(Box::new(source))
    }
}

/// The decoded `providerSpec.value` of a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub cloud_provider: CloudProviderName,
    /// Provider-specific document, decoded by the provider itself.
    #[serde(default)]
    pub cloud_provider_spec: serde_json::Value,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system_spec: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_public_keys: Vec<String>,
}

impl ProviderConfig {
    pub fn from_provider_spec(spec: &ProviderSpec) -> Result<Self, ConfigError> {
        let value = spec.value.as_ref().ok_or(ConfigError::NilValue)?;
        Ok(serde_json::from_value(value.clone())?)
    }
}

// ── Config variables ─────────────────────────────────────────────────

/// A string setting given either inline (`"x"`) or as `{ "value": "x" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigVarStringRepr")]
pub struct ConfigVarString {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

impl From<&str> for ConfigVarString {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

/// Only `value` is read. Secret and config-map references are rejected
/// rather than decoded as an empty value.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigVarStringRepr {
    Plain(String),
    Object(ConfigVarObject<String>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigVarObject<T> {
    #[serde(default)]
    value: T,
}

impl From<ConfigVarStringRepr> for ConfigVarString {
    fn from(repr: ConfigVarStringRepr) -> Self {
        match repr {
            ConfigVarStringRepr::Plain(value)
            | ConfigVarStringRepr::Object(ConfigVarObject { value }) => Self { value },
        }
    }
}

/// A boolean setting given either inline (`true`) or as `{ "value": true }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigVarBoolRepr")]
pub struct ConfigVarBool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigVarBoolRepr {
    Plain(bool),
    Object(ConfigVarObject<Option<bool>>),
}

impl From<ConfigVarBoolRepr> for ConfigVarBool {
    fn from(repr: ConfigVarBoolRepr) -> Self {
        match repr {
            ConfigVarBoolRepr::Plain(value) => Self { value: Some(value) },
            ConfigVarBoolRepr::Object(ConfigVarObject { value }) => Self { value },
        }
    }
}

/// Source of environment variables for credential fallbacks.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolves config variables to concrete values.
#[derive(Clone)]
pub struct ConfigVarResolver {
    env: Arc<dyn EnvSource>,
}

impl Default for ConfigVarResolver {
    fn default() -> Self {
        Self::new(ProcessEnv)
    }
}

impl ConfigVarResolver {
    pub fn new(env: impl EnvSource + 'static) -> Self {
        Self { env: Arc::new(env) }
    }

    pub fn get_string_value(&self, var: &ConfigVarString) -> String {
        var.value.clone()
    }

    /// The inline value if set, else the non-empty environment variable `env`.
    pub fn get_string_value_or_env(
        &self,
        var: &ConfigVarString,
        env: &'static str,
    ) -> Result<String, ConfigError> {
        if !var.value.is_empty() {
            return Ok(var.value.clone());
        }

        match self.env.var(env) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::Unset { env }),
        }
    }

    /// The value and whether it was set at all. Unset reads as `false`.
    pub fn get_bool_value(&self, var: &ConfigVarBool) -> (bool, bool) {
        (var.value.unwrap_or(false), var.value.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> ConfigVarResolver {
        ConfigVarResolver::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn config_vars_accept_both_forms() {
        let plain: ConfigVarString = serde_json::from_str(r#""oneadmin""#).unwrap();
        let object: ConfigVarString = serde_json::from_str(r#"{"value":"oneadmin"}"#).unwrap();
        assert_eq!(plain, object);

        let plain: ConfigVarBool = serde_json::from_str("true").unwrap();
        let object: ConfigVarBool = serde_json::from_str(r#"{"value":true}"#).unwrap();
        let unset: ConfigVarBool = serde_json::from_str("{}").unwrap();
        assert_eq!(plain, object);
        assert_eq!(unset.value, None);
    }

    #[test]
    fn references_are_rejected_not_emptied() {
        for raw in [
            r#"{"secretKeyRef":{"name":"one-credentials","key":"password"}}"#,
            r#"{"configMapKeyRef":{"name":"one","key":"image"}}"#,
            r#"{"value":"x","secretKeyRef":{}}"#,
        ] {
            assert!(serde_json::from_str::<ConfigVarString>(raw).is_err(), "{raw}");
        }
        assert!(serde_json::from_str::<ConfigVarBool>(r#"{"secretKeyRef":{}}"#).is_err());
        assert_eq!(
            serde_json::from_str::<ConfigVarString>("{}").unwrap(),
            ConfigVarString::default()
        );
    }

    #[test]
    fn inline_value_wins_over_env() {
        let resolver = env(&[("ONE_USERNAME", "from-env")]);
        let value = resolver
            .get_string_value_or_env(&"inline".into(), "ONE_USERNAME")
            .unwrap();
        assert_eq!(value, "inline");
    }

    #[test]
    fn empty_value_falls_back_to_env() {
        let resolver = env(&[("ONE_USERNAME", "from-env")]);
        let value = resolver
            .get_string_value_or_env(&ConfigVarString::default(), "ONE_USERNAME")
            .unwrap();
        assert_eq!(value, "from-env");
    }

    #[test]
    fn empty_value_and_empty_env_is_an_error() {
        let resolver = env(&[("ONE_PASSWORD", "")]);
        let err = resolver
            .get_string_value_or_env(&ConfigVarString::default(), "ONE_PASSWORD")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Unset { env: "ONE_PASSWORD" }));
    }

    #[test]
    fn process_env_is_consulted() {
        temp_env::with_var("ONE_ENDPOINT", Some("http://one:2633/RPC2"), || {
            let value = ConfigVarResolver::default()
                .get_string_value_or_env(&ConfigVarString::default(), "ONE_ENDPOINT")
                .unwrap();
            assert_eq!(value, "http://one:2633/RPC2");
        });

        temp_env::with_var_unset("ONE_ENDPOINT", || {
            assert!(
                ConfigVarResolver::default()
                    .get_string_value_or_env(&ConfigVarString::default(), "ONE_ENDPOINT")
                    .is_err()
            );
        });
    }

    #[test]
    fn bool_values_report_validity() {
        let resolver = ConfigVarResolver::default();
        assert_eq!(resolver.get_bool_value(&ConfigVarBool::default()), (false, false));
        assert_eq!(
            resolver.get_bool_value(&ConfigVarBool { value: Some(true) }),
            (true, true)
        );
    }

    #[test]
    fn nil_provider_spec_is_fatal() {
        let err = ProviderConfig::from_provider_spec(&ProviderSpec { value: None }).unwrap_err();
        assert_eq!(err.to_string(), "machine.spec.providerconfig.value is nil");
    }
}
