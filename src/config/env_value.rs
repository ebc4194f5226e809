// ABOUTME: Environment values for remote commands, literal or taken from the local env.
// ABOUTME: References are resolved once when run options are built.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

/// Resolve every entry, keeping key order.
pub fn resolve_env(map: &BTreeMap<String, EnvValue>) -> Result<Vec<(String, String)>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_reference_forms() {
        let map: BTreeMap<String, EnvValue> = serde_yaml::from_str(
            "PLAIN: hello\nFROM_ENV: { env: FLEETRUN_TEST_UNSET_VAR, default: fallback }\n",
        )
        .unwrap();
        let resolved = temp_env::with_var_unset("FLEETRUN_TEST_UNSET_VAR", || resolve_env(&map));
        assert_eq!(
            resolved.unwrap(),
            vec![
                ("FROM_ENV".to_string(), "fallback".to_string()),
                ("PLAIN".to_string(), "hello".to_string()),
            ]
        );
    }

    #[test]
    fn reference_reads_local_environment() {
        let value = EnvValue::FromEnv {
            var: "FLEETRUN_TEST_TOKEN".to_string(),
            default: None,
        };
        let resolved = temp_env::with_var("FLEETRUN_TEST_TOKEN", Some("s3cret"), || value.resolve());
        assert_eq!(resolved.unwrap(), "s3cret");
    }

    #[test]
    fn missing_reference_without_default_fails() {
        let value = EnvValue::FromEnv {
            var: "FLEETRUN_TEST_MISSING".to_string(),
            default: None,
        };
        let err = temp_env::with_var_unset("FLEETRUN_TEST_MISSING", || value.resolve()).unwrap_err();
        assert!(matches!(err, Error::MissingEnvVar(v) if v == "FLEETRUN_TEST_MISSING"));
    }
}
