// ABOUTME: Validated machine names for the fleet inventory.
// ABOUTME: Names are RFC 1123 labels so they work as hostnames and log prefixes.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MachineNameError {
    #[error("machine name cannot be empty")]
    Empty,

    #[error("machine name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("machine name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("machine name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("invalid character in machine name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineName(String);

impl MachineName {
    pub fn new(value: &str) -> Result<Self, MachineNameError> {
        if value.is_empty() {
            return Err(MachineNameError::Empty);
        }
        if value.len() > 63 {
            return Err(MachineNameError::TooLong);
        }
        if value.starts_with('-') {
            return Err(MachineNameError::StartsWithHyphen);
        }
        if value.ends_with('-') {
            return Err(MachineNameError::EndsWithHyphen);
        }
        if let Some(c) = value.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(MachineNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MachineName {
    type Err = MachineNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for MachineName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MachineName::new(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for MachineName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
