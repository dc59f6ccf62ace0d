use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Hex account address (`0x` followed by at least one hex digit), kept in
/// lowercase canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    pub fn parse(value: &str) -> Result<Self, AddressFormatError> {
        validate_address(value)?;
        Ok(Self(value.trim().to_ascii_lowercase()))
    }

    /// The zero address, used when no coinbase has been configured.
    pub fn zero() -> Self {
        Self("0x0".to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0[2..].chars().all(|c| c == '0')
    }

    pub fn to_hex(&self) -> String {
        self.0.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Errors emitted when an address string fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("address must start with `0x`")]
    MissingPrefix,
    #[error("address has no hex digits")]
    Empty,
    #[error("address contains non-hex characters")]
    NonHex,
}

pub fn validate_address(value: &str) -> Result<(), AddressFormatError> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or(AddressFormatError::MissingPrefix)?;

    if digits.is_empty() {
        return Err(AddressFormatError::Empty);
    }

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressFormatError::NonHex);
    }

    Ok(())
}

/// Values handed to every service constructor. Services receive their own
/// copy and never mutate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    pub data_dir: PathBuf,
}

impl ServiceContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}
