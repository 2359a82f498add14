//! Service catalog configuration
//!
//! File schema for the service catalog. The mapping is keyed by the service ID
//! as a hexadecimal string:
//!
//! ```yaml
//! uds_services:
//!   "0x22":
//!     name: ReadDataByIdentifier
//!     handler: read_data_by_identifier
//!     allowed_sessions: [1, 2, 3]
//!     length: 3
//!     fields:
//!       - name: identifier
//!         type: u16
//!         description: Data identifier
//! ```
//!
//! Validation happens in [`ServiceCatalog::from_config`], so a malformed entry
//! fails at startup rather than during dispatch.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::ServiceCatalog;
use crate::error::ConfigError;

/// Complete service catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Services keyed by hex service ID ("0x22")
    #[serde(default)]
    pub uds_services: BTreeMap<String, ServiceEntry>,
}

/// One configured service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Display name
    pub name: String,

    /// Handler name, e.g. "read_data_by_identifier"
    pub handler: String,

    /// Session bytes in which the service is legal
    pub allowed_sessions: Vec<u8>,

    /// Minimum request length in bytes, service ID included
    #[serde(default)]
    pub length: u32,

    /// Documented request fields
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
}

/// Documented request field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default)]
    pub description: String,
}

impl CatalogConfig {
    /// Load a catalog configuration, choosing the format by file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate and build the catalog
    pub fn build(&self) -> Result<ServiceCatalog, ConfigError> {
        Ok(ServiceCatalog::from_config(self)?)
    }
}
