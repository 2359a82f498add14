//! ECU simulator configuration
//!
//! Describes the factory profile of the simulated ECU (VIN, identifiers,
//! seeded DTCs, memory blocks), the transport it listens on and an optional
//! service catalog file. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! catalog = "config/service_ids.yaml"
//!
//! [identity]
//! vin = "1HGCM82633A123456"
//!
//! [[identity.identifiers]]
//! did = "0xF18C"
//! value = "SN-0001"
//!
//! [[dtcs]]
//! code = "0x001234"
//! status = "active"
//!
//! [[memory]]
//! address = "0x1000"
//! data = "DEADBEEF"
//!
//! [transport]
//! kind = "doip"
//! bind = "0.0.0.0:13400"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uds_core::{CatalogConfig, Dtc, DtcStatus, EcuProfile, ServiceCatalog, DEFAULT_VIN};

/// Failure loading or interpreting the simulator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported configuration format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error("Invalid value for identifier 0x{did:04X}: {reason}")]
    InvalidIdentifier { did: u16, reason: String },

    #[error("DTC 0x{0:X} does not fit in 24 bits")]
    InvalidDtc(u32),

    #[error("Memory block at 0x{address:X}: {reason}")]
    InvalidMemory { address: u32, reason: String },

    #[error(transparent)]
    Catalog(#[from] uds_core::ConfigError),
}

/// Complete simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuConfig {
    /// Service catalog file (YAML or TOML); the standard catalog when absent
    #[serde(default)]
    pub catalog: Option<String>,

    #[serde(default)]
    pub identity: IdentityConfig,

    /// DTCs present in fault memory after start and hard reset
    #[serde(default = "default_dtcs")]
    pub dtcs: Vec<DtcDef>,

    /// Emulated memory blocks
    #[serde(default = "default_memory")]
    pub memory: Vec<MemoryDef>,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for EcuConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            identity: IdentityConfig::default(),
            dtcs: default_dtcs(),
            memory: default_memory(),
            transport: TransportConfig::default(),
        }
    }
}

impl EcuConfig {
    /// Load configuration, choosing the format by file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the factory profile the ECU starts from and returns to on hard reset
    pub fn to_profile(&self) -> Result<EcuProfile, ConfigError> {
        let mut identifiers = BTreeMap::new();
        for def in &self.identity.identifiers {
            identifiers.insert(def.did, def.to_bytes()?);
        }

        let dtcs = self
            .dtcs
            .iter()
            .map(|def| {
                if def.code > 0x00FF_FFFF {
                    return Err(ConfigError::InvalidDtc(def.code));
                }
                Ok(Dtc::new(def.code, def.status.into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut memory = BTreeMap::new();
        for def in &self.memory {
            memory.insert(def.address, def.to_bytes()?);
        }

        Ok(EcuProfile {
            vin: self.identity.vin.as_bytes().to_vec(),
            identifiers,
            dtcs,
            memory,
        })
    }

    /// Build the service catalog, from file if one is configured
    pub fn load_catalog(&self) -> Result<ServiceCatalog, ConfigError> {
        match &self.catalog {
            Some(path) => Ok(CatalogConfig::load(path)?.build()?),
            None => Ok(ServiceCatalog::standard()),
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// VIN and additional identifier values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Vehicle identification number, served on 0xF190
    #[serde(default = "default_vin")]
    pub vin: String,

    #[serde(default = "default_identifiers")]
    pub identifiers: Vec<IdentifierDef>,
}

fn default_vin() -> String {
    String::from_utf8_lossy(DEFAULT_VIN).into_owned()
}

fn default_identifiers() -> Vec<IdentifierDef> {
    vec![
        IdentifierDef {
            did: 0xF123,
            data_type: DataType::Bytes,
            value: "01020304".to_string(),
        },
        IdentifierDef {
            did: 0xF200,
            data_type: DataType::String,
            value: "ECU_Model_1234".to_string(),
        },
    ]
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            vin: default_vin(),
            identifiers: default_identifiers(),
        }
    }
}

/// How an identifier value is written in the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Raw text, stored as its UTF-8 bytes
    #[default]
    String,
    /// Hex string such as "DEADBEEF"
    Bytes,
}

/// One data identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierDef {
    /// Can be hex string "0xF18C" or integer
    #[serde(deserialize_with = "deserialize_hex_u16")]
    pub did: u16,

    #[serde(default)]
    pub data_type: DataType,

    pub value: String,
}

impl IdentifierDef {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        match self.data_type {
            DataType::String => Ok(self.value.as_bytes().to_vec()),
            DataType::Bytes => {
                parse_hex_bytes(&self.value).map_err(|reason| ConfigError::InvalidIdentifier {
                    did: self.did,
                    reason,
                })
            }
        }
    }
}

// =============================================================================
// DTCs
// =============================================================================

/// One seeded DTC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtcDef {
    /// 24-bit DTC number, hex string "0x001234" or integer
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub code: u32,

    #[serde(default)]
    pub status: DtcStatusDef,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcStatusDef {
    #[default]
    Active,
    Pending,
    Inactive,
}

impl From<DtcStatusDef> for DtcStatus {
    fn from(def: DtcStatusDef) -> Self {
        match def {
            DtcStatusDef::Active => DtcStatus::Active,
            DtcStatusDef::Pending => DtcStatus::Pending,
            DtcStatusDef::Inactive => DtcStatus::Inactive,
        }
    }
}

fn default_dtcs() -> Vec<DtcDef> {
    vec![DtcDef {
        code: 0x001234,
        status: DtcStatusDef::Active,
    }]
}

// =============================================================================
// Memory
// =============================================================================

/// One emulated memory block
///
/// Either `data` (hex) or `size` is given; a sized block is filled with an
/// incrementing byte pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDef {
    /// Block address; requests carry 16-bit addresses, so at most 0xFFFF
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub address: u32,

    #[serde(default)]
    pub data: Option<String>,

    #[serde(default)]
    pub size: Option<usize>,
}

impl MemoryDef {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidMemory {
            address: self.address,
            reason,
        };

        if self.address > u32::from(u16::MAX) {
            return Err(invalid("address is not reachable with a 16-bit request".into()));
        }

        match (&self.data, self.size) {
            (Some(data), None) => parse_hex_bytes(data).map_err(invalid),
            (None, Some(size)) => Ok((0..size).map(|i| i as u8).collect()),
            _ => Err(invalid("exactly one of `data` or `size` must be set".into())),
        }
    }
}

fn default_memory() -> Vec<MemoryDef> {
    vec![MemoryDef {
        address: 0x1000,
        data: None,
        size: Some(32),
    }]
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// ISO-TP over SocketCAN
    #[default]
    Isotp,
    /// DoIP over TCP
    Doip,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// CAN interface
    #[serde(default = "default_interface")]
    pub interface: String,

    /// ECU's receive CAN ID (tester sends to this)
    #[serde(default = "default_rx_id")]
    pub rx_id: String,

    /// ECU's transmit CAN ID (ECU sends from this)
    #[serde(default = "default_tx_id")]
    pub tx_id: String,

    /// DoIP listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// DoIP logical address of this ECU
    #[serde(
        default = "default_logical_address",
        deserialize_with = "deserialize_hex_u16"
    )]
    pub logical_address: u16,
}

fn default_interface() -> String {
    "vcan0".to_string()
}

fn default_rx_id() -> String {
    "0x18DA00F1".to_string()
}

fn default_tx_id() -> String {
    "0x18DAF100".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:13400".to_string()
}

fn default_logical_address() -> u16 {
    0x0E80
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            interface: default_interface(),
            rx_id: default_rx_id(),
            tx_id: default_tx_id(),
            bind: default_bind(),
            logical_address: default_logical_address(),
        }
    }
}

// =============================================================================
// Hex Parsing Helpers
// =============================================================================

/// Parse hex string to bytes (supports "DEADBEEF", "0xDEADBEEF" and "DE AD BE EF")
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let s = strip_hex_prefix(s.trim());
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits).map_err(|e| e.to_string())
}

/// Parse a hex number with optional 0x prefix
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    u32::from_str_radix(strip_hex_prefix(s.trim()), 16).map_err(|e| format!("'{}': {}", s, e))
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Hex(String),
    Int(u64),
}

/// Deserialize a hex u16 (supports "0xF190" or 61840)
fn deserialize_hex_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = deserialize_hex_u32(deserializer)?;
    u16::try_from(value).map_err(|_| D::Error::custom(format!("0x{:X} exceeds 16 bits", value)))
}

/// Deserialize a hex u32 (supports "0x001234" or 4660)
fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => {
            u32::try_from(n).map_err(|_| D::Error::custom(format!("{} exceeds 32 bits", n)))
        }
        HexOrInt::Hex(s) => parse_hex_u32(&s).map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_profile_matches_builtin() {
        let profile = EcuConfig::default().to_profile().unwrap();
        assert_eq!(profile, EcuProfile::default());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EcuConfig::from_toml_str("").unwrap();
        assert_eq!(config.transport.kind, TransportKind::Isotp);
        assert_eq!(config.transport.logical_address, 0x0E80);
        assert_eq!(config.to_profile().unwrap(), EcuProfile::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
catalog = "config/service_ids.yaml"

[identity]
vin = "WVWZZZ1JZXW000001"

[[identity.identifiers]]
did = "0xF18C"
value = "SN-0001"

[[identity.identifiers]]
did = 61831
data_type = "bytes"
value = "0xDEAD BEEF"

[[dtcs]]
code = "0xC0FFEE"
status = "pending"

[[memory]]
address = "0x2000"
data = "0102"

[[memory]]
address = 16
size = 4

[transport]
kind = "doip"
bind = "127.0.0.1:13400"
logical_address = "0x1001"
"#;
        let config = EcuConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.catalog.as_deref(), Some("config/service_ids.yaml"));
        assert_eq!(config.transport.kind, TransportKind::Doip);
        assert_eq!(config.transport.logical_address, 0x1001);

        let profile = config.to_profile().unwrap();
        assert_eq!(profile.vin, b"WVWZZZ1JZXW000001".to_vec());
        assert_eq!(profile.identifiers[&0xF18C], b"SN-0001".to_vec());
        assert_eq!(profile.identifiers[&0xF187], vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(profile.dtcs, vec![Dtc::new(0xC0FFEE, DtcStatus::Pending)]);
        assert_eq!(profile.memory[&0x2000], vec![0x01, 0x02]);
        assert_eq!(profile.memory[&0x0010], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
identity:
  vin: "1HGCM82633A000000"
  identifiers: []
dtcs: []
transport:
  kind: isotp
  interface: can0
"#;
        let config = EcuConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.transport.interface, "can0");
        let profile = config.to_profile().unwrap();
        assert!(profile.identifiers.is_empty());
        assert!(profile.dtcs.is_empty());
        assert_eq!(profile.memory.len(), 1);
    }

    #[test]
    fn test_invalid_identifier_bytes() {
        let toml = r#"
[[identity.identifiers]]
did = "0xF18C"
data_type = "bytes"
value = "XYZ"
"#;
        let err = EcuConfig::from_toml_str(toml)
            .unwrap()
            .to_profile()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier { did: 0xF18C, .. }));
    }

    #[test]
    fn test_oversized_dtc_rejected() {
        let toml = r#"
[[dtcs]]
code = "0x1000000"
"#;
        let err = EcuConfig::from_toml_str(toml)
            .unwrap()
            .to_profile()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDtc(0x0100_0000)));
    }

    #[test]
    fn test_memory_block_validation() {
        let block = |address, data: Option<&str>, size| MemoryDef {
            address,
            data: data.map(str::to_string),
            size,
        };
        assert!(block(0x1_0000, None, Some(4)).to_bytes().is_err());
        assert!(block(0x10, Some("00"), Some(4)).to_bytes().is_err());
        assert!(block(0x10, None, None).to_bytes().is_err());
        assert_eq!(block(0x10, Some("ABCD"), None).to_bytes().unwrap(), vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_did_out_of_range() {
        let toml = r#"
[[identity.identifiers]]
did = "0x12345"
value = "x"
"#;
        assert!(matches!(
            EcuConfig::from_toml_str(toml),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_parse_hex_helpers() {
        assert_eq!(parse_hex_bytes("0xDEADBEEF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(parse_hex_bytes("01 02").unwrap(), vec![0x01, 0x02]);
        assert!(parse_hex_bytes("123").is_err());
        assert_eq!(parse_hex_u32("0x18DA00F1").unwrap(), 0x18DA00F1);
        assert!(parse_hex_u32("zz").is_err());
    }
}
