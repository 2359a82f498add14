//! Error types for the UDS core

use thiserror::Error;

use crate::uds::NegativeResponseCode;

/// Request decoding failure
///
/// Decoding is pure syntax validation; each variant maps onto exactly one NRC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unknown service 0x{0:02X}")]
    UnknownService(u8),

    #[error("Service 0x{service_id:02X}: expected at least {expected} bytes, got {actual}")]
    IncorrectLength {
        service_id: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Service 0x{service_id:02X}: {reason}")]
    InvalidFormat {
        service_id: u8,
        reason: &'static str,
    },
}

impl DecodeError {
    /// Service ID the error is reported against (0x00 for an empty request)
    pub fn service_id(&self) -> u8 {
        match self {
            DecodeError::UnknownService(sid) => *sid,
            DecodeError::IncorrectLength { service_id, .. } => *service_id,
            DecodeError::InvalidFormat { service_id, .. } => *service_id,
        }
    }

    pub fn nrc(&self) -> NegativeResponseCode {
        match self {
            DecodeError::UnknownService(_) => NegativeResponseCode::ServiceNotSupported,
            DecodeError::IncorrectLength { .. } => {
                NegativeResponseCode::IncorrectMessageLengthOrFormat
            }
            DecodeError::InvalidFormat { .. } => NegativeResponseCode::RequestOutOfRange,
        }
    }
}

/// Invalid service catalog definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Invalid service id '{0}': expected a hexadecimal byte such as \"0x22\"")]
    InvalidServiceId(String),

    #[error("Duplicate service id 0x{0:02X}")]
    DuplicateServiceId(u8),

    #[error("Service 0x{service_id:02X}: unknown handler '{handler}'")]
    UnknownHandler { service_id: u8, handler: String },

    #[error("Service 0x{service_id:02X}: handler '{handler}' serves service 0x{expected:02X}")]
    HandlerMismatch {
        service_id: u8,
        handler: String,
        expected: u8,
    },

    #[error("Service 0x{service_id:02X}: unknown session 0x{session:02X}")]
    UnknownSession { service_id: u8, session: u8 },

    #[error("Service 0x{0:02X}: allowed_sessions is empty")]
    NoSessions(u8),
}

/// Failure loading a service catalog file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported configuration format: {0} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Rejected mutation of the ECU state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Identifier 0x{0:04X} is derived from the session state and cannot be written")]
    ReadOnlyIdentifier(u16),
}
