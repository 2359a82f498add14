//! uds-ecu - simulated UDS ECU
//!
//! Wires the I/O free [`uds_core`] dispatcher to real transports and loads the
//! ECU's factory profile and service catalog from configuration files.

pub mod config;
pub mod transport;

pub use config::{ConfigError, EcuConfig, TransportKind};
pub use transport::TransportError;
