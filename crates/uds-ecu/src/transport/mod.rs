//! Transports that carry UDS requests to an [`EcuSession`](uds_core::EcuSession)
//!
//! - [`doip`]: DoIP (ISO 13400-2) over TCP, one session per connection
//! - [`isotp`]: ISO-TP over Linux SocketCAN, one session for the bus

pub mod doip;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod isotp;

use thiserror::Error;

use crate::config::parse_hex_u32;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid CAN ID '{0}'")]
    InvalidCanId(String),

    #[error("Failed to open {interface}: {reason}")]
    OpenFailed { interface: String, reason: String },

    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid DoIP header: {0}")]
    InvalidHeader(String),

    #[error("DoIP payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(u32),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parse a CAN ID given as hex ("0x18DA00F1" or "18DA00F1")
pub fn parse_can_id(s: &str) -> Result<u32, TransportError> {
    parse_hex_u32(s).map_err(|_| TransportError::InvalidCanId(s.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("0x18DA00F1").unwrap(), 0x18DA00F1);
        assert_eq!(parse_can_id(" 7E0 ").unwrap(), 0x7E0);
        assert!(matches!(
            parse_can_id("0xGG"),
            Err(TransportError::InvalidCanId(_))
        ));
    }
}
