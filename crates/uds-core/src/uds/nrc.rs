//! UDS Negative Response Codes (NRC)

use std::fmt;

/// Negative response codes this ECU can emit
///
/// A closed set: every negative response carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NegativeResponseCode {
    ServiceNotSupported = 0x11,
    IncorrectMessageLengthOrFormat = 0x13,
    RequestOutOfRange = 0x31,
    SubFunctionNotSupportedInActiveSession = 0x7E,
    ServiceNotSupportedInActiveSession = 0x7F,
}

impl NegativeResponseCode {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for NegativeResponseCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x11 => Ok(Self::ServiceNotSupported),
            0x13 => Ok(Self::IncorrectMessageLengthOrFormat),
            0x31 => Ok(Self::RequestOutOfRange),
            0x7E => Ok(Self::SubFunctionNotSupportedInActiveSession),
            0x7F => Ok(Self::ServiceNotSupportedInActiveSession),
            other => Err(other),
        }
    }
}

impl From<NegativeResponseCode> for u8 {
    fn from(nrc: NegativeResponseCode) -> Self {
        nrc.as_byte()
    }
}

impl fmt::UpperHex for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.as_byte(), f)
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceNotSupported => write!(f, "ServiceNotSupported"),
            Self::IncorrectMessageLengthOrFormat => write!(f, "IncorrectMessageLengthOrFormat"),
            Self::RequestOutOfRange => write!(f, "RequestOutOfRange"),
            Self::SubFunctionNotSupportedInActiveSession => {
                write!(f, "SubFunctionNotSupportedInActiveSession")
            }
            Self::ServiceNotSupportedInActiveSession => {
                write!(f, "ServiceNotSupportedInActiveSession")
            }
        }
    }
}
