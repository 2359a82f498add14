//! Diagnostic sessions

use std::fmt;

/// UDS diagnostic session
///
/// Exactly one session is active at a time. Bytes outside this set are
/// rejected when converting, so the active session is never an arbitrary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Session {
    /// Default session (0x01)
    #[default]
    Default,
    /// Programming session (0x02)
    Programming,
    /// Extended diagnostic session (0x03)
    Extended,
    /// Safety system diagnostic session (0x04)
    SafetySystem,
    /// Engineering/development session (0x60)
    Engineering,
}

impl Session {
    pub const ALL: [Session; 5] = [
        Session::Default,
        Session::Programming,
        Session::Extended,
        Session::SafetySystem,
        Session::Engineering,
    ];

    /// Sessions other than the default session
    pub const NON_DEFAULT: [Session; 4] = [
        Session::Programming,
        Session::Extended,
        Session::SafetySystem,
        Session::Engineering,
    ];

    pub const fn as_byte(self) -> u8 {
        match self {
            Session::Default => 0x01,
            Session::Programming => 0x02,
            Session::Extended => 0x03,
            Session::SafetySystem => 0x04,
            Session::Engineering => 0x60,
        }
    }
}

impl TryFrom<u8> for Session {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Session::Default),
            0x02 => Ok(Session::Programming),
            0x03 => Ok(Session::Extended),
            0x04 => Ok(Session::SafetySystem),
            0x60 => Ok(Session::Engineering),
            other => Err(other),
        }
    }
}

impl From<Session> for u8 {
    fn from(session: Session) -> Self {
        session.as_byte()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Session::Default => "default",
            Session::Programming => "programming",
            Session::Extended => "extended",
            Session::SafetySystem => "safety",
            Session::Engineering => "engineering",
        };
        write!(f, "{} (0x{:02X})", name, self.as_byte())
    }
}
