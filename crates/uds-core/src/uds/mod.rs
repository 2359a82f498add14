//! UDS (Unified Diagnostic Services) protocol constants
//!
//! Service identifiers, sub-function values and standard data identifiers
//! used by the ECU side of the protocol.

mod nrc;

pub use nrc::NegativeResponseCode;

/// Offset added to a request service ID to form its positive response ID
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// Standard UDS service ID constants
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const CLEAR_DIAGNOSTIC_INFO: u8 = 0x14;
    pub const READ_DTC_INFO: u8 = 0x19;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const READ_MEMORY_BY_ADDRESS: u8 = 0x23;
    pub const WRITE_DATA_BY_ID: u8 = 0x2E;
    pub const IO_CONTROL_BY_ID: u8 = 0x2F;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const REQUEST_UPLOAD: u8 = 0x35;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const WRITE_MEMORY_BY_ADDRESS: u8 = 0x3D;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const CONTROL_DTC_SETTING: u8 = 0x85;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// ECUReset (0x11) reset types
pub mod reset_type {
    /// Soft reset - clear fault memory and drop to the default session
    pub const SOFT_RESET: u8 = 0x01;
    /// Hard reset - rebuild the ECU from its factory baseline
    pub const HARD_RESET: u8 = 0x02;
}

/// ReadDTCInformation (0x19) report types
pub mod dtc_report {
    /// Report number of DTCs matching a status mask
    pub const REPORT_NUMBER_OF_DTC_BY_STATUS_MASK: u8 = 0x01;
    /// Report DTCs matching a status mask
    pub const REPORT_DTC_BY_STATUS_MASK: u8 = 0x02;
    /// Report every DTC the ECU supports
    pub const REPORT_SUPPORTED_DTC: u8 = 0x0A;

    /// Status bits this ECU reports
    pub const STATUS_AVAILABILITY_MASK: u8 = 0xFF;
    /// ISO 14229-1 DTC format identifier
    pub const DTC_FORMAT_ISO14229: u8 = 0x01;
}

/// DTC status byte bit definitions per ISO 14229-1
pub mod dtc_status_bit {
    pub const TEST_FAILED: u8 = 0x01;
    pub const PENDING_DTC: u8 = 0x04;
    pub const CONFIRMED_DTC: u8 = 0x08;
}

/// TesterPresent (0x3E) and other sub-function flags
pub mod sub_function {
    /// Suppress positive response message indication bit
    pub const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;
}

/// Standard UDS Data Identifiers (ISO 14229-1 Annex C)
pub mod standard_did {
    /// Active diagnostic session (derived from the session state)
    pub const ACTIVE_DIAGNOSTIC_SESSION: u16 = 0xF186;
    pub const SPARE_PART_NUMBER: u16 = 0xF187;
    pub const ECU_SOFTWARE_VERSION: u16 = 0xF189;
    pub const ECU_SERIAL_NUMBER: u16 = 0xF18C;
    /// Vehicle identification number
    pub const VIN: u16 = 0xF190;
    pub const ECU_HARDWARE_NUMBER: u16 = 0xF191;
    pub const SYSTEM_NAME: u16 = 0xF197;
}

/// Length format identifier and block length reported for RequestDownload/RequestUpload
pub mod transfer {
    /// Two bytes of maxNumberOfBlockLength follow
    pub const LENGTH_FORMAT_ID: u8 = 0x20;
    pub const MAX_BLOCK_LENGTH: u16 = 4096;
}
