//! Request decoding
//!
//! Turns a raw request buffer into a typed [`Request`]. Field layout is fixed
//! per service and multi-byte fields are big-endian. Decoding never consults
//! the session or the catalog.

use crate::catalog::ServiceKind;
use crate::error::DecodeError;

/// ClearDiagnosticInformation group selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtcGroup {
    /// Every group byte was 0xFF
    All,
    /// A single DTC code
    Code(u32),
}

/// Memory address and size carried by RequestDownload / RequestUpload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub data_format: u8,
    pub memory_address: u32,
    pub memory_size: u32,
}

/// A syntactically valid UDS request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SessionControl {
        sub_function: u8,
    },
    EcuReset {
        reset_type: u8,
    },
    ClearDiagnosticInformation {
        group: DtcGroup,
    },
    ReadDtcInformation {
        report_type: Option<u8>,
        status_mask: Option<u8>,
    },
    ReadDataByIdentifier {
        identifier: u16,
    },
    ReadMemoryByAddress {
        address: u16,
        length: u8,
    },
    WriteDataByIdentifier {
        identifier: u16,
        data: Vec<u8>,
    },
    IoControlByIdentifier {
        identifier: u16,
        control_option: u8,
        control_state: Vec<u8>,
    },
    RoutineControl {
        sub_function: u8,
        routine_id: u16,
        options: Vec<u8>,
    },
    RequestDownload(TransferRequest),
    RequestUpload(TransferRequest),
    TransferData {
        block_sequence_counter: u8,
        data: Vec<u8>,
    },
    RequestTransferExit {
        parameters: Vec<u8>,
    },
    WriteMemoryByAddress {
        address: u16,
        data: Vec<u8>,
    },
    TesterPresent {
        sub_function: Option<u8>,
    },
    ControlDtcSetting {
        setting_type: u8,
        record: Vec<u8>,
    },
}

impl Request {
    /// Decode a raw request buffer
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let Some(&sid) = raw.first() else {
            return Err(DecodeError::IncorrectLength {
                service_id: 0x00,
                expected: 1,
                actual: 0,
            });
        };

        let kind = ServiceKind::from_service_id(sid).ok_or(DecodeError::UnknownService(sid))?;
        let expected = kind.min_length();
        if raw.len() < expected {
            return Err(DecodeError::IncorrectLength {
                service_id: sid,
                expected,
                actual: raw.len(),
            });
        }

        let request = match kind {
            ServiceKind::SessionControl => Request::SessionControl {
                sub_function: raw[1],
            },
            ServiceKind::EcuReset => Request::EcuReset { reset_type: raw[1] },
            ServiceKind::ClearDiagnosticInformation => Request::ClearDiagnosticInformation {
                group: decode_group(&raw[1..]),
            },
            ServiceKind::ReadDtcInformation => Request::ReadDtcInformation {
                report_type: raw.get(1).copied(),
                status_mask: raw.get(2).copied(),
            },
            ServiceKind::ReadDataByIdentifier => Request::ReadDataByIdentifier {
                identifier: be_u16(raw, 1),
            },
            ServiceKind::ReadMemoryByAddress => Request::ReadMemoryByAddress {
                address: be_u16(raw, 1),
                length: raw[3],
            },
            ServiceKind::WriteDataByIdentifier => Request::WriteDataByIdentifier {
                identifier: be_u16(raw, 1),
                data: raw[3..].to_vec(),
            },
            ServiceKind::IoControlByIdentifier => Request::IoControlByIdentifier {
                identifier: be_u16(raw, 1),
                control_option: raw[3],
                control_state: raw[4..].to_vec(),
            },
            ServiceKind::RoutineControl => Request::RoutineControl {
                sub_function: raw[1],
                routine_id: be_u16(raw, 2),
                options: raw[4..].to_vec(),
            },
            ServiceKind::RequestDownload => Request::RequestDownload(decode_transfer(sid, raw)?),
            ServiceKind::RequestUpload => Request::RequestUpload(decode_transfer(sid, raw)?),
            ServiceKind::TransferData => Request::TransferData {
                block_sequence_counter: raw[1],
                data: raw[2..].to_vec(),
            },
            ServiceKind::RequestTransferExit => Request::RequestTransferExit {
                parameters: raw[1..].to_vec(),
            },
            ServiceKind::WriteMemoryByAddress => Request::WriteMemoryByAddress {
                address: be_u16(raw, 1),
                data: raw[3..].to_vec(),
            },
            ServiceKind::TesterPresent => Request::TesterPresent {
                sub_function: raw.get(1).copied(),
            },
            ServiceKind::ControlDtcSetting => Request::ControlDtcSetting {
                setting_type: raw[1],
                record: raw[2..].to_vec(),
            },
        };

        Ok(request)
    }

    pub fn kind(&self) -> ServiceKind {
        match self {
            Request::SessionControl { .. } => ServiceKind::SessionControl,
            Request::EcuReset { .. } => ServiceKind::EcuReset,
            Request::ClearDiagnosticInformation { .. } => ServiceKind::ClearDiagnosticInformation,
            Request::ReadDtcInformation { .. } => ServiceKind::ReadDtcInformation,
            Request::ReadDataByIdentifier { .. } => ServiceKind::ReadDataByIdentifier,
            Request::ReadMemoryByAddress { .. } => ServiceKind::ReadMemoryByAddress,
            Request::WriteDataByIdentifier { .. } => ServiceKind::WriteDataByIdentifier,
            Request::IoControlByIdentifier { .. } => ServiceKind::IoControlByIdentifier,
            Request::RoutineControl { .. } => ServiceKind::RoutineControl,
            Request::RequestDownload(_) => ServiceKind::RequestDownload,
            Request::RequestUpload(_) => ServiceKind::RequestUpload,
            Request::TransferData { .. } => ServiceKind::TransferData,
            Request::RequestTransferExit { .. } => ServiceKind::RequestTransferExit,
            Request::WriteMemoryByAddress { .. } => ServiceKind::WriteMemoryByAddress,
            Request::TesterPresent { .. } => ServiceKind::TesterPresent,
            Request::ControlDtcSetting { .. } => ServiceKind::ControlDtcSetting,
        }
    }

    pub fn service_id(&self) -> u8 {
        self.kind().service_id()
    }
}

fn be_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([raw[offset], raw[offset + 1]])
}

/// Group identifier is up to four big-endian bytes; all-0xFF selects every DTC
fn decode_group(bytes: &[u8]) -> DtcGroup {
    let bytes = &bytes[..bytes.len().min(4)];
    if bytes.iter().all(|&b| b == 0xFF) {
        return DtcGroup::All;
    }
    DtcGroup::Code(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// Decode `[sid, dataFormat, ALFID, address.., size..]`
///
/// The low nibble of the addressAndLengthFormatIdentifier gives the address
/// width, the high nibble the size width (1..=4 bytes each).
fn decode_transfer(sid: u8, raw: &[u8]) -> Result<TransferRequest, DecodeError> {
    let data_format = raw[1];
    let alfid = raw[2];
    let size_len = ((alfid >> 4) & 0x0F) as usize;
    let addr_len = (alfid & 0x0F) as usize;

    if !(1..=4).contains(&addr_len) || !(1..=4).contains(&size_len) {
        return Err(DecodeError::InvalidFormat {
            service_id: sid,
            reason: "addressAndLengthFormatIdentifier out of range",
        });
    }

    let expected = 3 + addr_len + size_len;
    if raw.len() < expected {
        return Err(DecodeError::IncorrectLength {
            service_id: sid,
            expected,
            actual: raw.len(),
        });
    }

    let fold = |bytes: &[u8]| bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    let addr_end = 3 + addr_len;

    Ok(TransferRequest {
        data_format,
        memory_address: fold(&raw[3..addr_end]),
        memory_size: fold(&raw[addr_end..addr_end + size_len]),
    })
}
