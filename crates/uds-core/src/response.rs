//! Response encoding
//!
//! Positive responses are `[sid + 0x40, payload..]`, negative responses are
//! always exactly `[0x7F, sid, nrc]`.

use crate::session::Session;
use crate::state::Dtc;
use crate::uds::{
    dtc_report, service_id, transfer, NegativeResponseCode, POSITIVE_RESPONSE_OFFSET,
};

/// ReadDTCInformation payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtcReport {
    /// reportNumberOfDTCByStatusMask
    Count { count: u16 },
    /// DTC records for `report_type`
    List { report_type: u8, dtcs: Vec<Dtc> },
}

/// Successful outcome of a service handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositiveResponse {
    SessionControl { session: Session },
    EcuReset { reset_type: u8 },
    ClearDiagnosticInformation,
    ReadDtcInformation(DtcReport),
    ReadDataByIdentifier { identifier: u16, value: Vec<u8> },
    ReadMemoryByAddress { address: u16, data: Vec<u8> },
    WriteDataByIdentifier { identifier: u16 },
    WriteMemoryByAddress { address: u16 },
    IoControlByIdentifier { identifier: u16, control_option: u8 },
    RoutineControl { sub_function: u8, routine_id: u16 },
    RequestDownload,
    RequestUpload,
    TransferData { block_sequence_counter: u8 },
    RequestTransferExit,
    TesterPresent { sub_function: Option<u8> },
    ControlDtcSetting { setting_type: u8 },
}

impl PositiveResponse {
    /// Request service ID this response answers
    pub fn service_id(&self) -> u8 {
        match self {
            PositiveResponse::SessionControl { .. } => service_id::DIAGNOSTIC_SESSION_CONTROL,
            PositiveResponse::EcuReset { .. } => service_id::ECU_RESET,
            PositiveResponse::ClearDiagnosticInformation => service_id::CLEAR_DIAGNOSTIC_INFO,
            PositiveResponse::ReadDtcInformation(_) => service_id::READ_DTC_INFO,
            PositiveResponse::ReadDataByIdentifier { .. } => service_id::READ_DATA_BY_ID,
            PositiveResponse::ReadMemoryByAddress { .. } => service_id::READ_MEMORY_BY_ADDRESS,
            PositiveResponse::WriteDataByIdentifier { .. } => service_id::WRITE_DATA_BY_ID,
            PositiveResponse::WriteMemoryByAddress { .. } => service_id::WRITE_MEMORY_BY_ADDRESS,
            PositiveResponse::IoControlByIdentifier { .. } => service_id::IO_CONTROL_BY_ID,
            PositiveResponse::RoutineControl { .. } => service_id::ROUTINE_CONTROL,
            PositiveResponse::RequestDownload => service_id::REQUEST_DOWNLOAD,
            PositiveResponse::RequestUpload => service_id::REQUEST_UPLOAD,
            PositiveResponse::TransferData { .. } => service_id::TRANSFER_DATA,
            PositiveResponse::RequestTransferExit => service_id::REQUEST_TRANSFER_EXIT,
            PositiveResponse::TesterPresent { .. } => service_id::TESTER_PRESENT,
            PositiveResponse::ControlDtcSetting { .. } => service_id::CONTROL_DTC_SETTING,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.service_id() + POSITIVE_RESPONSE_OFFSET);
        match self {
            PositiveResponse::SessionControl { session } => out.push(session.as_byte()),
            PositiveResponse::EcuReset { reset_type } => out.push(*reset_type),
            PositiveResponse::ClearDiagnosticInformation
            | PositiveResponse::RequestTransferExit => {}
            PositiveResponse::ReadDtcInformation(report) => encode_dtc_report(report, out),
            PositiveResponse::ReadDataByIdentifier { identifier, value } => {
                out.extend_from_slice(&identifier.to_be_bytes());
                out.extend_from_slice(value);
            }
            PositiveResponse::ReadMemoryByAddress { address, data } => {
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(data);
            }
            PositiveResponse::WriteDataByIdentifier { identifier } => {
                out.extend_from_slice(&identifier.to_be_bytes());
            }
            PositiveResponse::WriteMemoryByAddress { address } => {
                out.extend_from_slice(&address.to_be_bytes());
            }
            PositiveResponse::IoControlByIdentifier {
                identifier,
                control_option,
            } => {
                out.extend_from_slice(&identifier.to_be_bytes());
                out.push(*control_option);
            }
            PositiveResponse::RoutineControl {
                sub_function,
                routine_id,
            } => {
                out.push(*sub_function);
                out.extend_from_slice(&routine_id.to_be_bytes());
            }
            PositiveResponse::RequestDownload | PositiveResponse::RequestUpload => {
                out.push(transfer::LENGTH_FORMAT_ID);
                out.extend_from_slice(&transfer::MAX_BLOCK_LENGTH.to_be_bytes());
            }
            PositiveResponse::TransferData {
                block_sequence_counter,
            } => out.push(*block_sequence_counter),
            PositiveResponse::TesterPresent { sub_function } => out.extend(sub_function),
            PositiveResponse::ControlDtcSetting { setting_type } => out.push(*setting_type),
        }
    }
}

fn encode_dtc_report(report: &DtcReport, out: &mut Vec<u8>) {
    match report {
        DtcReport::Count { count } => {
            out.push(dtc_report::REPORT_NUMBER_OF_DTC_BY_STATUS_MASK);
            out.push(dtc_report::STATUS_AVAILABILITY_MASK);
            out.push(dtc_report::DTC_FORMAT_ISO14229);
            out.extend_from_slice(&count.to_be_bytes());
        }
        DtcReport::List { report_type, dtcs } => {
            out.push(*report_type);
            out.push(dtc_report::STATUS_AVAILABILITY_MASK);
            for dtc in dtcs {
                // 24-bit DTC number followed by its status byte
                out.extend_from_slice(&dtc.code.to_be_bytes()[1..]);
                out.push(dtc.status.status_byte());
            }
        }
    }
}

/// Outcome of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Positive(PositiveResponse),
    Negative {
        service_id: u8,
        nrc: NegativeResponseCode,
    },
    /// Positive outcome the tester asked not to receive
    Suppressed { service_id: u8 },
}

impl Response {
    pub fn negative(service_id: u8, nrc: NegativeResponseCode) -> Self {
        Response::Negative { service_id, nrc }
    }

    pub fn service_id(&self) -> u8 {
        match self {
            Response::Positive(positive) => positive.service_id(),
            Response::Negative { service_id, .. } | Response::Suppressed { service_id } => {
                *service_id
            }
        }
    }

    pub fn is_positive(&self) -> bool {
        !matches!(self, Response::Negative { .. })
    }

    pub fn nrc(&self) -> Option<NegativeResponseCode> {
        match self {
            Response::Negative { nrc, .. } => Some(*nrc),
            _ => None,
        }
    }

    /// Wire bytes; empty when the response is suppressed
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Positive(positive) => {
                let mut out = Vec::with_capacity(8);
                positive.encode_into(&mut out);
                out
            }
            Response::Negative {
                service_id: sid,
                nrc,
            } => vec![service_id::NEGATIVE_RESPONSE, *sid, nrc.as_byte()],
            Response::Suppressed { .. } => Vec::new(),
        }
    }
}

impl From<PositiveResponse> for Response {
    fn from(positive: PositiveResponse) -> Self {
        Response::Positive(positive)
    }
}
