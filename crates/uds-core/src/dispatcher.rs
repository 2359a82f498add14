//! Service dispatch
//!
//! Validates a request against the catalog and the active session, then runs
//! the handler for its [`ServiceKind`](crate::catalog::ServiceKind). Every
//! failure is answered with a negative response; nothing here returns an
//! error to the caller.

use tracing::{debug, error, info};

use crate::catalog::ServiceCatalog;
use crate::request::{DtcGroup, Request};
use crate::response::{DtcReport, PositiveResponse, Response};
use crate::session::Session;
use crate::state::EcuState;
use crate::uds::{dtc_report, reset_type, sub_function, NegativeResponseCode};

type HandlerResult = Result<PositiveResponse, NegativeResponseCode>;

/// Process one raw request against `state`
pub fn dispatch(raw: &[u8], state: &mut EcuState, catalog: &ServiceCatalog) -> Response {
    let request = match Request::decode(raw) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejected request");
            return Response::negative(e.service_id(), e.nrc());
        }
    };
    let sid = request.service_id();

    let Some(descriptor) = catalog.lookup(sid) else {
        debug!(service_id = format!("0x{:02X}", sid), "Service not in catalog");
        return Response::negative(sid, NegativeResponseCode::ServiceNotSupported);
    };

    if descriptor.kind != request.kind() {
        error!(
            service_id = format!("0x{:02X}", sid),
            configured = descriptor.kind.handler_name(),
            decoded = request.kind().handler_name(),
            "Catalog handler does not match the decoded request"
        );
        return Response::negative(sid, NegativeResponseCode::ServiceNotSupported);
    }

    if !descriptor.kind.bypasses_session_check() && !descriptor.allows(state.active_session()) {
        debug!(
            service_id = format!("0x{:02X}", sid),
            session = %state.active_session(),
            "Service not allowed in active session"
        );
        return Response::negative(
            sid,
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession,
        );
    }

    if (raw.len() as u64) < u64::from(descriptor.expected_min_length) {
        debug!(
            service_id = format!("0x{:02X}", sid),
            expected = descriptor.expected_min_length,
            actual = raw.len(),
            "Request shorter than configured length"
        );
        return Response::negative(sid, NegativeResponseCode::IncorrectMessageLengthOrFormat);
    }

    debug!(service_id = format!("0x{:02X}", sid), name = %descriptor.name, "Dispatching");

    let suppress = matches!(
        request,
        Request::TesterPresent { sub_function: Some(sub) }
            if sub & sub_function::SUPPRESS_POSITIVE_RESPONSE != 0
    );

    match handle(request, state) {
        Ok(_) if suppress => Response::Suppressed { service_id: sid },
        Ok(positive) => Response::Positive(positive),
        Err(nrc) => {
            debug!(service_id = format!("0x{:02X}", sid), nrc = %nrc, "Negative response");
            Response::negative(sid, nrc)
        }
    }
}

fn handle(request: Request, state: &mut EcuState) -> HandlerResult {
    match request {
        Request::SessionControl { sub_function } => handle_session_control(state, sub_function),
        Request::EcuReset { reset_type } => handle_ecu_reset(state, reset_type),
        Request::ClearDiagnosticInformation { group } => handle_clear_dtcs(state, group),
        Request::ReadDtcInformation {
            report_type,
            status_mask,
        } => handle_read_dtcs(state, report_type, status_mask),
        Request::ReadDataByIdentifier { identifier } => {
            let value = state
                .read_identifier(identifier)
                .ok_or(NegativeResponseCode::RequestOutOfRange)?;
            debug!(did = format!("0x{:04X}", identifier), value = ?value, "Reading identifier");
            Ok(PositiveResponse::ReadDataByIdentifier { identifier, value })
        }
        Request::ReadMemoryByAddress { address, length } => {
            let data = state
                .read_memory(u32::from(address), usize::from(length))
                .ok_or(NegativeResponseCode::IncorrectMessageLengthOrFormat)?
                .to_vec();
            Ok(PositiveResponse::ReadMemoryByAddress { address, data })
        }
        Request::WriteDataByIdentifier { identifier, data } => {
            info!(did = format!("0x{:04X}", identifier), data = ?data, "Writing identifier");
            state
                .write_identifier(identifier, data)
                .map_err(|_| NegativeResponseCode::RequestOutOfRange)?;
            Ok(PositiveResponse::WriteDataByIdentifier { identifier })
        }
        Request::WriteMemoryByAddress { address, data } => {
            info!(address = format!("0x{:04X}", address), len = data.len(), "Writing memory");
            state.write_memory(u32::from(address), data);
            Ok(PositiveResponse::WriteMemoryByAddress { address })
        }
        Request::IoControlByIdentifier {
            identifier,
            control_option,
            ..
        } => Ok(PositiveResponse::IoControlByIdentifier {
            identifier,
            control_option,
        }),
        Request::RoutineControl {
            sub_function,
            routine_id,
            ..
        } => Ok(PositiveResponse::RoutineControl {
            sub_function,
            routine_id,
        }),
        Request::RequestDownload(_) => Ok(PositiveResponse::RequestDownload),
        Request::RequestUpload(_) => Ok(PositiveResponse::RequestUpload),
        Request::TransferData {
            block_sequence_counter,
            ..
        } => Ok(PositiveResponse::TransferData {
            block_sequence_counter,
        }),
        Request::RequestTransferExit { .. } => Ok(PositiveResponse::RequestTransferExit),
        Request::TesterPresent { sub_function } => {
            if !state.session_active() {
                return Err(NegativeResponseCode::ServiceNotSupportedInActiveSession);
            }
            debug!("Tester present");
            Ok(PositiveResponse::TesterPresent { sub_function })
        }
        Request::ControlDtcSetting { setting_type, .. } => {
            Ok(PositiveResponse::ControlDtcSetting { setting_type })
        }
    }
}

fn handle_session_control(state: &mut EcuState, sub_function: u8) -> HandlerResult {
    let session =
        Session::try_from(sub_function).map_err(|_| NegativeResponseCode::RequestOutOfRange)?;
    state.enter_session(session);
    Ok(PositiveResponse::SessionControl { session })
}

fn handle_ecu_reset(state: &mut EcuState, reset: u8) -> HandlerResult {
    match reset {
        reset_type::SOFT_RESET => state.soft_reset(),
        reset_type::HARD_RESET => state.hard_reset(),
        _ => return Err(NegativeResponseCode::RequestOutOfRange),
    }
    info!(reset_type = format!("0x{:02X}", reset), "ECU reset");
    Ok(PositiveResponse::EcuReset { reset_type: reset })
}

fn handle_clear_dtcs(state: &mut EcuState, group: DtcGroup) -> HandlerResult {
    match group {
        DtcGroup::All => {
            let cleared = state.clear_all_dtcs();
            info!(cleared, "Cleared all DTCs");
        }
        DtcGroup::Code(code) => {
            if state.clear_dtc(code) {
                info!(dtc = format!("0x{:06X}", code), "Cleared DTC");
            }
        }
    }
    Ok(PositiveResponse::ClearDiagnosticInformation)
}

fn handle_read_dtcs(
    state: &EcuState,
    report_type: Option<u8>,
    status_mask: Option<u8>,
) -> HandlerResult {
    let mask = status_mask.unwrap_or(dtc_report::STATUS_AVAILABILITY_MASK);
    let report = match report_type.unwrap_or(dtc_report::REPORT_DTC_BY_STATUS_MASK) {
        dtc_report::REPORT_NUMBER_OF_DTC_BY_STATUS_MASK => {
            let count = state
                .dtcs()
                .iter()
                .filter(|d| d.status.matches_mask(mask))
                .count();
            DtcReport::Count {
                count: u16::try_from(count).unwrap_or(u16::MAX),
            }
        }
        dtc_report::REPORT_DTC_BY_STATUS_MASK => DtcReport::List {
            report_type: dtc_report::REPORT_DTC_BY_STATUS_MASK,
            dtcs: state
                .dtcs()
                .into_iter()
                .filter(|d| d.status.matches_mask(mask))
                .collect(),
        },
        dtc_report::REPORT_SUPPORTED_DTC => DtcReport::List {
            report_type: dtc_report::REPORT_SUPPORTED_DTC,
            dtcs: state.dtcs(),
        },
        _ => return Err(NegativeResponseCode::RequestOutOfRange),
    };
    Ok(PositiveResponse::ReadDtcInformation(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ServiceDescriptor, ServiceKind};
    use crate::state::{Dtc, DtcStatus};
    use pretty_assertions::assert_eq;

    fn run(state: &mut EcuState, raw: &[u8]) -> Vec<u8> {
        dispatch(raw, state, &ServiceCatalog::standard()).encode()
    }

    #[test]
    fn test_empty_request() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[]), vec![0x7F, 0x00, 0x13]);
    }

    #[test]
    fn test_unknown_session_rejected() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[0x10, 0x05]), vec![0x7F, 0x10, 0x31]);
        assert!(!state.session_active());
    }

    #[test]
    fn test_session_control_sets_session() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[0x10, 0x60]), vec![0x50, 0x60]);
        assert_eq!(state.active_session(), Session::Engineering);
        assert!(state.session_active());
    }

    #[test]
    fn test_unknown_reset_type() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[0x11, 0x03]), vec![0x7F, 0x11, 0x31]);
    }

    #[test]
    fn test_soft_reset_clears_dtcs() {
        let mut state = EcuState::default();
        run(&mut state, &[0x10, 0x03]);
        assert_eq!(run(&mut state, &[0x11, 0x01]), vec![0x51, 0x01]);
        assert!(state.dtcs().is_empty());
        assert_eq!(state.active_session(), Session::Default);
        assert!(!state.session_active());
    }

    #[test]
    fn test_clear_single_and_all() {
        let mut state = EcuState::default();
        state.record_dtc(Dtc::new(0x000200, DtcStatus::Pending));

        assert_eq!(run(&mut state, &[0x14, 0x00, 0x02, 0x00]), vec![0x54]);
        assert_eq!(state.dtcs(), vec![Dtc::new(0x001234, DtcStatus::Active)]);

        // absent code is a no-op
        assert_eq!(run(&mut state, &[0x14, 0x00, 0x99, 0x99]), vec![0x54]);
        assert_eq!(state.dtcs().len(), 1);

        assert_eq!(run(&mut state, &[0x14, 0xFF, 0xFF, 0xFF]), vec![0x54]);
        assert!(state.dtcs().is_empty());
    }

    #[test]
    fn test_read_dtcs_default_report() {
        let mut state = EcuState::default();
        assert_eq!(
            run(&mut state, &[0x19]),
            vec![0x59, 0x02, 0xFF, 0x00, 0x12, 0x34, 0x09]
        );
    }

    #[test]
    fn test_read_dtcs_by_mask() {
        let mut state = EcuState::default();
        state.record_dtc(Dtc::new(0x000300, DtcStatus::Pending));

        assert_eq!(
            run(&mut state, &[0x19, 0x02, 0x04]),
            vec![0x59, 0x02, 0xFF, 0x00, 0x03, 0x00, 0x04]
        );
        assert_eq!(
            run(&mut state, &[0x19, 0x01, 0x08]),
            vec![0x59, 0x01, 0xFF, 0x01, 0x00, 0x01]
        );
        assert_eq!(
            run(&mut state, &[0x19, 0x0A]),
            vec![0x59, 0x0A, 0xFF, 0x00, 0x03, 0x00, 0x04, 0x00, 0x12, 0x34, 0x09]
        );
        assert_eq!(run(&mut state, &[0x19, 0x06]), vec![0x7F, 0x19, 0x31]);
    }

    #[test]
    fn test_read_missing_identifier() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[0x22, 0x12, 0x34]), vec![0x7F, 0x22, 0x31]);
    }

    #[test]
    fn test_write_active_session_identifier_rejected() {
        let mut state = EcuState::default();
        assert_eq!(
            run(&mut state, &[0x2E, 0xF1, 0x86, 0x03]),
            vec![0x7F, 0x2E, 0x31]
        );
        assert_eq!(run(&mut state, &[0x22, 0xF1, 0x86]), vec![0x62, 0xF1, 0x86, 0x00]);
    }

    #[test]
    fn test_memory_read_and_write() {
        let mut state = EcuState::default();
        assert_eq!(
            run(&mut state, &[0x23, 0x10, 0x00, 0x04]),
            vec![0x63, 0x10, 0x00, 0x00, 0x01, 0x02, 0x03]
        );
        assert_eq!(run(&mut state, &[0x23, 0x10, 0x00, 0x40]), vec![0x7F, 0x23, 0x13]);
        assert_eq!(run(&mut state, &[0x23, 0x20, 0x00, 0x01]), vec![0x7F, 0x23, 0x13]);

        assert_eq!(
            run(&mut state, &[0x3D, 0x20, 0x00, 0xDE, 0xAD]),
            vec![0x7D, 0x20, 0x00]
        );
        assert_eq!(
            run(&mut state, &[0x23, 0x20, 0x00, 0x02]),
            vec![0x63, 0x20, 0x00, 0xDE, 0xAD]
        );
    }

    #[test]
    fn test_tester_present_requires_session() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[0x3E, 0x00]), vec![0x7F, 0x3E, 0x7F]);

        run(&mut state, &[0x10, 0x01]);
        assert_eq!(run(&mut state, &[0x3E, 0x00]), vec![0x7E, 0x00]);
        assert_eq!(run(&mut state, &[0x3E]), vec![0x7E]);
        assert!(run(&mut state, &[0x3E, 0x80]).is_empty());
    }

    #[test]
    fn test_suppressed_tester_present_still_reports_errors() {
        let mut state = EcuState::default();
        assert_eq!(run(&mut state, &[0x3E, 0x80]), vec![0x7F, 0x3E, 0x7F]);
    }

    #[test]
    fn test_programming_services_gated() {
        let mut state = EcuState::default();
        let download = [0x34, 0x00, 0x11, 0x10, 0x20];
        assert_eq!(run(&mut state, &download), vec![0x7F, 0x34, 0x7E]);

        run(&mut state, &[0x10, 0x02]);
        assert_eq!(run(&mut state, &download), vec![0x74, 0x20, 0x10, 0x00]);
        assert_eq!(run(&mut state, &[0x36, 0x01, 0xAA]), vec![0x76, 0x01]);
        assert_eq!(run(&mut state, &[0x37]), vec![0x77]);
        assert_eq!(run(&mut state, &[0x85, 0x02]), vec![0xC5, 0x02]);
        assert_eq!(
            run(&mut state, &[0x2F, 0x01, 0x02, 0x03, 0xFF]),
            vec![0x6F, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn test_bad_alfid() {
        let mut state = EcuState::default();
        run(&mut state, &[0x10, 0x02]);
        assert_eq!(run(&mut state, &[0x34, 0x00, 0x50, 0x00]), vec![0x7F, 0x34, 0x31]);
    }

    #[test]
    fn test_routine_control_ack() {
        let mut state = EcuState::default();
        assert_eq!(
            run(&mut state, &[0x31, 0x01, 0xFF, 0x00]),
            vec![0x71, 0x01, 0xFF, 0x00]
        );
    }

    #[test]
    fn test_configured_length_checked_after_session() {
        let mut descriptor = ServiceDescriptor::standard(ServiceKind::ReadDataByIdentifier);
        descriptor.expected_min_length = 5;
        let catalog = ServiceCatalog::from_descriptors([descriptor]);
        let mut state = EcuState::default();

        assert_eq!(
            dispatch(&[0x22, 0xF1, 0x90], &mut state, &catalog).encode(),
            vec![0x7F, 0x22, 0x13]
        );
    }

    #[test]
    fn test_kind_mismatch_is_not_supported() {
        let mut descriptor = ServiceDescriptor::standard(ServiceKind::TesterPresent);
        descriptor.id = 0x22;
        let catalog = ServiceCatalog::from_descriptors([descriptor]);
        let mut state = EcuState::default();

        assert_eq!(
            dispatch(&[0x22, 0xF1, 0x90], &mut state, &catalog).encode(),
            vec![0x7F, 0x22, 0x11]
        );
    }

    #[test]
    fn test_service_missing_from_catalog() {
        let catalog = ServiceCatalog::from_descriptors([ServiceDescriptor::standard(
            ServiceKind::SessionControl,
        )]);
        let mut state = EcuState::default();
        assert_eq!(
            dispatch(&[0x22, 0xF1, 0x90], &mut state, &catalog).encode(),
            vec![0x7F, 0x22, 0x11]
        );
    }
}
