//! End-to-end dispatch tests
//!
//! Drive an `EcuSession` with raw request bytes the way a transport does and
//! check the wire responses and resulting state.

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use uds_core::{
    CatalogConfig, EcuProfile, EcuSession, EcuState, ServiceCatalog, ServiceKind, Session,
    DEFAULT_VIN,
};

// =============================================================================
// Helpers
// =============================================================================

fn standard_session() -> EcuSession {
    EcuSession::default()
}

fn read_did(ecu: &EcuSession, did: u16) -> Vec<u8> {
    let [hi, lo] = did.to_be_bytes();
    ecu.handle(&[0x22, hi, lo])
}

/// A minimal valid request for each service
fn sample_request(kind: ServiceKind) -> Vec<u8> {
    match kind {
        ServiceKind::SessionControl => vec![0x10, 0x03],
        ServiceKind::EcuReset => vec![0x11, 0x01],
        ServiceKind::ClearDiagnosticInformation => vec![0x14, 0xFF, 0xFF, 0xFF],
        ServiceKind::ReadDtcInformation => vec![0x19, 0x02, 0xFF],
        ServiceKind::ReadDataByIdentifier => vec![0x22, 0xF1, 0x90],
        ServiceKind::ReadMemoryByAddress => vec![0x23, 0x10, 0x00, 0x01],
        ServiceKind::WriteDataByIdentifier => vec![0x2E, 0x01, 0x00, 0xAA],
        ServiceKind::IoControlByIdentifier => vec![0x2F, 0x01, 0x00, 0x03, 0x01],
        ServiceKind::RoutineControl => vec![0x31, 0x01, 0x02, 0x03],
        ServiceKind::RequestDownload => vec![0x34, 0x00, 0x11, 0x10, 0x20],
        ServiceKind::RequestUpload => vec![0x35, 0x00, 0x11, 0x10, 0x20],
        ServiceKind::TransferData => vec![0x36, 0x01, 0xAA],
        ServiceKind::RequestTransferExit => vec![0x37],
        ServiceKind::WriteMemoryByAddress => vec![0x3D, 0x30, 0x00, 0x01],
        ServiceKind::TesterPresent => vec![0x3E, 0x00],
        ServiceKind::ControlDtcSetting => vec![0x85, 0x01],
    }
}

// =============================================================================
// Session control
// =============================================================================

#[test]
fn test_session_control_sets_session() {
    for (sub, session) in [
        (0x01, Session::Default),
        (0x02, Session::Programming),
        (0x03, Session::Extended),
    ] {
        let ecu = standard_session();
        assert_eq!(ecu.handle(&[0x10, sub]), vec![0x50, sub]);

        let state = ecu.snapshot();
        assert_eq!(state.active_session(), session);
        assert!(state.session_active());
        assert_eq!(read_did(&ecu, 0xF186), vec![0x62, 0xF1, 0x86, sub]);
    }
}

// =============================================================================
// Identifiers
// =============================================================================

#[test]
fn test_read_vin_on_fresh_state() {
    let ecu = standard_session();
    let mut expected = vec![0x62, 0xF1, 0x90];
    expected.extend_from_slice(DEFAULT_VIN);
    assert_eq!(read_did(&ecu, 0xF190), expected);
}

#[test]
fn test_profile_identifiers_readable() {
    let ecu = standard_session();
    assert_eq!(read_did(&ecu, 0xF123), vec![0x62, 0xF1, 0x23, 1, 2, 3, 4]);

    let mut expected = vec![0x62, 0xF2, 0x00];
    expected.extend_from_slice(b"ECU_Model_1234");
    assert_eq!(read_did(&ecu, 0xF200), expected);
}

#[test]
fn test_write_then_read_returns_payload() {
    let ecu = standard_session();
    for (did, data) in [
        (0x0100u16, vec![0x01]),
        (0xF190, b"WVWZZZ1JZXW000001".to_vec()),
        (0xF123, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00]),
    ] {
        let [hi, lo] = did.to_be_bytes();
        let mut write = vec![0x2E, hi, lo];
        write.extend_from_slice(&data);
        assert_eq!(ecu.handle(&write), vec![0x6E, hi, lo]);

        let mut expected = vec![0x62, hi, lo];
        expected.extend_from_slice(&data);
        assert_eq!(read_did(&ecu, did), expected);
    }
}

// =============================================================================
// Unsupported services
// =============================================================================

#[test]
fn test_unknown_service_ids_not_supported() {
    let ecu = standard_session();
    for sid in 0x00..=0xFFu8 {
        if ServiceKind::from_service_id(sid).is_some() {
            continue;
        }
        assert_eq!(ecu.handle(&[sid, 0x00, 0x00, 0x00]), vec![0x7F, sid, 0x11]);
    }
}

#[test]
fn test_service_absent_from_configured_catalog() {
    let yaml = r#"
uds_services:
  "0x10":
    name: DiagnosticSessionControl
    handler: session_control
    allowed_sessions: [1, 2, 3]
    length: 2
"#;
    let catalog = CatalogConfig::from_yaml_str(yaml).unwrap().build().unwrap();
    let ecu = EcuSession::new(Arc::new(catalog), Arc::new(EcuProfile::default()));

    assert_eq!(read_did(&ecu, 0xF190), vec![0x7F, 0x22, 0x11]);
    assert_eq!(ecu.handle(&[0x10, 0x03]), vec![0x50, 0x03]);
}

// =============================================================================
// Resets
// =============================================================================

#[test]
fn test_two_soft_resets_equal_one() {
    let once = standard_session();
    once.handle(&[0x10, 0x03]);
    once.handle(&[0x2E, 0x01, 0x00, 0x42]);
    once.handle(&[0x11, 0x01]);

    let twice = standard_session();
    twice.handle(&[0x10, 0x03]);
    twice.handle(&[0x2E, 0x01, 0x00, 0x42]);
    twice.handle(&[0x11, 0x01]);
    twice.handle(&[0x11, 0x01]);

    assert_eq!(once.snapshot(), twice.snapshot());
}

#[test]
fn test_active_session_identifier_after_soft_reset() {
    let ecu = standard_session();
    assert_eq!(read_did(&ecu, 0xF186), vec![0x62, 0xF1, 0x86, 0x00]);

    ecu.handle(&[0x10, 0x03]);
    assert_eq!(read_did(&ecu, 0xF186), vec![0x62, 0xF1, 0x86, 0x03]);

    assert_eq!(ecu.handle(&[0x11, 0x01]), vec![0x51, 0x01]);
    assert!(!ecu.snapshot().session_active());
    assert_eq!(read_did(&ecu, 0xF186), vec![0x62, 0xF1, 0x86, 0x00]);

    ecu.handle(&[0x10, 0x01]);
    assert_eq!(read_did(&ecu, 0xF186), vec![0x62, 0xF1, 0x86, 0x01]);
}

#[test]
fn test_hard_reset_restores_identifiers() {
    let ecu = standard_session();
    let fresh = read_did(&ecu, 0xF190);

    ecu.handle(&[0x2E, 0xF1, 0x90, b'X']);
    ecu.handle(&[0x2E, 0x01, 0x00, 0x42]);
    assert_eq!(ecu.handle(&[0x11, 0x02]), vec![0x51, 0x02]);

    assert_eq!(read_did(&ecu, 0xF190), fresh);
    assert_eq!(read_did(&ecu, 0x0100), vec![0x7F, 0x22, 0x31]);
    assert_eq!(ecu.snapshot(), EcuState::default());
}

// =============================================================================
// Session gating
// =============================================================================

#[test]
fn test_session_gating_for_every_service() {
    // every service allowed only in the programming session
    let mut yaml = String::from("uds_services:\n");
    for kind in ServiceKind::ALL {
        yaml.push_str(&format!(
            "  \"0x{:02X}\":\n    name: {}\n    handler: {}\n    allowed_sessions: [2]\n",
            kind.service_id(),
            kind.display_name(),
            kind.handler_name()
        ));
    }
    let catalog = Arc::new(CatalogConfig::from_yaml_str(&yaml).unwrap().build().unwrap());

    for kind in ServiceKind::ALL {
        let ecu = EcuSession::new(Arc::clone(&catalog), Arc::new(EcuProfile::default()));
        let request = sample_request(kind);
        let response = ecu.handle(&request);

        if kind.bypasses_session_check() {
            assert_ne!(response.first(), Some(&0x7F), "{:?} was gated", kind);
        } else {
            assert_eq!(
                response,
                vec![0x7F, kind.service_id(), 0x7E],
                "{:?} not gated",
                kind
            );
        }
    }
}

#[test]
fn test_standard_catalog_gates_programming_services() {
    let ecu = standard_session();
    assert_eq!(ecu.handle(&[0x85, 0x01]), vec![0x7F, 0x85, 0x7E]);
    ecu.handle(&[0x10, 0x03]);
    assert_eq!(ecu.handle(&[0x85, 0x01]), vec![0xC5, 0x01]);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_submitters_are_serialized() {
    let ecu = Arc::new(standard_session());
    ecu.handle(&[0x10, 0x03]);

    let handles: Vec<_> = (0..8u8)
        .map(|worker| {
            let ecu = Arc::clone(&ecu);
            thread::spawn(move || {
                for i in 0..100u8 {
                    let did = 0x0100 + u16::from(worker);
                    let [hi, lo] = did.to_be_bytes();
                    assert_eq!(ecu.handle(&[0x2E, hi, lo, i]), vec![0x6E, hi, lo]);
                    assert_eq!(ecu.handle(&[0x3E, 0x00]), vec![0x7E, 0x00]);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for worker in 0..8u8 {
        let did = 0x0100 + u16::from(worker);
        let [hi, lo] = did.to_be_bytes();
        assert_eq!(read_did(&ecu, did), vec![0x62, hi, lo, 99]);
    }
    assert_eq!(ecu.snapshot().active_session(), Session::Extended);
}

/// Requests worker `worker` submits, in order
fn worker_requests(worker: u8) -> Vec<Vec<u8>> {
    let [hi, lo] = (0x0200 + u16::from(worker)).to_be_bytes();
    let address = 0x40 + worker;
    let mut requests = Vec::new();
    for i in 0..50u8 {
        requests.push(vec![0x2E, hi, lo, worker, i]);
        requests.push(vec![0x22, hi, lo]);
        requests.push(vec![0x3D, address, 0x00, i]);
        requests.push(vec![0x23, address, 0x00, 0x01]);
        requests.push(vec![0x3E, 0x00]);
        requests.push(vec![0x19, 0x01, 0xFF]);
    }
    requests
}

#[test]
fn test_concurrent_run_matches_sequential_run() {
    const WORKERS: u8 = 6;

    let concurrent = Arc::new(standard_session());
    concurrent.handle(&[0x10, 0x03]);

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let ecu = Arc::clone(&concurrent);
            thread::spawn(move || {
                worker_requests(worker)
                    .iter()
                    .map(|request| ecu.handle(request))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let concurrent_responses: Vec<Vec<Vec<u8>>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let sequential = standard_session();
    sequential.handle(&[0x10, 0x03]);
    let sequential_responses: Vec<Vec<Vec<u8>>> = (0..WORKERS)
        .map(|worker| {
            worker_requests(worker)
                .iter()
                .map(|request| sequential.handle(request))
                .collect()
        })
        .collect();

    assert_eq!(concurrent_responses, sequential_responses);
    assert_eq!(concurrent.snapshot(), sequential.snapshot());
}

#[test]
fn test_shared_catalog_between_sessions() {
    let catalog = Arc::new(ServiceCatalog::standard());
    let profile = Arc::new(EcuProfile::default());

    let handles: Vec<_> = [0x01u8, 0x02, 0x03, 0x60]
        .into_iter()
        .map(|sub| {
            let ecu = EcuSession::new(Arc::clone(&catalog), Arc::clone(&profile));
            thread::spawn(move || {
                assert_eq!(ecu.handle(&[0x10, sub]), vec![0x50, sub]);
                ecu.snapshot().active_session().as_byte()
            })
        })
        .collect();

    let sessions: Vec<u8> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(sessions, vec![0x01, 0x02, 0x03, 0x60]);
}
