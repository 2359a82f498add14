//! The shipped configuration files parse and build

use std::path::PathBuf;

use uds_core::{CatalogConfig, ServiceKind, Session};
use uds_ecu::{EcuConfig, TransportKind};

fn repo_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../config")
        .join(name)
}

#[test]
fn test_shipped_ecu_config() {
    let config = EcuConfig::load(repo_file("ecu.toml")).unwrap();
    assert_eq!(config.transport.kind, TransportKind::Isotp);
    assert_eq!(config.transport.logical_address, 0x0E80);

    let profile = config.to_profile().unwrap();
    assert_eq!(profile.vin, b"1HGCM82633A123456".to_vec());
    assert_eq!(profile.dtcs.len(), 2);
    assert_eq!(profile.memory[&0x2000].len(), 8);
}

#[test]
fn test_shipped_service_catalog() {
    let catalog = CatalogConfig::load(repo_file("service_ids.yaml"))
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(catalog.len(), ServiceKind::ALL.len());
    for kind in ServiceKind::ALL {
        let descriptor = catalog.lookup(kind.service_id()).unwrap();
        assert_eq!(descriptor.kind, kind);
    }

    let download = catalog.lookup(0x34).unwrap();
    assert!(download.allows(Session::Programming));
    assert!(!download.allows(Session::Default));
}
