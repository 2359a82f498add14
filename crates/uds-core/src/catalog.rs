//! Service catalog
//!
//! Static registry describing each supported service: its ID, display name,
//! the sessions in which it is legal and the minimum request length. The
//! handler for each service is resolved to a [`ServiceKind`] when the catalog
//! is built, so dispatch never looks up handlers by name at runtime.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::session::Session;
use crate::uds::service_id;

/// Statically known service handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    SessionControl,
    EcuReset,
    ClearDiagnosticInformation,
    ReadDtcInformation,
    ReadDataByIdentifier,
    ReadMemoryByAddress,
    WriteDataByIdentifier,
    IoControlByIdentifier,
    RoutineControl,
    RequestDownload,
    RequestUpload,
    TransferData,
    RequestTransferExit,
    WriteMemoryByAddress,
    TesterPresent,
    ControlDtcSetting,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 16] = [
        ServiceKind::SessionControl,
        ServiceKind::EcuReset,
        ServiceKind::ClearDiagnosticInformation,
        ServiceKind::ReadDtcInformation,
        ServiceKind::ReadDataByIdentifier,
        ServiceKind::ReadMemoryByAddress,
        ServiceKind::WriteDataByIdentifier,
        ServiceKind::IoControlByIdentifier,
        ServiceKind::RoutineControl,
        ServiceKind::RequestDownload,
        ServiceKind::RequestUpload,
        ServiceKind::TransferData,
        ServiceKind::RequestTransferExit,
        ServiceKind::WriteMemoryByAddress,
        ServiceKind::TesterPresent,
        ServiceKind::ControlDtcSetting,
    ];

    pub const fn service_id(self) -> u8 {
        match self {
            ServiceKind::SessionControl => service_id::DIAGNOSTIC_SESSION_CONTROL,
            ServiceKind::EcuReset => service_id::ECU_RESET,
            ServiceKind::ClearDiagnosticInformation => service_id::CLEAR_DIAGNOSTIC_INFO,
            ServiceKind::ReadDtcInformation => service_id::READ_DTC_INFO,
            ServiceKind::ReadDataByIdentifier => service_id::READ_DATA_BY_ID,
            ServiceKind::ReadMemoryByAddress => service_id::READ_MEMORY_BY_ADDRESS,
            ServiceKind::WriteDataByIdentifier => service_id::WRITE_DATA_BY_ID,
            ServiceKind::IoControlByIdentifier => service_id::IO_CONTROL_BY_ID,
            ServiceKind::RoutineControl => service_id::ROUTINE_CONTROL,
            ServiceKind::RequestDownload => service_id::REQUEST_DOWNLOAD,
            ServiceKind::RequestUpload => service_id::REQUEST_UPLOAD,
            ServiceKind::TransferData => service_id::TRANSFER_DATA,
            ServiceKind::RequestTransferExit => service_id::REQUEST_TRANSFER_EXIT,
            ServiceKind::WriteMemoryByAddress => service_id::WRITE_MEMORY_BY_ADDRESS,
            ServiceKind::TesterPresent => service_id::TESTER_PRESENT,
            ServiceKind::ControlDtcSetting => service_id::CONTROL_DTC_SETTING,
        }
    }

    pub fn from_service_id(sid: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.service_id() == sid)
    }

    /// Handler name used in catalog configuration files
    pub const fn handler_name(self) -> &'static str {
        match self {
            ServiceKind::SessionControl => "session_control",
            ServiceKind::EcuReset => "ecu_reset",
            ServiceKind::ClearDiagnosticInformation => "clear_diagnostic_information",
            ServiceKind::ReadDtcInformation => "read_dtc_information",
            ServiceKind::ReadDataByIdentifier => "read_data_by_identifier",
            ServiceKind::ReadMemoryByAddress => "read_memory_by_address",
            ServiceKind::WriteDataByIdentifier => "write_data_by_identifier",
            ServiceKind::IoControlByIdentifier => "io_control_by_identifier",
            ServiceKind::RoutineControl => "routine_control",
            ServiceKind::RequestDownload => "request_download",
            ServiceKind::RequestUpload => "request_upload",
            ServiceKind::TransferData => "transfer_data",
            ServiceKind::RequestTransferExit => "request_transfer_exit",
            ServiceKind::WriteMemoryByAddress => "write_memory_by_address",
            ServiceKind::TesterPresent => "tester_present",
            ServiceKind::ControlDtcSetting => "control_dtc_setting",
        }
    }

    /// Resolve a configured handler name (a leading `handle_` is accepted)
    pub fn from_handler_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_prefix("handle_").unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|kind| kind.handler_name().eq_ignore_ascii_case(name))
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            ServiceKind::SessionControl => "DiagnosticSessionControl",
            ServiceKind::EcuReset => "ECUReset",
            ServiceKind::ClearDiagnosticInformation => "ClearDiagnosticInformation",
            ServiceKind::ReadDtcInformation => "ReadDTCInformation",
            ServiceKind::ReadDataByIdentifier => "ReadDataByIdentifier",
            ServiceKind::ReadMemoryByAddress => "ReadMemoryByAddress",
            ServiceKind::WriteDataByIdentifier => "WriteDataByIdentifier",
            ServiceKind::IoControlByIdentifier => "InputOutputControlByIdentifier",
            ServiceKind::RoutineControl => "RoutineControl",
            ServiceKind::RequestDownload => "RequestDownload",
            ServiceKind::RequestUpload => "RequestUpload",
            ServiceKind::TransferData => "TransferData",
            ServiceKind::RequestTransferExit => "RequestTransferExit",
            ServiceKind::WriteMemoryByAddress => "WriteMemoryByAddress",
            ServiceKind::TesterPresent => "TesterPresent",
            ServiceKind::ControlDtcSetting => "ControlDTCSetting",
        }
    }

    /// Minimum request length the decoder accepts, service ID included
    pub const fn min_length(self) -> usize {
        match self {
            ServiceKind::ReadDtcInformation
            | ServiceKind::RequestTransferExit
            | ServiceKind::TesterPresent => 1,
            ServiceKind::SessionControl
            | ServiceKind::EcuReset
            | ServiceKind::ClearDiagnosticInformation
            | ServiceKind::TransferData
            | ServiceKind::ControlDtcSetting => 2,
            ServiceKind::ReadDataByIdentifier
            | ServiceKind::WriteDataByIdentifier
            | ServiceKind::RequestDownload
            | ServiceKind::RequestUpload => 3,
            ServiceKind::ReadMemoryByAddress
            | ServiceKind::WriteMemoryByAddress
            | ServiceKind::IoControlByIdentifier
            | ServiceKind::RoutineControl => 4,
        }
    }

    /// Services that change the session are legal in every session
    pub const fn bypasses_session_check(self) -> bool {
        matches!(self, ServiceKind::SessionControl | ServiceKind::EcuReset)
    }

    /// Sessions in which the service is legal in the standard catalog
    fn standard_sessions(self) -> &'static [Session] {
        match self {
            ServiceKind::SessionControl
            | ServiceKind::EcuReset
            | ServiceKind::ClearDiagnosticInformation
            | ServiceKind::ReadDtcInformation
            | ServiceKind::ReadDataByIdentifier
            | ServiceKind::ReadMemoryByAddress
            | ServiceKind::WriteDataByIdentifier
            | ServiceKind::WriteMemoryByAddress
            | ServiceKind::RoutineControl
            | ServiceKind::TesterPresent => &Session::ALL,
            ServiceKind::IoControlByIdentifier
            | ServiceKind::RequestDownload
            | ServiceKind::RequestUpload
            | ServiceKind::TransferData
            | ServiceKind::RequestTransferExit
            | ServiceKind::ControlDtcSetting => &Session::NON_DEFAULT,
        }
    }
}

/// Documented request field (informational only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: String,
    pub description: String,
}

/// Immutable description of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: u8,
    pub name: String,
    pub kind: ServiceKind,
    pub allowed_sessions: BTreeSet<Session>,
    pub expected_min_length: u32,
    pub fields: Vec<FieldInfo>,
}

impl ServiceDescriptor {
    /// Descriptor for a service as defined by ISO 14229-1
    pub fn standard(kind: ServiceKind) -> Self {
        Self {
            id: kind.service_id(),
            name: kind.display_name().to_string(),
            kind,
            allowed_sessions: kind.standard_sessions().iter().copied().collect(),
            expected_min_length: kind.min_length() as u32,
            fields: Vec::new(),
        }
    }

    pub fn allows(&self, session: Session) -> bool {
        self.allowed_sessions.contains(&session)
    }
}

/// Registry of supported services, keyed by service ID
///
/// Built once and never mutated afterwards, so it can be shared freely
/// between connections behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: BTreeMap<u8, ServiceDescriptor>,
}

impl ServiceCatalog {
    /// Catalog with every supported service and its ISO 14229-1 session rules
    pub fn standard() -> Self {
        Self::from_descriptors(ServiceKind::ALL.into_iter().map(ServiceDescriptor::standard))
    }

    /// Build a catalog from explicit descriptors (later duplicates replace earlier ones)
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        let services = descriptors.into_iter().map(|d| (d.id, d)).collect();
        Self { services }
    }

    /// Validate a configured catalog
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut services = BTreeMap::new();

        for (key, entry) in &config.uds_services {
            let id = parse_service_id(key)?;
            if services.contains_key(&id) {
                return Err(CatalogError::DuplicateServiceId(id));
            }

            let kind = ServiceKind::from_handler_name(&entry.handler).ok_or_else(|| {
                CatalogError::UnknownHandler {
                    service_id: id,
                    handler: entry.handler.clone(),
                }
            })?;
            if kind.service_id() != id {
                return Err(CatalogError::HandlerMismatch {
                    service_id: id,
                    handler: entry.handler.clone(),
                    expected: kind.service_id(),
                });
            }

            if entry.allowed_sessions.is_empty() {
                return Err(CatalogError::NoSessions(id));
            }
            let allowed_sessions = entry
                .allowed_sessions
                .iter()
                .map(|&raw| {
                    Session::try_from(raw).map_err(|session| CatalogError::UnknownSession {
                        service_id: id,
                        session,
                    })
                })
                .collect::<Result<BTreeSet<_>, _>>()?;

            let fields = entry
                .fields
                .iter()
                .map(|f| FieldInfo {
                    name: f.name.clone(),
                    field_type: f.field_type.clone(),
                    description: f.description.clone(),
                })
                .collect();

            debug!(
                service_id = format!("0x{:02X}", id),
                name = %entry.name,
                handler = kind.handler_name(),
                "Registered service"
            );

            services.insert(
                id,
                ServiceDescriptor {
                    id,
                    name: entry.name.clone(),
                    kind,
                    allowed_sessions,
                    expected_min_length: entry.length,
                    fields,
                },
            );
        }

        Ok(Self { services })
    }

    pub fn lookup(&self, service_id: u8) -> Option<&ServiceDescriptor> {
        self.services.get(&service_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Parse a service ID key ("0x22", "0X22" or "22")
fn parse_service_id(key: &str) -> Result<u8, CatalogError> {
    let s = key.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(s, 16).map_err(|_| CatalogError::InvalidServiceId(key.to_string()))
}
