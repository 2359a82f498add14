//! ECU diagnostic state
//!
//! The mutable state of one simulated ECU: active session, fault memory,
//! identifier store and emulated memory. One [`EcuState`] exists per logical
//! diagnostic conversation and is only mutated by the dispatcher's handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::error::StateError;
use crate::session::Session;
use crate::uds::{dtc_status_bit, standard_did};

/// VIN reported by the built-in factory profile
pub const DEFAULT_VIN: &[u8] = b"1HGCM82633A123456";

/// DTC lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtcStatus {
    /// Test failed and fault confirmed
    Active,
    /// Test failed, not yet confirmed
    Pending,
    /// Confirmed earlier, not currently failing
    Inactive,
}

impl DtcStatus {
    /// ISO 14229-1 status byte
    pub const fn status_byte(self) -> u8 {
        match self {
            DtcStatus::Active => dtc_status_bit::TEST_FAILED | dtc_status_bit::CONFIRMED_DTC,
            DtcStatus::Pending => dtc_status_bit::PENDING_DTC,
            DtcStatus::Inactive => dtc_status_bit::CONFIRMED_DTC,
        }
    }

    pub fn matches_mask(self, mask: u8) -> bool {
        self.status_byte() & mask != 0
    }
}

/// A diagnostic trouble code held in fault memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dtc {
    /// 24-bit DTC number
    pub code: u32,
    pub status: DtcStatus,
}

impl Dtc {
    pub const fn new(code: u32, status: DtcStatus) -> Self {
        Self { code, status }
    }
}

/// Factory baseline an ECU is built from and returns to on hard reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuProfile {
    pub vin: Vec<u8>,
    /// Additional identifier values (0xF190 and 0xF186 are managed separately)
    pub identifiers: BTreeMap<u16, Vec<u8>>,
    pub dtcs: Vec<Dtc>,
    pub memory: BTreeMap<u32, Vec<u8>>,
}

impl Default for EcuProfile {
    fn default() -> Self {
        Self {
            vin: DEFAULT_VIN.to_vec(),
            identifiers: BTreeMap::from([
                (0xF123, vec![0x01, 0x02, 0x03, 0x04]),
                (0xF200, b"ECU_Model_1234".to_vec()),
            ]),
            dtcs: vec![Dtc::new(0x001234, DtcStatus::Active)],
            memory: BTreeMap::from([(0x1000, (0u8..32).collect())]),
        }
    }
}

/// Mutable diagnostic state of one simulated ECU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuState {
    profile: Arc<EcuProfile>,
    active_session: Session,
    session_active: bool,
    /// Ordered by DTC code; a code appears at most once
    fault_memory: BTreeMap<u32, DtcStatus>,
    identifier_store: BTreeMap<u16, Vec<u8>>,
    memory_store: BTreeMap<u32, Vec<u8>>,
}

impl Default for EcuState {
    fn default() -> Self {
        Self::new(Arc::new(EcuProfile::default()))
    }
}

impl EcuState {
    /// Build a fresh state from a factory profile
    pub fn new(profile: Arc<EcuProfile>) -> Self {
        let mut identifier_store = profile.identifiers.clone();
        identifier_store.insert(standard_did::VIN, profile.vin.clone());
        // 0xF186 is derived from the session on every read
        identifier_store.remove(&standard_did::ACTIVE_DIAGNOSTIC_SESSION);

        let fault_memory = profile.dtcs.iter().map(|d| (d.code, d.status)).collect();

        Self {
            active_session: Session::Default,
            session_active: false,
            fault_memory,
            identifier_store,
            memory_store: profile.memory.clone(),
            profile,
        }
    }

    pub fn profile(&self) -> &Arc<EcuProfile> {
        &self.profile
    }

    pub fn active_session(&self) -> Session {
        self.active_session
    }

    /// Whether a diagnostic session has been negotiated since the last reset
    pub fn session_active(&self) -> bool {
        self.session_active
    }

    pub fn enter_session(&mut self, session: Session) {
        let previous = std::mem::replace(&mut self.active_session, session);
        self.session_active = true;
        if previous != session {
            info!(from = %previous, to = %session, "Session changed");
        }
    }

    /// Clear fault memory and drop back to the default session
    pub fn soft_reset(&mut self) {
        self.fault_memory.clear();
        self.active_session = Session::Default;
        self.session_active = false;
    }

    /// Rebuild the whole state from the factory profile
    pub fn hard_reset(&mut self) {
        *self = Self::new(Arc::clone(&self.profile));
    }

    /// Insert or update a DTC
    pub fn record_dtc(&mut self, dtc: Dtc) {
        self.fault_memory.insert(dtc.code, dtc.status);
    }

    pub fn clear_all_dtcs(&mut self) -> usize {
        let count = self.fault_memory.len();
        self.fault_memory.clear();
        count
    }

    /// Remove one DTC, returning whether it was present
    pub fn clear_dtc(&mut self, code: u32) -> bool {
        self.fault_memory.remove(&code).is_some()
    }

    /// Snapshot of fault memory in code order
    pub fn dtcs(&self) -> Vec<Dtc> {
        self.fault_memory
            .iter()
            .map(|(&code, &status)| Dtc { code, status })
            .collect()
    }

    /// Look up an identifier; 0xF186 reads 0x00 until a session is negotiated
    pub fn read_identifier(&self, identifier: u16) -> Option<Vec<u8>> {
        if identifier == standard_did::ACTIVE_DIAGNOSTIC_SESSION {
            return Some(vec![self.active_session_byte()]);
        }
        self.identifier_store.get(&identifier).cloned()
    }

    fn active_session_byte(&self) -> u8 {
        if self.session_active {
            self.active_session.as_byte()
        } else {
            0x00
        }
    }

    /// Store a value, creating the identifier if it does not exist
    pub fn write_identifier(&mut self, identifier: u16, value: Vec<u8>) -> Result<(), StateError> {
        if identifier == standard_did::ACTIVE_DIAGNOSTIC_SESSION {
            return Err(StateError::ReadOnlyIdentifier(identifier));
        }
        self.identifier_store.insert(identifier, value);
        Ok(())
    }

    /// Read `length` bytes from the block stored at `address`
    pub fn read_memory(&self, address: u32, length: usize) -> Option<&[u8]> {
        self.memory_store
            .get(&address)
            .and_then(|block| block.get(..length))
    }

    /// Store a block at `address`, replacing any existing block
    pub fn write_memory(&mut self, address: u32, data: Vec<u8>) {
        self.memory_store.insert(address, data);
    }
}
