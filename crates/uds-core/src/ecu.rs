//! Serialized access to one ECU conversation

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::ServiceCatalog;
use crate::dispatcher::dispatch;
use crate::response::Response;
use crate::state::{EcuProfile, EcuState};

/// One diagnostic conversation: its own [`EcuState`] plus the shared catalog
///
/// The lock is held for decode, dispatch and encode, so concurrent callers
/// observe the same result as some sequential ordering of their requests.
pub struct EcuSession {
    catalog: Arc<ServiceCatalog>,
    state: Mutex<EcuState>,
}

impl EcuSession {
    pub fn new(catalog: Arc<ServiceCatalog>, profile: Arc<EcuProfile>) -> Self {
        Self {
            catalog,
            state: Mutex::new(EcuState::new(profile)),
        }
    }

    /// Handle a raw request and return the bytes to send back (empty = send nothing)
    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        let mut state = self.state.lock();
        let response = dispatch(request, &mut state, &self.catalog);
        let bytes = response.encode();
        debug!(request = ?request, response = ?bytes, "UDS exchange");
        bytes
    }

    /// Like [`handle`](Self::handle) but returns the typed response
    pub fn process(&self, request: &[u8]) -> Response {
        let mut state = self.state.lock();
        dispatch(request, &mut state, &self.catalog)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> EcuState {
        self.state.lock().clone()
    }

    pub fn catalog(&self) -> &Arc<ServiceCatalog> {
        &self.catalog
    }
}

impl Default for EcuSession {
    fn default() -> Self {
        Self::new(
            Arc::new(ServiceCatalog::standard()),
            Arc::new(EcuProfile::default()),
        )
    }
}
