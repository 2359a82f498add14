//! uds-core - UDS (ISO 14229) service dispatcher and ECU diagnostic state
//!
//! This crate is I/O free. A transport hands raw request bytes to an
//! [`EcuSession`] and sends back whatever bytes it returns:
//!
//! ```text
//! raw bytes -> Request::decode -> dispatch(EcuState, ServiceCatalog) -> Response::encode
//! ```
//!
//! The [`ServiceCatalog`] is built once, either from [`ServiceCatalog::standard`]
//! or a [`CatalogConfig`] file, and shared between sessions behind an `Arc`.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod ecu;
pub mod error;
pub mod request;
pub mod response;
pub mod session;
pub mod state;
pub mod uds;

pub use catalog::{ServiceCatalog, ServiceDescriptor, ServiceKind};
pub use config::CatalogConfig;
pub use dispatcher::dispatch;
pub use ecu::EcuSession;
pub use error::{CatalogError, ConfigError, DecodeError, StateError};
pub use request::{DtcGroup, Request, TransferRequest};
pub use response::{DtcReport, PositiveResponse, Response};
pub use session::Session;
pub use state::{Dtc, DtcStatus, EcuProfile, EcuState, DEFAULT_VIN};
pub use uds::NegativeResponseCode;
