// src/payload/mod.rs

//! Payload preparation
//!
//! - [`PhaseBus`] publishes where the current preparation run is
//! - [`PayloadManager`] (re)starts the run on a worker thread
//! - [`switcher`] replaces the installation source between runs
//! - [`PayloadBackend`] is what a concrete payload has to provide

mod backend;
mod manager;
mod phase;
pub mod simulated;
mod source;
pub mod switcher;

pub use backend::{BackendError, PayloadBackend, PayloadKind};
pub use manager::{ERROR_MD, ERROR_SETUP, ERROR_SOURCE, PayloadManager, RestartOptions};
pub use phase::{ListenerId, PayloadPhase, PhaseBus};
pub use simulated::SimulatedPayload;
pub use source::{OVERRIDE_SOURCE_TYPES, SourceHandle, SourceSetupError, SourceType};
