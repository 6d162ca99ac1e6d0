// src/payload/backend.rs

//! Payload backend contract
//!
//! Concrete backends (DNF, live image, RPM-OSTree) live behind the module
//! bus. The orchestration layer needs only the calls below; package-specific
//! calls have no-op defaults so image-based backends can ignore them.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use super::source::{SourceHandle, SourceSetupError, SourceType};
use crate::task::Task;

/// Payload implementation behind the backend
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadKind {
    /// Package-based installation through DNF
    Dnf,
    /// Copy of the running live system
    LiveOs,
    /// Tarball or image file deployment
    LiveImage,
    /// OSTree commit deployment
    RpmOstree,
}

impl PayloadKind {
    /// Whether this payload downloads repository metadata
    pub fn is_package_based(self) -> bool {
        self == Self::Dnf
    }
}

/// Error raised by a payload backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{0}")]
    Failed(String),

    #[error("repository {repo}: {reason}")]
    Repository { repo: String, reason: String },

    #[error("No base repo configured")]
    NoBaseRepo,

    #[error(transparent)]
    Source(#[from] SourceSetupError),
}

impl BackendError {
    /// Plain backend failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Calls the payload manager, source switcher and subscription workflow
/// make against a payload
pub trait PayloadBackend: Send + Sync {
    /// Payload implementation
    fn kind(&self) -> PayloadKind;

    /// Prepare the payload (mount sources, read configuration)
    fn setup(&self) -> Result<(), BackendError>;

    /// Undo `setup` after a failed run
    fn unsetup(&self) -> Result<(), BackendError>;

    /// Final step of a successful run
    fn post_setup(&self) -> Result<(), BackendError>;

    /// Resolve the base repository
    fn update_base_repo(&self, _fallback: bool, _checkmount: bool) -> Result<(), BackendError> {
        Ok(())
    }

    /// Add repositories found on driver disks
    fn add_driver_repos(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Download repository and group metadata
    fn gather_repo_metadata(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Whether the already-loaded repositories are still reachable
    fn verify_available_repositories(&self) -> bool {
        false
    }

    /// Base repository identifier, once resolved
    fn base_repo(&self) -> Option<String> {
        None
    }

    /// Whether any attached source needs the network
    fn needs_network(&self) -> bool;

    /// Whether the payload is ready for installation
    fn is_ready(&self) -> bool;

    /// Currently attached sources, first one is the active source
    fn sources(&self) -> Vec<SourceHandle>;

    /// Replace the attached sources
    fn set_sources(&self, sources: Vec<SourceHandle>) -> Result<(), SourceSetupError>;

    /// Create a detached source of the given type
    fn create_source(&self, source_type: SourceType) -> Result<SourceHandle, SourceSetupError>;

    /// Task that sets up every attached source
    fn set_up_sources_task(&self) -> Box<dyn Task<Error = SourceSetupError>>;

    /// Task that tears down every attached source
    fn tear_down_sources_task(&self) -> Box<dyn Task<Error = SourceSetupError>>;

    /// Shortcut for `kind().is_package_based()`
    fn is_package_based(&self) -> bool {
        self.kind().is_package_based()
    }
}
