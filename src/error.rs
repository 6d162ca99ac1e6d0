// src/error.rs

//! Crate-wide error type
//!
//! Component-specific errors (`BackendError`, `SourceSetupError`,
//! `SubscriptionError`, ...) live next to the code that produces them and
//! convert into [`Error`] for callers that only want one type.

use thiserror::Error;

use crate::cmdline::CmdlineError;
use crate::config::ConfigError;
use crate::payload::{BackendError, SourceSetupError};
use crate::subscription::SubscriptionError;
use crate::threads::UncaughtError;

/// Errors produced by the orchestration layer
#[derive(Error, Debug)]
pub enum Error {
    /// Worker names must be non-empty
    #[error("Thread name must not be empty")]
    EmptyThreadName,

    /// A worker with this name is already registered
    #[error("Thread {0} is already running")]
    DuplicateName(String),

    /// The operating system refused to spawn a worker
    #[error("Failed to spawn thread {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A worker finished with an error that has now been observed
    #[error(transparent)]
    Uncaught(#[from] UncaughtError),

    /// Payload backend failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Installation source could not be set up or torn down
    #[error(transparent)]
    Source(#[from] SourceSetupError),

    /// Subscription workflow failure
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Boot argument parsing failure
    #[error(transparent)]
    Cmdline(#[from] CmdlineError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
