// src/lib.rs

//! Anaconda installer orchestration
//!
//! The asynchronous backbone of the installer: named worker threads, the
//! payload preparation pipeline with its observable phases, installation
//! source switching and the subscription registration workflow.
//!
//! # Architecture
//!
//! - Threads: long work runs on named OS threads; everything else waits on
//!   the names (`threads`)
//! - Phases: a payload run publishes its progress on a bus that replays the
//!   current phase to late listeners (`payload`)
//! - Restarts: at most one payload run is in flight; extra requests are
//!   folded into the pending one
//! - Backends: payload and subscription modules are traits, driven through
//!   start / wait / finish tasks (`task`)

pub mod cmdline;
pub mod config;
mod error;
pub mod orchestrator;
pub mod payload;
pub mod subscription;
pub mod task;
pub mod threads;

pub use cmdline::{BootArgs, CmdlineError, PrefixPolicy};
pub use config::{ConfigError, DEFAULT_CONFIG_PATH, InstallerConfig};
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use payload::{
    BackendError, PayloadBackend, PayloadKind, PayloadManager, PayloadPhase, PhaseBus,
    RestartOptions, SourceSetupError, SourceType,
};
pub use subscription::{
    SubscriptionBackend, SubscriptionError, SubscriptionPhase, SubscriptionRequest,
    SubscriptionWorkflow,
};
pub use task::{Task, ThreadTask, sync_run_task};
pub use threads::{ThreadHandle, ThreadRegistry, UncaughtError};
