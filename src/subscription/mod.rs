// src/subscription/mod.rs

//! Registration with the subscription service
//!
//! The workflow in [`workflow`] drives the subscription backend through
//! set-config, unregister, register-and-attach, optionally moves the payload
//! to the CDN (or back) and asks the payload manager for a fresh run.

mod backend;
mod request;
pub mod simulated;
mod workflow;

pub use backend::{SubscriptionBackend, SubscriptionTask};
pub use request::{
    AuthenticationMethod, HttpProxy, SecretData, SecretDataList, SecretKind, SubscriptionRequest,
};
pub use simulated::SimulatedSubscription;
pub use workflow::SubscriptionWorkflow;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Progress reported by the registration workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionPhase {
    Unregister,
    Register,
    /// Reported by backends that attach separately; the combined
    /// register task covers it otherwise
    AttachSubscription,
    Done,
}

impl SubscriptionPhase {
    /// Status line for the phase
    pub fn description(self) -> &'static str {
        match self {
            Self::Unregister => "Unregistering...",
            Self::Register => "Registering...",
            Self::AttachSubscription => "Attaching subscription...",
            Self::Done => "Registered.",
        }
    }
}

/// Failure reported through the workflow's error callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Unregistration failed: {0}")]
    Unregistration(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Satellite provisioning failed: {0}")]
    SatelliteProvisioning(String),

    /// The account belongs to several organizations and none was chosen
    #[error("Multiple organizations found, please specify one: {0}")]
    MultipleOrganizations(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),
}
