// src/subscription/backend.rs

//! Subscription backend contract
//!
//! Mirrors the method surface of the subscription module on the bus: two
//! properties and three tasks. Task errors already carry their final
//! [`SubscriptionError`] variant; the workflow passes them on untouched.

use super::SubscriptionError;
use super::request::SubscriptionRequest;
use crate::task::Task;

/// Boxed task returned by a subscription backend
pub type SubscriptionTask = Box<dyn Task<Error = SubscriptionError>>;

/// What the registration workflow needs from the subscription module
pub trait SubscriptionBackend: Send + Sync {
    /// Whether the system is currently registered
    fn is_registered(&self) -> bool;

    /// Snapshot of the current request
    fn subscription_request(&self) -> SubscriptionRequest;

    /// Push server hostname, base URL and proxy from the request into RHSM
    fn set_rhsm_config_task(&self) -> SubscriptionTask;

    /// Unregister the system
    fn unregister_task(&self) -> SubscriptionTask;

    /// Register and attach entitlements (or rely on Simple Content Access);
    /// provisions Satellite first when the server hostname points at one
    fn register_and_subscribe_task(&self) -> SubscriptionTask;
}
