// src/subscription/simulated.rs

//! In-memory subscription backend
//!
//! Tracks registration state and records each task that ran. Failures for
//! the set-config, unregister and register tasks can be injected.

use parking_lot::Mutex;
use std::sync::Arc;

use super::SubscriptionError;
use super::backend::{SubscriptionBackend, SubscriptionTask};
use super::request::SubscriptionRequest;
use crate::task::ThreadTask;

#[derive(Default)]
struct State {
    registered: bool,
    request: SubscriptionRequest,
    calls: Vec<String>,
    set_config_error: Option<SubscriptionError>,
    unregister_error: Option<SubscriptionError>,
    register_error: Option<SubscriptionError>,
}

/// Subscription backend kept entirely in memory
#[derive(Clone, Default)]
pub struct SimulatedSubscription {
    state: Arc<Mutex<State>>,
}

impl SimulatedSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `request` as the subscription request
    pub fn with_request(self, request: SubscriptionRequest) -> Self {
        self.state.lock().request = request;
        self
    }

    /// Start out registered
    pub fn registered(self) -> Self {
        self.state.lock().registered = true;
        self
    }

    pub fn fail_set_config(self, error: SubscriptionError) -> Self {
        self.state.lock().set_config_error = Some(error);
        self
    }

    pub fn fail_unregister(self, error: SubscriptionError) -> Self {
        self.state.lock().unregister_error = Some(error);
        self
    }

    pub fn fail_register(self, error: SubscriptionError) -> Self {
        self.state.lock().register_error = Some(error);
        self
    }

    /// Names of the tasks that ran, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn task<F>(&self, name: &'static str, apply: F) -> SubscriptionTask
    where
        F: FnOnce(&mut State) -> Result<(), SubscriptionError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        ThreadTask::boxed(name, move || {
            let mut state = state.lock();
            state.calls.push(name.to_string());
            apply(&mut state)
        })
    }
}

impl SubscriptionBackend for SimulatedSubscription {
    fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    fn subscription_request(&self) -> SubscriptionRequest {
        self.state.lock().request.clone()
    }

    fn set_rhsm_config_task(&self) -> SubscriptionTask {
        self.task("set_rhsm_config", |state| match state.set_config_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        })
    }

    fn unregister_task(&self) -> SubscriptionTask {
        self.task("unregister", |state| {
            if let Some(e) = state.unregister_error.clone() {
                return Err(e);
            }
            state.registered = false;
            Ok(())
        })
    }

    fn register_and_subscribe_task(&self) -> SubscriptionTask {
        self.task("register_and_subscribe", |state| {
            if let Some(e) = state.register_error.clone() {
                return Err(e);
            }
            state.registered = true;
            Ok(())
        })
    }
}
