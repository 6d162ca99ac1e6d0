// src/payload/manager.rs

//! Payload restart coordination
//!
//! [`PayloadManager::restart`] starts a supervisor worker which waits for the
//! previous preparation run, starts a new pipeline worker, waits for it and
//! publishes `Terminated`. The supervisor runs under a well-known name, so a
//! restart requested while one is already pending is dropped.
//!
//! ```text
//! restart() ──► payload-restart ──► wait(payload)
//!                                   start(payload) ──► pipeline
//!                                   wait(payload)
//!                                   Terminated
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use super::backend::PayloadBackend;
use super::phase::{ListenerId, PayloadPhase, PhaseBus};
use crate::threads::{
    STORAGE_THREADS, THREAD_PAYLOAD, THREAD_PAYLOAD_RESTART, THREAD_SUBSCRIPTION,
    THREAD_WAIT_FOR_CONNECTING_NM, ThreadRegistry,
};
use crate::Error;

/// Summary shown when the payload could not be set up
pub const ERROR_SETUP: &str = "Failed to set up installation source";

/// Summary shown when repository metadata could not be loaded
pub const ERROR_MD: &str = "Error downloading package metadata";

/// Summary shown when there is no payload to prepare
pub const ERROR_SOURCE: &str = "No installation source available";

/// Knobs for one preparation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartOptions {
    /// Fall back to the default repositories if the base repo fails
    pub fallback: bool,
    /// Check for a mounted installation medium
    pub checkmount: bool,
    /// Skip the metadata download when the loaded repositories are still valid
    pub only_on_change: bool,
}

impl Default for RestartOptions {
    fn default() -> Self {
        Self {
            fallback: false,
            checkmount: true,
            only_on_change: false,
        }
    }
}

/// Restarts the payload preparation pipeline on demand
pub struct PayloadManager {
    threads: Arc<ThreadRegistry>,
    bus: Arc<PhaseBus>,
    /// Payload of the last requested run
    payload: Mutex<Option<Weak<dyn PayloadBackend>>>,
}

impl PayloadManager {
    /// Create a manager that runs its workers on `threads`
    pub fn new(threads: Arc<ThreadRegistry>) -> Self {
        Self {
            threads,
            bus: Arc::new(PhaseBus::new()),
            payload: Mutex::new(None),
        }
    }

    /// Phase bus the pipeline publishes on
    pub fn bus(&self) -> &Arc<PhaseBus> {
        &self.bus
    }

    /// Shortcut for `bus().add_listener(...)`
    pub fn add_listener<F>(&self, phase: PayloadPhase, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.bus.add_listener(phase, listener)
    }

    /// Phase of the current (or last) run
    pub fn current_phase(&self) -> Option<PayloadPhase> {
        self.bus.current()
    }

    /// Message recorded by the last failed run
    pub fn last_error(&self) -> Option<String> {
        self.bus.error()
    }

    /// Whether a supervisor or pipeline worker is registered
    pub fn running(&self) -> bool {
        self.threads.exists(THREAD_PAYLOAD_RESTART) || self.threads.exists(THREAD_PAYLOAD)
    }

    /// Whether the payload of the last run was dropped
    pub fn payload_released(&self) -> bool {
        self.payload
            .lock()
            .as_ref()
            .is_none_or(|payload| payload.strong_count() == 0)
    }

    /// Request a new preparation run for `payload`
    ///
    /// Returns immediately. Returns `false` when a restart was already
    /// pending and this request was folded into it. The manager keeps only a
    /// weak reference; the caller owns the payload.
    pub fn restart(&self, payload: &Arc<dyn PayloadBackend>, options: RestartOptions) -> bool {
        let weak = Arc::downgrade(payload);
        let threads = Arc::clone(&self.threads);
        let bus = Arc::clone(&self.bus);
        let supervised = weak.clone();

        let started = self.threads.start(THREAD_PAYLOAD_RESTART, move || {
            supervise(&threads, &bus, supervised, options);
            Ok(())
        });

        match started {
            Ok(_) => {
                info!("Restarting payload thread ({:?})", options);
                *self.payload.lock() = Some(weak);
                true
            }
            Err(Error::DuplicateName(_)) => {
                debug!("Payload restart already pending, not starting another");
                false
            }
            Err(e) => {
                error!("Unable to restart payload thread: {}", e);
                false
            }
        }
    }

    /// Block until the pending restart, if any, has run to completion
    pub fn wait(&self) {
        for name in [THREAD_PAYLOAD_RESTART, THREAD_PAYLOAD] {
            if let Err(e) = self.threads.wait(name) {
                warn!("{}", e);
            }
        }
    }
}

/// Supervisor worker body
fn supervise(
    threads: &Arc<ThreadRegistry>,
    bus: &Arc<PhaseBus>,
    payload: Weak<dyn PayloadBackend>,
    options: RestartOptions,
) {
    if let Err(e) = threads.wait(THREAD_PAYLOAD) {
        warn!("Previous payload run ended with an uncaught error: {}", e);
    }

    let pipeline = Pipeline {
        threads: Arc::clone(threads),
        bus: Arc::clone(bus),
        payload,
        options,
    };

    match threads.start(THREAD_PAYLOAD, move || {
        pipeline.run();
        Ok(())
    }) {
        Ok(_) => {
            if let Err(e) = threads.wait(THREAD_PAYLOAD) {
                bus.fail(format!("{}: {:#}", ERROR_SETUP, e.error));
            }
        }
        Err(e) => bus.fail(format!("{}: {}", ERROR_SETUP, e)),
    }

    bus.set_state(PayloadPhase::Terminated);
}

/// One preparation run
struct Pipeline {
    threads: Arc<ThreadRegistry>,
    bus: Arc<PhaseBus>,
    payload: Weak<dyn PayloadBackend>,
    options: RestartOptions,
}

impl Pipeline {
    fn run(&self) {
        self.bus.set_state(PayloadPhase::Started);

        let Some(payload) = self.payload.upgrade() else {
            error!("Payload was released before its preparation started");
            self.bus.fail(ERROR_SOURCE);
            return;
        };
        let payload = payload.as_ref();

        self.bus.set_state(PayloadPhase::WaitingStorage);
        for name in STORAGE_THREADS {
            self.wait_for(name);
        }

        self.bus.set_state(PayloadPhase::WaitingNetwork);
        self.wait_for(THREAD_WAIT_FOR_CONNECTING_NM);

        self.wait_for(THREAD_SUBSCRIPTION);

        if let Err(e) = payload.setup() {
            self.abort(payload, format!("{}: {}", ERROR_SETUP, e));
            return;
        }

        if !payload.is_package_based() {
            self.bus.set_state(PayloadPhase::Finished);
            return;
        }

        if self.options.only_on_change {
            self.bus.set_state(PayloadPhase::VerifyingAvailability);
            if payload.verify_available_repositories() {
                info!("Repositories unchanged, skipping metadata download");
                self.bus.set_state(PayloadPhase::Finished);
                return;
            }
        }

        self.bus.set_state(PayloadPhase::DownloadingPkgMetadata);
        let updated = payload
            .update_base_repo(self.options.fallback, self.options.checkmount)
            .and_then(|()| payload.add_driver_repos());
        if let Err(e) = updated {
            self.abort(payload, format!("{}: {}", ERROR_MD, e));
            return;
        }

        self.bus.set_state(PayloadPhase::DownloadingGroupMetadata);
        if let Err(e) = payload.gather_repo_metadata() {
            self.abort(payload, format!("{}: {}", ERROR_MD, e));
            return;
        }
        if payload.base_repo().is_none() {
            error!("No base repo configured");
            self.abort(payload, ERROR_MD.to_string());
            return;
        }

        if let Err(e) = payload.post_setup() {
            self.abort(payload, format!("{}: {}", ERROR_SETUP, e));
            return;
        }

        self.bus.set_state(PayloadPhase::Finished);
    }

    /// Wait on an activity owned by another module
    ///
    /// Its failure is that module's to report, so it is only logged here.
    fn wait_for(&self, name: &str) {
        if let Err(e) = self.threads.wait(name) {
            warn!("Continuing payload setup after {}", e);
        }
    }

    fn abort(&self, payload: &dyn PayloadBackend, message: String) {
        error!("{}", message);
        self.bus.fail(message);
        if let Err(e) = payload.unsetup() {
            warn!("Failed to clean up payload after error: {}", e);
        }
    }
}
