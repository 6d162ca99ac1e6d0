// src/orchestrator.rs

//! Composition root
//!
//! Owns one thread registry, one payload manager and one subscription
//! workflow, all sharing the same registry so the well-known thread names
//! connect them. Backends are injected.
//!
//! The orchestrator remembers which source type registration replaced with
//! the CDN. A registration that replaces nothing (the payload was already
//! on the CDN) keeps the remembered type; a successful unregistration
//! clears it.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::InstallerConfig;
use crate::payload::switcher::{get_source, set_up_sources};
use crate::payload::{PayloadBackend, PayloadManager, PayloadPhase, SourceHandle, SourceType};
use crate::subscription::{SubscriptionBackend, SubscriptionError, SubscriptionPhase, SubscriptionWorkflow};
use crate::threads::{THREAD_SUBSCRIPTION, ThreadHandle, ThreadRegistry, UncaughtError};
use crate::Result;

/// Installer orchestration for one payload and one subscription backend
pub struct Orchestrator {
    config: InstallerConfig,
    threads: Arc<ThreadRegistry>,
    payload: Arc<dyn PayloadBackend>,
    payload_manager: Arc<PayloadManager>,
    workflow: Arc<SubscriptionWorkflow>,
    overridden_source: Arc<Mutex<Option<SourceType>>>,
}

impl Orchestrator {
    pub fn new(
        config: InstallerConfig,
        threads: Arc<ThreadRegistry>,
        payload: Arc<dyn PayloadBackend>,
        subscription: Arc<dyn SubscriptionBackend>,
    ) -> Self {
        let payload_manager = Arc::new(PayloadManager::new(Arc::clone(&threads)));
        let workflow = SubscriptionWorkflow::new(
            Arc::clone(&threads),
            subscription,
            Arc::clone(&payload_manager),
        )
        .with_restart_options(config.restart_options());

        Self {
            config,
            threads,
            payload,
            payload_manager,
            workflow: Arc::new(workflow),
            overridden_source: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn threads(&self) -> &Arc<ThreadRegistry> {
        &self.threads
    }

    pub fn payload(&self) -> &Arc<dyn PayloadBackend> {
        &self.payload
    }

    pub fn payload_manager(&self) -> &Arc<PayloadManager> {
        &self.payload_manager
    }

    pub fn workflow(&self) -> &Arc<SubscriptionWorkflow> {
        &self.workflow
    }

    /// Source type the CDN replaced, restored by [`unregister`](Self::unregister)
    pub fn overridden_source_type(&self) -> Option<SourceType> {
        *self.overridden_source.lock()
    }

    /// Attach the configured initial source if the payload has none and set
    /// it up
    pub fn prepare_sources(&self) -> Result<Option<SourceHandle>> {
        let default_type = self.config.initial_source_type(self.payload.kind());
        let source = get_source(self.payload.as_ref(), default_type)?;
        if let Some(source) = &source {
            info!("Installation source: {}", source);
            set_up_sources(self.payload.as_ref())?;
        }
        Ok(source)
    }

    /// Start a payload preparation run with the configured options
    pub fn restart_payload(&self) -> bool {
        self.payload_manager
            .restart(&self.payload, self.config.restart_options())
    }

    /// Register in the background on the `subscription` thread
    ///
    /// A running payload pipeline waits for this before setting up.
    pub fn register<P, E>(&self, progress: P, on_error: E) -> Result<ThreadHandle>
    where
        P: FnMut(SubscriptionPhase) + Send + 'static,
        E: FnOnce(SubscriptionError) + Send + 'static,
    {
        debug!("Starting registration");
        let workflow = Arc::clone(&self.workflow);
        let payload = Arc::clone(&self.payload);
        let overridden = Arc::clone(&self.overridden_source);
        self.threads.start(THREAD_SUBSCRIPTION, move || {
            let replaced = workflow.register_and_subscribe(&payload, progress, on_error, true);
            if let Some(replaced) = replaced {
                *overridden.lock() = Some(replaced);
            }
            Ok(())
        })
    }

    /// Unregister in the background, restoring the source registration
    /// replaced
    pub fn unregister<P, E>(&self, progress: P, on_error: E) -> Result<ThreadHandle>
    where
        P: FnMut(SubscriptionPhase) + Send + 'static,
        E: FnOnce(SubscriptionError) + Send + 'static,
    {
        debug!("Starting unregistration");
        let workflow = Arc::clone(&self.workflow);
        let payload = Arc::clone(&self.payload);
        let overridden = Arc::clone(&self.overridden_source);
        self.threads.start(THREAD_SUBSCRIPTION, move || {
            let restore = *overridden.lock();
            debug!("Restoring {:?} after unregistration", restore);
            if workflow.unregister(&payload, restore, progress, on_error, true) {
                *overridden.lock() = None;
            }
            Ok(())
        })
    }

    /// Block until the pending payload run is over and report how it ended
    ///
    /// A running registration is waited for first, since it may request
    /// the run.
    pub fn wait_for_payload(&self) -> Option<PayloadPhase> {
        if let Err(e) = self.threads.wait(THREAD_SUBSCRIPTION) {
            warn!("{}", e);
        }
        self.payload_manager.wait();
        self.payload_manager.current_phase()
    }

    /// Wait for every worker and collect the errors nobody observed
    pub fn shutdown(&self) -> Vec<UncaughtError> {
        let errors = self.threads.wait_all();
        for error in &errors {
            warn!("{}", error);
        }
        errors
    }
}
