// src/subscription/workflow.rs

//! Register / unregister workflow
//!
//! ```text
//! register_and_subscribe:
//!   wait network ─► set RHSM config ─► [registered? UNREGISTER] ─► REGISTER
//!   ─► [package payload on CDROM/HDD/NFS/mirror? switch to CDN]
//!   ─► [restart requested and on CDN? restart payload] ─► DONE
//!
//! unregister:
//!   [not registered? DONE] ─► set RHSM config ─► UNREGISTER
//!   ─► [package payload on CDN? switch back] ─► [restart payload] ─► DONE
//! ```
//!
//! Errors go to the error callback exactly once and end the workflow without
//! `DONE`. The source is always switched before the payload restart is
//! requested, so the new run sees the new source.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::{SubscriptionBackend, SubscriptionTask};
use super::{SubscriptionError, SubscriptionPhase};
use crate::payload::switcher::{current_source_type, switch_source};
use crate::payload::{PayloadBackend, PayloadManager, RestartOptions, SourceType};
use crate::task::sync_run_task;
use crate::threads::{THREAD_SUBSCRIPTION, THREAD_WAIT_FOR_CONNECTING_NM, ThreadHandle, ThreadRegistry};

/// Drives registration and unregistration against a subscription backend
///
/// Nothing is kept between calls. The source type a registration replaced is
/// returned to the caller, who hands it back to [`unregister`](Self::unregister).
pub struct SubscriptionWorkflow {
    threads: Arc<ThreadRegistry>,
    subscription: Arc<dyn SubscriptionBackend>,
    payload_manager: Arc<PayloadManager>,
    restart_options: RestartOptions,
}

impl SubscriptionWorkflow {
    pub fn new(
        threads: Arc<ThreadRegistry>,
        subscription: Arc<dyn SubscriptionBackend>,
        payload_manager: Arc<PayloadManager>,
    ) -> Self {
        Self {
            threads,
            subscription,
            payload_manager,
            restart_options: RestartOptions::default(),
        }
    }

    /// Options used when the workflow restarts the payload
    pub fn with_restart_options(mut self, options: RestartOptions) -> Self {
        self.restart_options = options;
        self
    }

    /// Register the system and move a package payload to the CDN
    ///
    /// Returns the source type the CDN replaced, so the caller can hand it
    /// back to [`unregister`](Self::unregister) later.
    pub fn register_and_subscribe<P, E>(
        &self,
        payload: &Arc<dyn PayloadBackend>,
        mut progress: P,
        on_error: E,
        restart_payload: bool,
    ) -> Option<SourceType>
    where
        P: FnMut(SubscriptionPhase),
        E: FnOnce(SubscriptionError),
    {
        match self.try_register_and_subscribe(payload, &mut progress, restart_payload) {
            Ok(replaced) => {
                progress(SubscriptionPhase::Done);
                replaced
            }
            Err(e) => {
                warn!("Registration workflow failed: {}", e);
                on_error(e);
                None
            }
        }
    }

    /// Unregister the system and move a CDN payload back to
    /// `overridden_source_type`
    ///
    /// Returns whether the workflow reached `DONE`.
    pub fn unregister<P, E>(
        &self,
        payload: &Arc<dyn PayloadBackend>,
        overridden_source_type: Option<SourceType>,
        mut progress: P,
        on_error: E,
        restart_payload: bool,
    ) -> bool
    where
        P: FnMut(SubscriptionPhase),
        E: FnOnce(SubscriptionError),
    {
        match self.try_unregister(payload, overridden_source_type, &mut progress, restart_payload) {
            Ok(()) => {
                progress(SubscriptionPhase::Done);
                true
            }
            Err(e) => {
                warn!("Unregistration workflow failed: {}", e);
                on_error(e);
                false
            }
        }
    }

    /// Run [`register_and_subscribe`](Self::register_and_subscribe) on the
    /// `subscription` worker, which the payload pipeline waits on
    pub fn spawn_register_and_subscribe<P, E>(
        self: &Arc<Self>,
        payload: Arc<dyn PayloadBackend>,
        progress: P,
        on_error: E,
        restart_payload: bool,
    ) -> crate::Result<ThreadHandle>
    where
        P: FnMut(SubscriptionPhase) + Send + 'static,
        E: FnOnce(SubscriptionError) + Send + 'static,
    {
        let workflow = Arc::clone(self);
        self.threads.start(THREAD_SUBSCRIPTION, move || {
            workflow.register_and_subscribe(&payload, progress, on_error, restart_payload);
            Ok(())
        })
    }

    /// Run [`unregister`](Self::unregister) on the `subscription` worker
    pub fn spawn_unregister<P, E>(
        self: &Arc<Self>,
        payload: Arc<dyn PayloadBackend>,
        overridden_source_type: Option<SourceType>,
        progress: P,
        on_error: E,
        restart_payload: bool,
    ) -> crate::Result<ThreadHandle>
    where
        P: FnMut(SubscriptionPhase) + Send + 'static,
        E: FnOnce(SubscriptionError) + Send + 'static,
    {
        let workflow = Arc::clone(self);
        self.threads.start(THREAD_SUBSCRIPTION, move || {
            workflow.unregister(&payload, overridden_source_type, progress, on_error, restart_payload);
            Ok(())
        })
    }

    fn try_register_and_subscribe(
        &self,
        payload: &Arc<dyn PayloadBackend>,
        progress: &mut dyn FnMut(SubscriptionPhase),
        restart_payload: bool,
    ) -> Result<Option<SourceType>, SubscriptionError> {
        self.wait_for_network();

        debug!("Applying RHSM configuration");
        run_task(self.subscription.set_rhsm_config_task())?;

        if self.subscription.is_registered() {
            progress(SubscriptionPhase::Unregister);
            run_task(self.subscription.unregister_task())?;
        }

        progress(SubscriptionPhase::Register);
        let request = self.subscription.subscription_request();
        if !request.is_authentication_sufficient() {
            return Err(SubscriptionError::Registration(
                "not enough authentication data provided".to_string(),
            ));
        }
        run_task(self.subscription.register_and_subscribe_task())?;
        info!("System registered ({})", request.authentication);

        let mut source_type = current_source_type(payload.as_ref());
        let mut replaced = None;
        if payload.is_package_based()
            && let Some(original) = source_type.filter(|t| t.is_overridable())
        {
            info!("Overriding {} installation source with the CDN", original);
            switch(payload.as_ref(), SourceType::Cdn)?;
            source_type = Some(SourceType::Cdn);
            replaced = Some(original);
        }

        if restart_payload && source_type == Some(SourceType::Cdn) {
            debug!("Restarting payload after registration");
            self.payload_manager.restart(payload, self.restart_options);
        }

        Ok(replaced)
    }

    fn try_unregister(
        &self,
        payload: &Arc<dyn PayloadBackend>,
        overridden_source_type: Option<SourceType>,
        progress: &mut dyn FnMut(SubscriptionPhase),
        restart_payload: bool,
    ) -> Result<(), SubscriptionError> {
        if !self.subscription.is_registered() {
            debug!("System is not registered, nothing to unregister");
            return Ok(());
        }

        debug!("Applying RHSM configuration");
        run_task(self.subscription.set_rhsm_config_task())?;

        progress(SubscriptionPhase::Unregister);
        run_task(self.subscription.unregister_task())?;
        info!("System unregistered");

        let source_type = current_source_type(payload.as_ref());
        let mut switched = false;
        if payload.is_package_based()
            && source_type == Some(SourceType::Cdn)
            && let Some(original) = overridden_source_type
        {
            info!("Restoring {} installation source", original);
            switch(payload.as_ref(), original)?;
            switched = true;
        }

        if restart_payload && (source_type == Some(SourceType::Cdn) || switched) {
            debug!("Restarting payload after unregistration");
            self.payload_manager.restart(payload, self.restart_options);
        }

        Ok(())
    }

    fn wait_for_network(&self) {
        if let Err(e) = self.threads.wait(THREAD_WAIT_FOR_CONNECTING_NM) {
            warn!("Continuing registration after {}", e);
        }
    }
}

fn run_task(mut task: SubscriptionTask) -> Result<(), SubscriptionError> {
    sync_run_task(task.as_mut())
}

fn switch(payload: &dyn PayloadBackend, source_type: SourceType) -> Result<(), SubscriptionError> {
    switch_source(payload, source_type)
        .map(|_| ())
        .map_err(|e| SubscriptionError::Subscription(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PayloadKind, SimulatedPayload};
    use parking_lot::Mutex;
    use crate::subscription::{SecretData, SimulatedSubscription, SubscriptionRequest};

    fn credentials() -> SubscriptionRequest {
        SubscriptionRequest {
            account_username: "admin".into(),
            account_password: SecretData::text("secret"),
            ..Default::default()
        }
    }

    fn workflow(backend: SimulatedSubscription) -> SubscriptionWorkflow {
        let threads = Arc::new(ThreadRegistry::new());
        let manager = Arc::new(PayloadManager::new(Arc::clone(&threads)));
        SubscriptionWorkflow::new(threads, Arc::new(backend), manager)
    }

    fn dnf_on(source: SourceType) -> Arc<dyn PayloadBackend> {
        Arc::new(SimulatedPayload::new(PayloadKind::Dnf).with_sources(&[source]))
    }

    #[test]
    fn test_register_switches_cdrom_to_cdn() {
        let workflow = workflow(SimulatedSubscription::new().with_request(credentials()));
        let payload = dnf_on(SourceType::Cdrom);
        let mut phases = Vec::new();
        let mut errors = Vec::new();

        let replaced = workflow.register_and_subscribe(
            &payload,
            |phase| phases.push(phase),
            |e| errors.push(e),
            false,
        );

        assert_eq!(replaced, Some(SourceType::Cdrom));
        assert_eq!(phases, vec![SubscriptionPhase::Register, SubscriptionPhase::Done]);
        assert!(errors.is_empty());
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdn));
    }

    #[test]
    fn test_register_when_registered_unregisters_first() {
        let backend = SimulatedSubscription::new().with_request(credentials()).registered();
        let workflow = workflow(backend.clone());
        let payload = dnf_on(SourceType::Url);
        let mut phases = Vec::new();

        let replaced = workflow.register_and_subscribe(&payload, |p| phases.push(p), |_| {}, false);

        assert_eq!(replaced, None);
        assert_eq!(
            phases,
            vec![
                SubscriptionPhase::Unregister,
                SubscriptionPhase::Register,
                SubscriptionPhase::Done
            ]
        );
        assert_eq!(
            backend.calls(),
            vec!["set_rhsm_config", "unregister", "register_and_subscribe"]
        );
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Url));
    }

    #[test]
    fn test_insufficient_credentials_fail_after_register_phase() {
        let backend = SimulatedSubscription::new();
        let workflow = workflow(backend.clone());
        let payload = dnf_on(SourceType::Cdrom);
        let mut phases = Vec::new();
        let mut errors = Vec::new();

        workflow.register_and_subscribe(&payload, |p| phases.push(p), |e| errors.push(e), false);

        assert_eq!(phases, vec![SubscriptionPhase::Register]);
        assert!(matches!(errors.as_slice(), [SubscriptionError::Registration(_)]));
        assert_eq!(backend.calls(), vec!["set_rhsm_config"]);
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdrom));
    }

    #[test]
    fn test_backend_error_passed_through_once() {
        let failure = SubscriptionError::SatelliteProvisioning("no such host".into());
        let workflow = workflow(
            SimulatedSubscription::new()
                .with_request(credentials())
                .fail_register(failure.clone()),
        );
        let payload = dnf_on(SourceType::Cdrom);
        let mut phases = Vec::new();
        let errors = Mutex::new(Vec::new());

        workflow.register_and_subscribe(&payload, |p| phases.push(p), |e| errors.lock().push(e), false);

        assert_eq!(*errors.lock(), vec![failure]);
        assert!(!phases.contains(&SubscriptionPhase::Done));
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdrom));
    }

    #[test]
    fn test_live_payload_keeps_source() {
        let workflow = workflow(SimulatedSubscription::new().with_request(credentials()));
        let payload: Arc<dyn PayloadBackend> = Arc::new(
            SimulatedPayload::new(PayloadKind::LiveImage).with_sources(&[SourceType::Url]),
        );

        let replaced = workflow.register_and_subscribe(&payload, |_| {}, |_| {}, false);

        assert_eq!(replaced, None);
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Url));
    }

    #[test]
    fn test_unregister_restores_source() {
        let backend = SimulatedSubscription::new().registered();
        let workflow = workflow(backend.clone());
        let payload = dnf_on(SourceType::Cdn);
        let mut phases = Vec::new();

        let done =
            workflow.unregister(&payload, Some(SourceType::Nfs), |p| phases.push(p), |_| {}, false);

        assert!(done);
        assert_eq!(phases, vec![SubscriptionPhase::Unregister, SubscriptionPhase::Done]);
        assert!(!backend.is_registered());
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Nfs));
    }

    #[test]
    fn test_unregister_without_override_stays_on_cdn() {
        let workflow = workflow(SimulatedSubscription::new().registered());
        let payload = dnf_on(SourceType::Cdn);

        workflow.unregister(&payload, None, |_| {}, |_| {}, false);

        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdn));
    }

    #[test]
    fn test_unregister_when_not_registered_only_reports_done() {
        let backend = SimulatedSubscription::new();
        let workflow = workflow(backend.clone());
        let payload = dnf_on(SourceType::Cdn);
        let mut phases = Vec::new();

        workflow.unregister(&payload, Some(SourceType::Cdrom), |p| phases.push(p), |_| {}, false);

        assert_eq!(phases, vec![SubscriptionPhase::Done]);
        assert!(backend.calls().is_empty());
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdn));
    }

    #[test]
    fn test_unregister_failure_reported() {
        let failure = SubscriptionError::Unregistration("server unreachable".into());
        let workflow = workflow(
            SimulatedSubscription::new()
                .registered()
                .fail_unregister(failure.clone()),
        );
        let payload = dnf_on(SourceType::Cdn);
        let mut phases = Vec::new();
        let mut errors = Vec::new();

        let done = workflow.unregister(
            &payload,
            Some(SourceType::Cdrom),
            |p| phases.push(p),
            |e| errors.push(e),
            false,
        );

        assert!(!done);
        assert_eq!(phases, vec![SubscriptionPhase::Unregister]);
        assert_eq!(errors, vec![failure]);
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdn));
    }

    #[test]
    fn test_rhsm_config_failure_stops_registration() {
        let failure = SubscriptionError::Subscription("rhsm.conf is read-only".into());
        let backend = SimulatedSubscription::new()
            .with_request(credentials())
            .fail_set_config(failure.clone());
        let workflow = workflow(backend.clone());
        let payload = dnf_on(SourceType::Cdrom);
        let mut phases = Vec::new();
        let mut errors = Vec::new();

        let replaced =
            workflow.register_and_subscribe(&payload, |p| phases.push(p), |e| errors.push(e), true);

        assert_eq!(replaced, None);
        assert_eq!(errors, vec![failure]);
        assert!(phases.is_empty());
        assert_eq!(backend.calls(), vec!["set_rhsm_config"]);
        assert!(!backend.is_registered());
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdrom));
    }

    #[test]
    fn test_rhsm_config_failure_stops_unregistration() {
        let failure = SubscriptionError::Subscription("rhsm.conf is read-only".into());
        let backend = SimulatedSubscription::new()
            .registered()
            .fail_set_config(failure.clone());
        let workflow = workflow(backend.clone());
        let payload = dnf_on(SourceType::Cdn);
        let mut phases = Vec::new();
        let mut errors = Vec::new();

        let done = workflow.unregister(
            &payload,
            Some(SourceType::Cdrom),
            |p| phases.push(p),
            |e| errors.push(e),
            true,
        );

        assert!(!done);
        assert_eq!(errors, vec![failure]);
        assert!(phases.is_empty());
        assert_eq!(backend.calls(), vec!["set_rhsm_config"]);
        assert!(backend.is_registered());
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Cdn));
    }

    #[test]
    fn test_spawned_registration_runs_on_subscription_thread() {
        let threads = Arc::new(ThreadRegistry::new());
        let manager = Arc::new(PayloadManager::new(Arc::clone(&threads)));
        let backend = SimulatedSubscription::new().with_request(credentials());
        let workflow = Arc::new(SubscriptionWorkflow::new(
            Arc::clone(&threads),
            Arc::new(backend.clone()),
            manager,
        ));
        let phases = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&phases);

        let handle = workflow
            .spawn_register_and_subscribe(
                dnf_on(SourceType::Hdd),
                move |p| recorded.lock().push(p),
                |_| {},
                false,
            )
            .unwrap();
        assert_eq!(handle.name(), THREAD_SUBSCRIPTION);

        threads.wait(THREAD_SUBSCRIPTION).unwrap();
        assert!(backend.is_registered());
        assert_eq!(phases.lock().last(), Some(&SubscriptionPhase::Done));
    }

    #[test]
    fn test_spawned_unregistration_restores_source() {
        let threads = Arc::new(ThreadRegistry::new());
        let manager = Arc::new(PayloadManager::new(Arc::clone(&threads)));
        let backend = SimulatedSubscription::new().registered();
        let workflow = Arc::new(SubscriptionWorkflow::new(
            Arc::clone(&threads),
            Arc::new(backend.clone()),
            manager,
        ));
        let payload = dnf_on(SourceType::Cdn);

        workflow
            .spawn_unregister(
                Arc::clone(&payload),
                Some(SourceType::Hdd),
                |_| {},
                |e| panic!("unexpected error: {}", e),
                false,
            )
            .unwrap();

        threads.wait(THREAD_SUBSCRIPTION).unwrap();
        assert!(!backend.is_registered());
        assert_eq!(current_source_type(payload.as_ref()), Some(SourceType::Hdd));
    }
}
