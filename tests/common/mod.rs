// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use anaconda::payload::{PayloadBackend, PayloadKind, PayloadPhase, PhaseBus, SimulatedPayload, SourceType};
use anaconda::subscription::{SecretData, SubscriptionRequest};
use anaconda::ThreadRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

/// Every phase a bus can publish
pub const ALL_PHASES: [PayloadPhase; 9] = [
    PayloadPhase::Started,
    PayloadPhase::WaitingStorage,
    PayloadPhase::WaitingNetwork,
    PayloadPhase::VerifyingAvailability,
    PayloadPhase::DownloadingPkgMetadata,
    PayloadPhase::DownloadingGroupMetadata,
    PayloadPhase::Finished,
    PayloadPhase::Error,
    PayloadPhase::Terminated,
];

/// Record every phase published on `bus`, in order.
pub fn record_phases(bus: &PhaseBus) -> Arc<Mutex<Vec<PayloadPhase>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for phase in ALL_PHASES {
        let log = Arc::clone(&log);
        bus.add_listener(phase, move || log.lock().push(phase));
    }
    log
}

/// Register a worker called `name` that runs until the returned sender is
/// used or dropped.
pub fn start_blocked(threads: &ThreadRegistry, name: &str) -> Sender<()> {
    let (release, gate) = mpsc::channel::<()>();
    threads
        .start(name, move || {
            let _ = gate.recv();
            Ok(())
        })
        .unwrap();
    release
}

/// Poll until `check` holds, failing the test after five seconds.
pub fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A simulated payload, both as its concrete type and as a backend.
pub fn simulated(
    kind: PayloadKind,
    sources: &[SourceType],
) -> (Arc<SimulatedPayload>, Arc<dyn PayloadBackend>) {
    let concrete = Arc::new(SimulatedPayload::new(kind).with_sources(sources));
    let backend: Arc<dyn PayloadBackend> = concrete.clone();
    (concrete, backend)
}

/// A request that passes the username/password sufficiency check.
pub fn credentials() -> SubscriptionRequest {
    SubscriptionRequest {
        account_username: "admin".to_string(),
        account_password: SecretData::text("redhat"),
        ..Default::default()
    }
}

/// How many times `phase` appears in `log`.
pub fn count(log: &Mutex<Vec<PayloadPhase>>, phase: PayloadPhase) -> usize {
    log.lock().iter().filter(|p| **p == phase).count()
}
