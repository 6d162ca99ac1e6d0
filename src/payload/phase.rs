// src/payload/phase.rs

//! Payload phases and the phase bus
//!
//! The bus keeps the phase of the current preparation run and a table of
//! listeners per phase. Registering a listener and changing the phase share
//! one lock, so a listener added during a transition fires exactly once for
//! it: either immediately (the phase was already reached) or when the phase
//! arrives.
//!
//! Listeners run on the thread that changes the phase (or that registers
//! them, for replays) while the lock is held. They must be short and must
//! not call back into the bus.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use strum_macros::{AsRefStr, Display};
use tracing::debug;

/// Phase of a payload preparation run
///
/// `Started` through `Finished` are totally ordered. `Error` and
/// `Terminated` are sentinels that compare only to themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadPhase {
    Started,
    WaitingStorage,
    WaitingNetwork,
    VerifyingAvailability,
    DownloadingPkgMetadata,
    DownloadingGroupMetadata,
    Finished,
    /// The run failed; the bus carries the message
    Error,
    /// The pipeline worker exited
    Terminated,
}

impl PayloadPhase {
    /// Ordered phases in run order
    pub const ORDERED: [PayloadPhase; 7] = [
        Self::Started,
        Self::WaitingStorage,
        Self::WaitingNetwork,
        Self::VerifyingAvailability,
        Self::DownloadingPkgMetadata,
        Self::DownloadingGroupMetadata,
        Self::Finished,
    ];

    /// Position in the ordered sequence, `None` for sentinels
    pub fn rank(self) -> Option<usize> {
        Self::ORDERED.iter().position(|p| *p == self)
    }

    pub fn is_ordered(self) -> bool {
        self.rank().is_some()
    }

    /// Status line shown while the run is in this phase
    pub fn description(self) -> &'static str {
        match self {
            Self::Started => "Setting up installation source...",
            Self::WaitingStorage => "Probing storage...",
            Self::WaitingNetwork => "Waiting for network connection...",
            Self::VerifyingAvailability => "Checking software availability...",
            Self::DownloadingPkgMetadata => "Downloading package metadata...",
            Self::DownloadingGroupMetadata => "Downloading group metadata...",
            Self::Finished => "Installation source set up",
            Self::Error => "Error setting up software source",
            Self::Terminated => "Installation source preparation ended",
        }
    }
}

impl PartialOrd for PayloadPhase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

/// Identifies a registered listener for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Returns `false` once the listener's target is gone
type Callback = Arc<dyn Fn() -> bool + Send + Sync>;

struct Registration {
    id: ListenerId,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    /// `None` until the first run starts
    current: Option<PayloadPhase>,
    error: Option<String>,
    listeners: HashMap<PayloadPhase, Vec<Registration>>,
    next_id: u64,
}

impl BusState {
    /// Whether a listener for `phase` has already missed its transition
    fn has_reached(&self, phase: PayloadPhase) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        if phase == PayloadPhase::Error {
            return current == PayloadPhase::Error;
        }
        phase.is_ordered() && phase <= current
    }

    fn notify(&mut self, phase: PayloadPhase) {
        if let Some(listeners) = self.listeners.get_mut(&phase) {
            listeners.retain(|registration| (registration.callback)());
        }
    }
}

/// Multicasts payload phase transitions to listeners
#[derive(Default)]
pub struct PhaseBus {
    state: Mutex<BusState>,
}

impl PhaseBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase of the current run, `None` before the first run
    pub fn current(&self) -> Option<PayloadPhase> {
        self.state.lock().current
    }

    /// Message of the last failed run; cleared when a run starts
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Move to `phase` and run its listeners in registration order
    ///
    /// `Started` clears the recorded error. `Terminated` is delivered but
    /// leaves the current phase untouched, so late listeners still see how
    /// the run ended.
    pub fn set_state(&self, phase: PayloadPhase) {
        debug!("Updating payload thread state: {}", phase);
        let mut state = self.state.lock();
        match phase {
            PayloadPhase::Terminated => {}
            PayloadPhase::Started => {
                state.error = None;
                state.current = Some(phase);
            }
            _ => state.current = Some(phase),
        }
        state.notify(phase);
    }

    /// Record `message` and move to `Error` in one step
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Updating payload thread state: {} ({})", PayloadPhase::Error, message);
        let mut state = self.state.lock();
        state.error = Some(message);
        state.current = Some(PayloadPhase::Error);
        state.notify(PayloadPhase::Error);
    }

    /// Call `listener` every time the bus enters `phase`
    ///
    /// Runs it right away as well when the current run has already reached
    /// `phase` (or is in `Error`, for `Error` listeners).
    pub fn add_listener<F>(&self, phase: PayloadPhase, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(
            phase,
            Arc::new(move || {
                listener();
                true
            }),
        )
    }

    /// Like [`add_listener`](Self::add_listener) but holds `target` weakly
    ///
    /// The registration disappears the first time it fires after `target`
    /// has been dropped, so the bus never keeps UI objects alive.
    pub fn add_weak_listener<T, F>(&self, phase: PayloadPhase, target: &Arc<T>, listener: F) -> ListenerId
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let target: Weak<T> = Arc::downgrade(target);
        self.register(
            phase,
            Arc::new(move || match target.upgrade() {
                Some(target) => {
                    listener(&*target);
                    true
                }
                None => false,
            }),
        )
    }

    /// Unregister a listener; returns whether it was still registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        for listeners in state.listeners.values_mut() {
            if let Some(index) = listeners.iter().position(|r| r.id == id) {
                listeners.remove(index);
                return true;
            }
        }
        false
    }

    /// Number of listeners registered for `phase`
    pub fn listener_count(&self, phase: PayloadPhase) -> usize {
        self.state
            .lock()
            .listeners
            .get(&phase)
            .map_or(0, Vec::len)
    }

    fn register(&self, phase: PayloadPhase, callback: Callback) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_id);
        state.next_id += 1;

        let keep = !state.has_reached(phase) || callback();
        if keep {
            state
                .listeners
                .entry(phase)
                .or_default()
                .push(Registration { id, callback });
        }
        id
    }
}
