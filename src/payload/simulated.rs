// src/payload/simulated.rs

//! In-memory payload backend
//!
//! Behaves like a real backend from the orchestration layer's point of view
//! without touching disks or the network. Used by `anaconda simulate` and by
//! the tests. Failures can be injected per step; every call is recorded.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::backend::{BackendError, PayloadBackend, PayloadKind};
use super::source::{SourceHandle, SourceSetupError, SourceType};
use crate::task::{Task, ThreadTask};

const SOURCE_PATH_PREFIX: &str = "/org/fedoraproject/Anaconda/Modules/Payloads/Source";

#[derive(Default)]
struct State {
    sources: Vec<SourceHandle>,
    sources_ready: bool,
    base_repo: Option<String>,
    next_source: u32,
    calls: Vec<String>,
}

#[derive(Default, Clone)]
struct Faults {
    setup: Option<String>,
    metadata: Option<String>,
    post_setup: Option<String>,
    source_setup: Option<String>,
}

/// Payload backend kept entirely in memory
pub struct SimulatedPayload {
    kind: PayloadKind,
    state: Arc<Mutex<State>>,
    faults: Faults,
    provides_base_repo: bool,
    repositories_available: bool,
}

impl SimulatedPayload {
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(State::default())),
            faults: Faults::default(),
            provides_base_repo: true,
            repositories_available: false,
        }
    }

    /// Attach sources of the given types
    pub fn with_sources(self, types: &[SourceType]) -> Self {
        {
            let mut state = self.state.lock();
            for source_type in types {
                let handle = next_handle(&mut state, *source_type);
                state.sources.push(handle);
            }
        }
        self
    }

    /// Make `setup` fail with `message`
    pub fn fail_setup(mut self, message: impl Into<String>) -> Self {
        self.faults.setup = Some(message.into());
        self
    }

    /// Make `update_base_repo` fail with `message`
    pub fn fail_metadata(mut self, message: impl Into<String>) -> Self {
        self.faults.metadata = Some(message.into());
        self
    }

    /// Make `post_setup` fail with `message`
    pub fn fail_post_setup(mut self, message: impl Into<String>) -> Self {
        self.faults.post_setup = Some(message.into());
        self
    }

    /// Make the set-up-sources task fail with `message`
    pub fn fail_source_setup(mut self, message: impl Into<String>) -> Self {
        self.faults.source_setup = Some(message.into());
        self
    }

    /// Never resolve a base repository
    pub fn without_base_repo(mut self) -> Self {
        self.provides_base_repo = false;
        self
    }

    /// Report the loaded repositories as still valid
    pub fn with_available_repositories(mut self) -> Self {
        self.repositories_available = true;
        self
    }

    /// Whether the attached sources are currently set up
    pub fn sources_ready(&self) -> bool {
        self.state.lock().sources_ready
    }

    /// Backend calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn supports(&self, source_type: SourceType) -> bool {
        match self.kind {
            PayloadKind::Dnf => !matches!(source_type, SourceType::RpmOstree | SourceType::Flatpak),
            PayloadKind::RpmOstree => {
                matches!(source_type, SourceType::RpmOstree | SourceType::Flatpak)
            }
            PayloadKind::LiveImage => source_type == SourceType::Url,
            PayloadKind::LiveOs => false,
        }
    }

    fn step(&self, call: &str) {
        debug!("Simulated payload: {}", call);
        self.state.lock().calls.push(call.to_string());
    }
}

fn next_handle(state: &mut State, source_type: SourceType) -> SourceHandle {
    state.next_source += 1;
    SourceHandle::new(
        format!("{}/{}", SOURCE_PATH_PREFIX, state.next_source),
        source_type,
    )
}

fn fault(message: Option<&str>) -> Result<(), BackendError> {
    match message {
        Some(message) => Err(BackendError::new(message)),
        None => Ok(()),
    }
}

impl PayloadBackend for SimulatedPayload {
    fn kind(&self) -> PayloadKind {
        self.kind
    }

    fn setup(&self) -> Result<(), BackendError> {
        self.step("setup");
        fault(self.faults.setup.as_deref())?;
        self.state.lock().sources_ready = true;
        Ok(())
    }

    fn unsetup(&self) -> Result<(), BackendError> {
        self.step("unsetup");
        let mut state = self.state.lock();
        state.sources_ready = false;
        state.base_repo = None;
        Ok(())
    }

    fn post_setup(&self) -> Result<(), BackendError> {
        self.step("post_setup");
        fault(self.faults.post_setup.as_deref())
    }

    fn update_base_repo(&self, fallback: bool, checkmount: bool) -> Result<(), BackendError> {
        self.step(&format!("update_base_repo(fallback={}, checkmount={})", fallback, checkmount));
        fault(self.faults.metadata.as_deref())?;

        let mut state = self.state.lock();
        state.base_repo = if self.provides_base_repo {
            let origin = state
                .sources
                .first()
                .map_or(SourceType::ClosestMirror, SourceHandle::source_type);
            Some(format!("anaconda-{}", origin.as_ref().to_ascii_lowercase()))
        } else {
            None
        };
        Ok(())
    }

    fn add_driver_repos(&self) -> Result<(), BackendError> {
        self.step("add_driver_repos");
        Ok(())
    }

    fn gather_repo_metadata(&self) -> Result<(), BackendError> {
        self.step("gather_repo_metadata");
        Ok(())
    }

    fn verify_available_repositories(&self) -> bool {
        self.step("verify_available_repositories");
        self.repositories_available
    }

    fn base_repo(&self) -> Option<String> {
        self.state.lock().base_repo.clone()
    }

    fn needs_network(&self) -> bool {
        self.state
            .lock()
            .sources
            .iter()
            .any(|s| s.source_type().requires_network())
    }

    fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.sources_ready && (!self.kind.is_package_based() || state.base_repo.is_some())
    }

    fn sources(&self) -> Vec<SourceHandle> {
        self.state.lock().sources.clone()
    }

    fn set_sources(&self, sources: Vec<SourceHandle>) -> Result<(), SourceSetupError> {
        if let Some(unsupported) = sources.iter().find(|s| !self.supports(s.source_type())) {
            return Err(SourceSetupError::Unsupported(unsupported.source_type()));
        }
        let mut state = self.state.lock();
        state.calls.push("set_sources".to_string());
        state.sources = sources;
        state.sources_ready = false;
        Ok(())
    }

    fn create_source(&self, source_type: SourceType) -> Result<SourceHandle, SourceSetupError> {
        if !self.supports(source_type) {
            return Err(SourceSetupError::Unsupported(source_type));
        }
        let mut state = self.state.lock();
        state.calls.push(format!("create_source({})", source_type));
        Ok(next_handle(&mut state, source_type))
    }

    fn set_up_sources_task(&self) -> Box<dyn Task<Error = SourceSetupError>> {
        let state = Arc::clone(&self.state);
        let failure = self.faults.source_setup.clone();
        ThreadTask::boxed("SetUpSourcesTask", move || {
            let mut state = state.lock();
            state.calls.push("set_up_sources".to_string());
            if let Some(message) = failure {
                return Err(SourceSetupError::SetUp(message));
            }
            state.sources_ready = true;
            Ok(())
        })
    }

    fn tear_down_sources_task(&self) -> Box<dyn Task<Error = SourceSetupError>> {
        let state = Arc::clone(&self.state);
        ThreadTask::boxed("TearDownSourcesTask", move || {
            let mut state = state.lock();
            state.calls.push("tear_down_sources".to_string());
            state.sources_ready = false;
            Ok(())
        })
    }
}
