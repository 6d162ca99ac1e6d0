// src/threads/mod.rs

//! Named worker threads
//!
//! The installer runs its long preparation work (storage discovery, network
//! activation, subscription, payload setup) on OS threads that are known by
//! name. Other parts of the installer wait on those names instead of holding
//! join handles, so a producer and its consumers only have to agree on the
//! strings in [`names`](self::THREAD_PAYLOAD).
//!
//! # Lifecycle
//!
//! ```text
//! start(name) ──► registered ──► target runs ──┬─ Ok  ──► removed
//!                                              └─ Err ──► retained with error
//!                                                          │
//!                                              wait(name) ◄┘ (error handed
//!                                                            over, removed)
//! ```
//!
//! A target that panics is treated like one that returned an error. The
//! registry never cancels anything; targets stop cooperatively.

mod names;

pub use names::*;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use thiserror::Error;
use tracing::{debug, error};

use crate::{Error, Result};

/// Error a worker target raised and nobody had observed yet
#[derive(Error, Debug)]
#[error("Thread {thread} failed: {error:#}")]
pub struct UncaughtError {
    /// Name of the worker that failed
    pub thread: String,
    /// What the target returned (or the panic message)
    pub error: anyhow::Error,
}

/// Callback invoked on the failing worker thread with the worker name
pub type ErrorHook = Arc<dyn Fn(&str, &anyhow::Error) + Send + Sync>;

type WorkerMap = Arc<Mutex<HashMap<String, Arc<Worker>>>>;

enum WorkerState {
    Running,
    /// The error is taken by the first `wait` that sees it
    Finished(Option<anyhow::Error>),
}

struct Worker {
    name: String,
    started_at: DateTime<Utc>,
    state: Mutex<WorkerState>,
    done: Condvar,
    join: Mutex<Option<JoinHandle<()>>>,
    /// Set by the worker thread before the target runs
    thread_id: Mutex<Option<ThreadId>>,
}

impl Worker {
    fn new(name: String) -> Self {
        Self {
            name,
            started_at: Utc::now(),
            state: Mutex::new(WorkerState::Running),
            done: Condvar::new(),
            join: Mutex::new(None),
            thread_id: Mutex::new(None),
        }
    }

    /// Whether the calling thread is this worker's OS thread
    fn is_current(&self) -> bool {
        *self.thread_id.lock() == Some(thread::current().id())
    }

    fn finish(&self, error: Option<anyhow::Error>) {
        *self.state.lock() = WorkerState::Finished(error);
        self.done.notify_all();
    }

    /// Block until the target returned, then take its error (if any)
    fn wait_finished(&self) -> Option<anyhow::Error> {
        let mut state = self.state.lock();
        loop {
            match &mut *state {
                WorkerState::Running => self.done.wait(&mut state),
                WorkerState::Finished(error) => return error.take(),
            }
        }
    }
}

/// Non-owning view of a registered worker
#[derive(Clone)]
pub struct ThreadHandle {
    worker: Arc<Worker>,
}

impl ThreadHandle {
    /// Registry name of the worker
    pub fn name(&self) -> &str {
        &self.worker.name
    }

    /// When the worker was registered
    pub fn started_at(&self) -> DateTime<Utc> {
        self.worker.started_at
    }

    /// Whether the target has returned
    pub fn is_finished(&self) -> bool {
        matches!(*self.worker.state.lock(), WorkerState::Finished(_))
    }

    /// Whether the target failed and the error has not been observed yet
    pub fn has_uncaught_error(&self) -> bool {
        matches!(*self.worker.state.lock(), WorkerState::Finished(Some(_)))
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.worker.name)
            .field("started_at", &self.worker.started_at)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Registry of named worker threads
///
/// Names are unique at any instant. The map is the only shared state; each
/// worker signals its own completion through a condition variable.
#[derive(Default)]
pub struct ThreadRegistry {
    workers: WorkerMap,
    error_hook: Option<ErrorHook>,
}

impl ThreadRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a hook that sees every uncaught worker error
    ///
    /// The hook runs on the failing worker before the error is stored, so it
    /// must not wait on that worker.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &anyhow::Error) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Register `name` and run `target` on a new OS thread
    ///
    /// Arguments are captured by the closure. The worker is visible through
    /// [`exists`](Self::exists) before the target starts running.
    pub fn start<F>(&self, name: impl Into<String>, target: F) -> Result<ThreadHandle>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyThreadName);
        }

        let worker = Arc::new(Worker::new(name.clone()));
        {
            let mut workers = self.workers.lock();
            if workers.contains_key(&name) {
                return Err(Error::DuplicateName(name));
            }
            workers.insert(name.clone(), Arc::clone(&worker));
        }

        let workers = Arc::clone(&self.workers);
        let hook = self.error_hook.clone();
        let running = Arc::clone(&worker);
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(&workers, &running, hook.as_ref(), target));

        match spawned {
            Ok(join) => {
                *worker.join.lock() = Some(join);
                debug!("Started thread {}", name);
                Ok(ThreadHandle { worker })
            }
            Err(source) => {
                remove_worker(&self.workers, &worker);
                Err(Error::SpawnFailed { name, source })
            }
        }
    }

    /// Block until the named worker has finished
    ///
    /// Returns immediately when nothing is registered under `name`, or when
    /// called from that worker itself. A captured error is handed to the
    /// first caller that observes it; later waits see `Ok`.
    pub fn wait(&self, name: &str) -> std::result::Result<(), UncaughtError> {
        let Some(worker) = self.workers.lock().get(name).cloned() else {
            return Ok(());
        };

        if worker.is_current() {
            debug!("Thread {} waiting on itself, skipping", name);
            return Ok(());
        }

        let error = worker.wait_finished();
        if let Some(join) = worker.join.lock().take() {
            // The target already returned; this only reaps the OS thread.
            let _ = join.join();
        }

        match error {
            Some(error) => {
                remove_worker(&self.workers, &worker);
                Err(UncaughtError {
                    thread: worker.name.clone(),
                    error,
                })
            }
            None => Ok(()),
        }
    }

    /// Wait until the registry is empty at the moment it is observed
    ///
    /// Workers started while waiting are waited on as well. Errors found
    /// along the way are collected instead of stopping the sweep.
    pub fn wait_all(&self) -> Vec<UncaughtError> {
        let mut errors = Vec::new();

        loop {
            let mut pending: Vec<String> = self
                .workers
                .lock()
                .values()
                .filter(|worker| !worker.is_current())
                .map(|worker| worker.name.clone())
                .collect();
            pending.sort();
            if pending.is_empty() {
                break;
            }
            for name in pending {
                if let Err(e) = self.wait(&name) {
                    errors.push(e);
                }
            }
        }

        errors
    }

    /// Whether a worker is registered under `name`
    pub fn exists(&self, name: &str) -> bool {
        self.workers.lock().contains_key(name)
    }

    /// Handle for the worker registered under `name`
    pub fn get(&self, name: &str) -> Option<ThreadHandle> {
        self.workers
            .lock()
            .get(name)
            .map(|worker| ThreadHandle {
                worker: Arc::clone(worker),
            })
    }

    /// Names of all registered workers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    /// Whether no worker is registered
    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }
}

fn run_worker<F>(workers: &WorkerMap, worker: &Arc<Worker>, hook: Option<&ErrorHook>, target: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    *worker.thread_id.lock() = Some(thread::current().id());
    let outcome = match panic::catch_unwind(AssertUnwindSafe(target)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "thread panicked: {}",
            panic_message(payload.as_ref())
        )),
    };

    match outcome {
        Ok(()) => {
            debug!("Thread {} finished", worker.name);
            remove_worker(workers, worker);
            worker.finish(None);
        }
        Err(e) => {
            error!("Thread {} failed: {:#}", worker.name, e);
            if let Some(hook) = hook {
                hook(&worker.name, &e);
            }
            worker.finish(Some(e));
        }
    }
}

/// Drop `worker` from the map unless its name was already reused
fn remove_worker(workers: &WorkerMap, worker: &Arc<Worker>) {
    let mut workers = workers.lock();
    if workers
        .get(&worker.name)
        .is_some_and(|registered| Arc::ptr_eq(registered, worker))
    {
        workers.remove(&worker.name);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
