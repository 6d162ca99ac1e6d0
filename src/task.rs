// src/task.rs

//! Backend tasks
//!
//! Module backends hand out long-running work as task objects with a
//! start / wait / finish cycle. The orchestration layer always drives them
//! synchronously from the calling thread with [`sync_run_task`].

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// A unit of backend work driven through start / wait / finish
pub trait Task: Send {
    /// Error reported by `finish`
    type Error;

    /// Human-readable task name for logs
    fn name(&self) -> &str;

    /// Begin the work; must not block on it
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Block until the work is done
    fn wait(&mut self);

    /// Collect the outcome after `wait`
    fn finish(&mut self) -> Result<(), Self::Error>;
}

/// Run a task to completion on the current thread
pub fn sync_run_task<T>(task: &mut T) -> Result<(), T::Error>
where
    T: Task + ?Sized,
{
    debug!("Running task {}", task.name());
    task.start()?;
    task.wait();
    let result = task.finish();
    debug!("Task {} finished", task.name());
    result
}

type Work<E> = Box<dyn FnOnce() -> Result<(), E> + Send>;

/// Task backed by a closure running on its own OS thread
///
/// A panic inside the closure is resumed on the thread that waits.
pub struct ThreadTask<E> {
    name: String,
    work: Option<Work<E>>,
    handle: Option<JoinHandle<thread::Result<Result<(), E>>>>,
    outcome: Option<Result<(), E>>,
}

impl<E> ThreadTask<E>
where
    E: Send + 'static,
{
    /// Wrap `work` as a task called `name`
    pub fn new<F>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        Self {
            name: name.into(),
            work: Some(Box::new(work)),
            handle: None,
            outcome: None,
        }
    }

    /// Box the task for a backend trait object
    pub fn boxed<F>(name: impl Into<String>, work: F) -> Box<dyn Task<Error = E>>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        Box::new(Self::new(name, work))
    }
}

impl<E> Task for ThreadTask<E>
where
    E: Send + 'static,
{
    type Error = E;

    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), E> {
        if let Some(work) = self.work.take() {
            self.handle = Some(thread::spawn(move || {
                panic::catch_unwind(AssertUnwindSafe(work))
            }));
        }
        Ok(())
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let joined = match handle.join() {
                Ok(caught) => caught,
                Err(payload) => Err(payload),
            };
            match joined {
                Ok(result) => self.outcome = Some(result),
                Err(payload) => panic::resume_unwind(payload),
            }
        }
    }

    fn finish(&mut self) -> Result<(), E> {
        if self.handle.is_some() {
            self.wait();
        }
        self.outcome.take().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_sync_run_task_success() {
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let mut task: ThreadTask<String> = ThreadTask::new("mark", move || {
            r.store(true, Ordering::SeqCst);
            Ok(())
        });

        sync_run_task(&mut task).unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sync_run_task_error() {
        let mut task = ThreadTask::boxed("fail", || Err("no medium".to_string()));
        let err = sync_run_task(task.as_mut()).unwrap_err();
        assert_eq!(err, "no medium");
    }

    #[test]
    fn test_finish_without_wait() {
        let mut task: ThreadTask<String> = ThreadTask::new("quick", || Ok(()));
        task.start().unwrap();
        assert!(task.finish().is_ok());
        // A second finish has nothing left to report
        assert!(task.finish().is_ok());
    }

    #[test]
    #[should_panic(expected = "backend exploded")]
    fn test_panic_resumed_on_waiter() {
        let mut task: ThreadTask<String> = ThreadTask::new("boom", || panic!("backend exploded"));
        let _ = sync_run_task(&mut task);
    }
}
