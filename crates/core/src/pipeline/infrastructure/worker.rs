use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} thread did not finish within {timeout:?}")]
    JoinTimeout { name: String, timeout: Duration },
    #[error("{name} thread panicked")]
    Panicked { name: String },
}

/// A named background thread that can be joined with a deadline.
pub struct Worker<T> {
    name: String,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| WorkerError::Spawn {
                name: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Joins the thread if it finishes before `deadline`.
    ///
    /// `budget` is the timeout the deadline was derived from and is what a
    /// [`WorkerError::JoinTimeout`] reports. On timeout the thread is
    /// detached and left to exit on its own.
    pub fn join_until(self, deadline: Instant, budget: Duration) -> Result<T, WorkerError> {
        while !self.handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("{} thread still running at shutdown deadline", self.name);
                return Err(WorkerError::JoinTimeout {
                    timeout: budget,
                    name: self.name,
                });
            }
            thread::sleep(Duration::from_millis(5).min(deadline - now));
        }
        self.handle
            .join()
            .map_err(|_| WorkerError::Panicked { name: self.name })
    }

    pub fn join_within(self, timeout: Duration) -> Result<T, WorkerError> {
        self.join_until(Instant::now() + timeout, timeout)
    }
}
