//! Background pipeline worker.
//!
//! The engine lives on its own thread; callers submit jobs and read one-way
//! [`Event`]s back. At most one job is in flight: a submission while busy is
//! rejected rather than queued.

use crate::engine::Engine;
use crate::process::ProcessHandle;
use crate::{EngineConfig, EngineError, OutputFormat};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Notification from the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// One line of tool output.
    Progress(String),
    /// Absolute path of a freshly rendered PNG.
    Preview(PathBuf),
    /// The job ended: artifact path, or a human-readable failure.
    Finished(Result<PathBuf, String>),
}

/// Submission errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    /// A job is still running.
    #[error("a render is already in progress")]
    Busy,

    /// The worker has shut down.
    #[error("worker has shut down")]
    Closed,
}

struct Job {
    source: Vec<u8>,
    format: OutputFormat,
}

/// Handle to the background render thread.
#[derive(Debug)]
pub struct Worker {
    jobs: Option<Sender<Job>>,
    events: Receiver<Event>,
    busy: Arc<AtomicBool>,
    process: ProcessHandle,
    session_dir: PathBuf,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("bytes", &self.source.len())
            .field("format", &self.format)
            .finish()
    }
}

impl Worker {
    /// Creates an engine and starts the thread that owns it.
    pub fn spawn(config: EngineConfig) -> Result<Self, EngineError> {
        let engine = Engine::new(config)?;
        let process = engine.process_handle();
        let session_dir = engine
            .dir()
            .map(Path::to_path_buf)
            .ok_or(EngineError::SessionClosed)?;

        let (job_tx, job_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let busy = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name("textonic-worker".to_string())
            .spawn({
                let busy = Arc::clone(&busy);
                move || run_jobs(engine, job_rx, event_tx, busy)
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            events: event_rx,
            busy,
            process,
            session_dir,
            thread: Some(thread),
        })
    }

    /// Starts rendering `source` to `format`.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Busy`] while the previous job has not finished.
    pub fn submit(&self, source: impl Into<Vec<u8>>, format: OutputFormat) -> Result<(), WorkerError> {
        let jobs = self.jobs.as_ref().ok_or(WorkerError::Closed)?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WorkerError::Busy);
        }
        let job = Job {
            source: source.into(),
            format,
        };
        if jobs.send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(WorkerError::Closed);
        }
        Ok(())
    }

    /// Whether a job is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Event stream of the worker.
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Scratch directory of the worker's engine.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Kills the external process of the current job, which then finishes
    /// with an error.
    pub fn cancel(&self) -> bool {
        self.process.kill()
    }

    /// Cancels any running job, stops the thread, and removes the session.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        // A job between two tool invocations would start the next one after
        // a single kill, so keep killing until the thread is gone.
        while !thread.is_finished() {
            self.process.kill();
            thread::sleep(Duration::from_millis(10));
        }
        if thread.join().is_err() {
            log::error!("worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_jobs(mut engine: Engine, jobs: Receiver<Job>, events: Sender<Event>, busy: Arc<AtomicBool>) {
    for job in jobs {
        log::debug!("worker picked up {:?}", job);
        let mut forward = |line: &str| {
            let _ = events.send(Event::Progress(line.to_string()));
        };
        let outcome = engine
            .render(&job.source, job.format, Some(&mut forward))
            .and_then(|rel| engine.artifact_path(&rel));

        if let (Ok(path), OutputFormat::Png) = (&outcome, job.format) {
            let _ = events.send(Event::Preview(path.clone()));
        }
        busy.store(false, Ordering::SeqCst);
        let _ = events.send(Event::Finished(outcome.map_err(|e| e.to_string())));
    }
    log::debug!("job queue closed, tearing down");
    engine.teardown();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_finished(worker: &Worker) -> Result<PathBuf, String> {
        loop {
            match worker.events().recv_timeout(Duration::from_secs(10)) {
                Ok(Event::Finished(result)) => return result,
                Ok(_) => continue,
                Err(e) => panic!("no Finished event: {}", e),
            }
        }
    }

    #[test]
    fn test_failed_job_reports_message_and_frees_worker() {
        let config = EngineConfig {
            latex: PathBuf::from("textonic-missing-latex"),
            ..Default::default()
        };
        let worker = Worker::spawn(config).unwrap();
        worker
            .submit("\\documentclass{article}", OutputFormat::Png)
            .unwrap();
        let err = wait_finished(&worker).unwrap_err();
        assert!(err.contains("textonic-missing-latex"), "{}", err);
        assert!(!worker.is_busy());
        assert!(worker.submit("again", OutputFormat::Eps).is_ok());
        let _ = wait_finished(&worker);
    }

    #[test]
    fn test_shutdown_removes_session() {
        let worker = Worker::spawn(EngineConfig::default()).unwrap();
        let dir = worker.session_dir().to_path_buf();
        assert!(dir.is_dir());
        worker.shutdown();
        assert!(!dir.exists());
    }
}
