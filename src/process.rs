//! Blocking execution of external tools with line-by-line output streaming.
//!
//! Each invocation runs to completion on the calling thread. Standard output
//! is handed to a callback one line at a time while the tool is still
//! running; standard error is drained on a helper thread and returned once
//! the process has exited. The running child is parked in a shared slot so
//! another thread can kill it through a [`ProcessHandle`].

use crate::EngineError;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(10);

/// Shared handle to the external process currently run by an engine.
///
/// Cloning is cheap; every clone refers to the same slot.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle {
    slot: Arc<Mutex<Option<Child>>>,
}

impl ProcessHandle {
    /// Creates an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` while an external process is running.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Forcibly terminates the running process, if any.
    ///
    /// Returns `true` when a process was signalled. The blocked runner
    /// observes the exit and reports it as a failure of its stage.
    pub fn kill(&self) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(child) => {
                log::warn!("terminating external process {}", child.id());
                if let Err(e) = child.kill() {
                    // Already exited between the last poll and now.
                    log::debug!("kill failed: {}", e);
                }
                true
            }
            None => false,
        }
    }

    /// Kills the running process and waits up to `grace` for it to exit.
    ///
    /// Returns `true` once the slot is empty. A runner blocked in [`run`]
    /// reaps its own child; a child left behind (after a panic in the
    /// runner) is reaped here.
    pub fn terminate(&self, grace: Duration) -> bool {
        self.kill();
        let deadline = Instant::now() + grace;
        loop {
            {
                let mut guard = self.lock();
                let Some(child) = guard.as_mut() else {
                    return true;
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        log::debug!("reaped external process: {}", status);
                        *guard = None;
                        return true;
                    }
                    Ok(None) => {}
                    Err(e) => log::debug!("try_wait failed: {}", e),
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WAIT_POLL);
        }
    }
}

/// Outcome of one finished invocation.
#[derive(Debug)]
pub struct Invocation {
    /// Exit status of the process.
    pub status: ExitStatus,
    /// Everything the process wrote to standard error.
    pub stderr: String,
}

impl Invocation {
    /// Exit code, `None` if the process was killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs `program` in `cwd` and streams its standard output to `on_line`.
///
/// Lines are decoded lossily and stripped of trailing whitespace. The call
/// blocks until the process exits; there is no timeout.
///
/// # Errors
///
/// [`EngineError::Spawn`] if the program cannot be started and
/// [`EngineError::Io`] if its output cannot be read.
pub fn run<I, S>(
    program: &Path,
    args: I,
    cwd: &Path,
    handle: &ProcessHandle,
    on_line: &mut dyn FnMut(&str),
) -> Result<Invocation, EngineError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::debug!(">> {:?}", command);

    let mut child = command.spawn().map_err(|source| EngineError::Spawn {
        program: program.display().to_string(),
        source,
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    *handle.lock() = Some(child);

    let drain = stderr.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                log::warn!("failed to read stderr: {}", e);
            }
            buf
        })
    });

    let streamed = match stdout {
        Some(pipe) => stream_lines(pipe, on_line),
        None => Ok(()),
    };
    let status = wait(handle)?;
    let stderr = drain
        .and_then(|t| t.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default();
    streamed?;

    log::debug!("<< {:?} exited with {}", program, status);
    Ok(Invocation { status, stderr })
}

fn stream_lines<R: Read>(pipe: R, on_line: &mut dyn FnMut(&str)) -> std::io::Result<()> {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end());
    }
}

/// Polls the parked child until it exits, releasing the slot between polls
/// so [`ProcessHandle::kill`] never waits on us.
fn wait(handle: &ProcessHandle) -> Result<ExitStatus, EngineError> {
    loop {
        {
            let mut guard = handle.lock();
            let Some(child) = guard.as_mut() else {
                return Err(EngineError::Io(std::io::Error::other(
                    "external process disappeared while waiting",
                )));
            };
            if let Some(status) = child.try_wait()? {
                *guard = None;
                return Ok(status);
            }
        }
        thread::sleep(WAIT_POLL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> &'static Path {
        Path::new("/bin/sh")
    }

    #[test]
    fn test_streams_stdout_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::new();
        let mut lines = Vec::new();
        let inv = run(
            sh(),
            ["-c", "echo first; echo second; echo oops >&2"],
            dir.path(),
            &handle,
            &mut |l| lines.push(l.to_string()),
        )
        .unwrap();
        assert!(inv.success());
        assert_eq!(lines, vec!["first", "second"]);
        assert_eq!(inv.stderr.trim(), "oops");
        assert!(!handle.is_running());
    }

    #[test]
    fn test_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let inv = run(sh(), ["-c", "exit 3"], dir.path(), &ProcessHandle::new(), &mut |_| {})
            .unwrap();
        assert!(!inv.success());
        assert_eq!(inv.code(), Some(3));
    }

    #[test]
    fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let mut lines = Vec::new();
        run(
            sh(),
            ["-c", "cat marker.txt"],
            dir.path(),
            &ProcessHandle::new(),
            &mut |l| lines.push(l.to_string()),
        )
        .unwrap();
        assert_eq!(lines, vec!["here"]);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = run(
            Path::new("textonic-no-such-program"),
            ["x"],
            dir.path(),
            &ProcessHandle::new(),
            &mut |_| {},
        );
        assert!(matches!(r, Err(EngineError::Spawn { .. })));
    }

    #[test]
    fn test_kill_from_other_thread() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::new();
        let killer = handle.clone();
        let t = thread::spawn(move || {
            for _ in 0..500 {
                if killer.kill() {
                    return true;
                }
                thread::sleep(Duration::from_millis(10));
            }
            false
        });
        let inv = run(sh(), ["-c", "exec sleep 30"], dir.path(), &handle, &mut |_| {}).unwrap();
        assert!(t.join().unwrap());
        assert!(!inv.success());
        assert_eq!(inv.code(), None);
        assert!(!handle.kill());
    }

    #[test]
    fn test_terminate_reaps_left_behind_child() {
        let handle = ProcessHandle::new();
        *handle.lock() = Some(Command::new(sh()).args(["-c", "exec sleep 30"]).spawn().unwrap());
        assert!(handle.is_running());

        let started = Instant::now();
        assert!(handle.terminate(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!handle.is_running());
        assert!(handle.terminate(Duration::from_millis(10)));
    }
}
