// src/system/process.rs

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::constants::SPAWN_FAILURE_EXIT_STATUS;

/// Requests forwarded to the task supervising a running child.
#[derive(Debug)]
pub(crate) enum Control {
    Kill { force: bool },
    Write(Vec<u8>),
    CloseStdin,
}

struct Inner {
    id: Uuid,
    pid: Option<u32>,
    command: String,
    /// `None` while the child is still running.
    exit_status: Mutex<Option<i32>>,
    exited: Condvar,
    control: Option<UnboundedSender<Control>>,
}

/// A cheap, cloneable reference to one asynchronously running child process.
///
/// The exit status is recorded exactly once by the scheduler; every clone observes it.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.inner.id)
            .field("pid", &self.inner.pid)
            .field("command", &self.inner.command)
            .field("exit_status", &self.exit_status())
            .finish()
    }
}

impl ProcessHandle {
    pub(crate) fn new(pid: Option<u32>, command: String, control: UnboundedSender<Control>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                pid,
                command,
                exit_status: Mutex::new(None),
                exited: Condvar::new(),
                control: Some(control),
            }),
        }
    }

    /// A handle for a process that never started. It is already finished with the
    /// spawn failure status.
    pub(crate) fn failed(command: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                pid: None,
                command,
                exit_status: Mutex::new(Some(SPAWN_FAILURE_EXIT_STATUS)),
                exited: Condvar::new(),
                control: None,
            }),
        }
    }

    fn status_guard(&self) -> MutexGuard<'_, Option<i32>> {
        self.inner
            .exit_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the final status and wakes every waiter. Later calls are ignored.
    pub(crate) fn complete(&self, status: i32) -> bool {
        let mut guard = self.status_guard();
        if guard.is_some() {
            return false;
        }
        *guard = Some(status);
        self.inner.exited.notify_all();
        true
    }

    /// Identity of this handle, unique among all processes started by the crate.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// OS process id, if the child was started.
    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }

    /// The command line as it was requested.
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// The final exit status, or `None` while the process is still running.
    pub fn exit_status(&self) -> Option<i32> {
        *self.status_guard()
    }

    /// Whether an exit status has been recorded.
    pub fn is_finished(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Blocks until the process has exited and returns its status.
    pub fn wait(&self) -> i32 {
        let mut guard = self.status_guard();
        loop {
            if let Some(status) = *guard {
                return status;
            }
            guard = self
                .inner
                .exited
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.status_guard();
        loop {
            if let Some(status) = *guard {
                return Some(status);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (next, _) = self
                .inner
                .exited
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }

    fn send(&self, message: Control) -> bool {
        if self.is_finished() {
            return false;
        }
        match &self.inner.control {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Asks the process to terminate. `force` kills it outright; otherwise a
    /// termination signal is sent where the platform has one. On Unix the signal
    /// goes to the process group, so children of a shell line are stopped too.
    ///
    /// Returns `false` if the process has already finished.
    pub fn kill(&self, force: bool) -> bool {
        log::debug!("Killing process {:?} ('{}'), force: {}", self.pid(), self.command(), force);
        self.send(Control::Kill { force })
    }

    /// Queues `bytes` for the child's standard input.
    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.send(Control::Write(bytes.into()))
    }

    /// Closes the child's standard input so it observes end of file.
    pub fn close_stdin(&self) -> bool {
        self.send(Control::CloseStdin)
    }
}
