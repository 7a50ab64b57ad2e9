// src/system/debug.rs

//! Debug session control.
//!
//! One [`DebugController`] owns at most one debuggee at a time and walks the
//! `Idle -> Starting -> Running -> Exited -> Idle` cycle. The launch itself is delegated
//! to a [`DebugBackend`]; the controller only guarantees the session rules:
//!
//! - `start` is rejected while a session is `Starting` or `Running`.
//! - Every registered exit callback observes each debuggee exit exactly once.
//! - `destroy` may be called at any time, repeatedly, and concurrently with an exit
//!   notification. A debuggee it kills is still reported once, before it returns.

use crate::constants::SPAWN_FAILURE_EXIT_STATUS;
use crate::models::Command;
use crate::system::executor::ExecutionError;
use crate::system::process::ProcessHandle;
use crate::system::shell::{self, ShellError};
use crate::system::terminal::Terminal;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Where a [`DebugController`] is in its session cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    /// No session, or the last one was destroyed.
    Idle,
    /// The backend is launching a debuggee.
    Starting,
    /// A debuggee is alive.
    Running,
    /// The debuggee has exited or failed to launch.
    Exited,
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`DebugController::start`] and its backends.
#[derive(Error, Debug)]
pub enum DebugError {
    #[error("A debug session is already {0}.")]
    SessionActive(DebugState),
    #[error("Failed to launch '{executable}': {source}")]
    Launch {
        executable: String,
        #[source]
        source: ExecutionError,
    },
    #[error("'{0}' is not an executable file.")]
    InvalidTarget(PathBuf),
    #[error("Invalid run arguments: {0}")]
    Arguments(#[from] ShellError),
    #[error("The session was destroyed while it was starting.")]
    Cancelled,
    #[error("Could not start the session waiter: {0}")]
    Waiter(#[source] io::Error),
}

/// What to launch under the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// A path (resolved against `working_dir`) or a program name looked up in PATH.
    pub executable: String,
    pub arguments: Vec<String>,
    /// Extra variables, on top of the inherited environment.
    pub environment: Vec<(String, String)>,
    pub working_dir: PathBuf,
}

impl LaunchRequest {
    /// A request with no arguments and no extra environment.
    pub fn new(executable: impl Into<String>, working_dir: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.into(),
            arguments: Vec::new(),
            environment: Vec::new(),
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Replaces the argument list.
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Builds a request from a run line such as `FOO=1 ./build/app --verbose`.
    pub fn from_command_line(line: &str, working_dir: impl AsRef<Path>) -> Result<Self, DebugError> {
        let parsed = shell::parse_run_arguments(line)?;
        Ok(Self {
            executable: parsed.executable,
            arguments: parsed.arguments,
            environment: parsed.environment,
            working_dir: working_dir.as_ref().to_path_buf(),
        })
    }
}

/// Launches debuggees on behalf of a [`DebugController`].
pub trait DebugBackend: Send + Sync + fmt::Debug {
    /// Starts the debuggee. The returned handle must eventually record an exit status.
    fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandle, DebugError>;

    /// Releases backend resources once a session is torn down.
    fn release(&self) -> Result<(), DebugError> {
        Ok(())
    }
}

/// Runs the debuggee as a captured child process of the terminal.
#[derive(Debug)]
pub struct ProcessBackend {
    terminal: Arc<Terminal>,
}

impl ProcessBackend {
    /// A backend spawning through `terminal`'s executor.
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self { terminal }
    }
}

impl DebugBackend for ProcessBackend {
    fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandle, DebugError> {
        // Paths are resolved against the working directory, bare names against PATH.
        if request.executable.contains(std::path::MAIN_SEPARATOR) || request.executable.contains('/') {
            let target = request.working_dir.join(&request.executable);
            if !target.is_file() {
                return Err(DebugError::InvalidTarget(target));
            }
        } else if cfg!(unix) && !shell::is_executable_in_path(&request.executable) {
            return Err(DebugError::InvalidTarget(PathBuf::from(&request.executable)));
        }

        let command = Command::direct(
            request.executable.clone(),
            request.arguments.iter().cloned(),
            &request.working_dir,
        )
        .with_envs(request.environment.iter().cloned().collect());

        self.terminal
            .try_spawn(&command)
            .map_err(|source| DebugError::Launch {
                executable: request.executable.clone(),
                source,
            })
    }
}

/// Identifies a registered exit callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type ExitListener = Arc<dyn Fn(i32) + Send + Sync>;
type StartListener = Arc<dyn Fn(&ProcessHandle) + Send + Sync>;

#[derive(Debug)]
struct Session {
    state: DebugState,
    /// Bumped by every `start` and `destroy`; a waiter only reports for its own generation.
    generation: u64,
    process: Option<ProcessHandle>,
    waiter: Option<JoinHandle<()>>,
    last_exit: Option<i32>,
    /// True while exit callbacks for the current generation are running.
    notifying: bool,
}

struct Shared {
    session: Mutex<Session>,
    changed: Condvar,
    exit_listeners: Mutex<Vec<(CallbackId, ExitListener)>>,
    start_listeners: Mutex<Vec<StartListener>>,
    next_callback: AtomicU64,
    destroy_lock: Mutex<()>,
    /// Threads currently inside a start or exit callback of this controller.
    callback_threads: Mutex<Vec<ThreadId>>,
    log_events: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn log(&self, message: fmt::Arguments<'_>) {
        if self.log_events {
            log::info!("{}", message);
        } else {
            log::debug!("{}", message);
        }
    }

    /// Marks the calling thread as running callbacks until the guard is dropped.
    fn enter_callbacks(&self) -> impl Drop + '_ {
        let current = thread::current().id();
        lock(&self.callback_threads).push(current);
        scopeguard::guard(current, move |current| {
            let mut threads = lock(&self.callback_threads);
            if let Some(position) = threads.iter().position(|id| *id == current) {
                threads.swap_remove(position);
            }
        })
    }

    fn in_callback(&self) -> bool {
        lock(&self.callback_threads).contains(&thread::current().id())
    }

    fn notify_exit(&self, status: i32) {
        let _active = self.enter_callbacks();
        let listeners: Vec<ExitListener> = lock(&self.exit_listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                log::error!("A debug exit callback panicked");
            }
        }
    }

    fn notify_start(&self, handle: &ProcessHandle) {
        let _active = self.enter_callbacks();
        let listeners: Vec<StartListener> = lock(&self.start_listeners).iter().cloned().collect();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(handle))).is_err() {
                log::error!("A debug start callback panicked");
            }
        }
    }

    /// Ends session `generation` with `status`, notifying each exit callback once.
    /// Does nothing if that session has already ended or been replaced.
    fn finish(&self, generation: u64, from: DebugState, status: i32) {
        {
            let mut session = lock(&self.session);
            if session.generation != generation || session.state != from {
                return;
            }
            session.state = DebugState::Exited;
            session.process = None;
            session.last_exit = Some(status);
            session.notifying = true;
            self.changed.notify_all();
        }

        self.log(format_args!("Debuggee exited with status {}", status));
        self.notify_exit(status);

        let mut session = lock(&self.session);
        if session.generation == generation {
            session.notifying = false;
        }
        self.changed.notify_all();
    }
}

/// Owns the single debug session of a host.
pub struct DebugController {
    backend: Arc<dyn DebugBackend>,
    shared: Arc<Shared>,
}

impl fmt::Debug for DebugController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugController")
            .field("backend", &self.backend)
            .field("state", &self.state())
            .finish()
    }
}

impl DebugController {
    /// A controller launching through `backend`. With `log_events`, session
    /// transitions are logged at `info` instead of `debug`.
    pub fn new(backend: Arc<dyn DebugBackend>, log_events: bool) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    state: DebugState::Idle,
                    generation: 0,
                    process: None,
                    waiter: None,
                    last_exit: None,
                    notifying: false,
                }),
                changed: Condvar::new(),
                exit_listeners: Mutex::new(Vec::new()),
                start_listeners: Mutex::new(Vec::new()),
                next_callback: AtomicU64::new(0),
                destroy_lock: Mutex::new(()),
                callback_threads: Mutex::new(Vec::new()),
                log_events,
            }),
        }
    }

    /// A controller that runs debuggees as child processes of `terminal`.
    pub fn with_terminal(terminal: Arc<Terminal>, log_events: bool) -> Self {
        Self::new(Arc::new(ProcessBackend::new(terminal)), log_events)
    }

    /// Launches a debuggee. Valid from `Idle` or `Exited`.
    ///
    /// A launch failure is reported to every exit callback as `-1` and returned.
    pub fn start(&self, request: LaunchRequest) -> Result<ProcessHandle, DebugError> {
        let shared = &self.shared;
        let (generation, previous_waiter) = {
            let mut session = lock(&shared.session);
            if matches!(session.state, DebugState::Starting | DebugState::Running) {
                return Err(DebugError::SessionActive(session.state));
            }
            session.state = DebugState::Starting;
            session.generation += 1;
            session.last_exit = None;
            (session.generation, session.waiter.take())
        };
        join_waiter(previous_waiter);

        shared.log(format_args!(
            "Starting debuggee '{}' with arguments {:?}",
            request.executable, request.arguments
        ));

        // A panicking backend must not leave the session stuck in `Starting`.
        let rollback = scopeguard::guard(Arc::clone(shared), move |shared| {
            let mut session = lock(&shared.session);
            if session.generation == generation && session.state == DebugState::Starting {
                session.state = DebugState::Idle;
                shared.changed.notify_all();
            }
        });
        let launched = self.backend.launch(&request);
        scopeguard::ScopeGuard::into_inner(rollback);

        let handle = match launched {
            Ok(handle) => handle,
            Err(e) => {
                shared.log(format_args!("Launch of '{}' failed: {}", request.executable, e));
                shared.finish(generation, DebugState::Starting, SPAWN_FAILURE_EXIT_STATUS);
                return Err(e);
            }
        };

        // `destroy` waits out a launch, so a generation change here comes from a
        // callback on this thread.
        let cancelled = |handle: ProcessHandle| -> Result<ProcessHandle, DebugError> {
            handle.kill(true);
            Err(DebugError::Cancelled)
        };
        if lock(&shared.session).generation != generation {
            return cancelled(handle);
        }
        shared.notify_start(&handle);

        let mut session = lock(&shared.session);
        if session.generation != generation {
            drop(session);
            return cancelled(handle);
        }

        // Spawned under the lock so the waiter cannot report before the session is
        // marked running.
        let waiter_shared = Arc::clone(shared);
        let waited = handle.clone();
        let waiter = thread::Builder::new()
            .name("devterm-debug-waiter".to_string())
            .spawn(move || {
                let status = waited.wait();
                waiter_shared.finish(generation, DebugState::Running, status);
            });
        match waiter {
            Ok(waiter) => {
                session.state = DebugState::Running;
                session.process = Some(handle.clone());
                session.waiter = Some(waiter);
                shared.changed.notify_all();
                Ok(handle)
            }
            Err(e) => {
                drop(session);
                handle.kill(true);
                shared.finish(generation, DebugState::Starting, SPAWN_FAILURE_EXIT_STATUS);
                Err(DebugError::Waiter(e))
            }
        }
    }

    /// Tears the session down and returns to `Idle`. Safe to call at any time,
    /// including from a start or exit callback.
    ///
    /// A launch in progress on another thread is allowed to finish first, so the
    /// debuggee it produces is killed and reported before this returns.
    pub fn destroy(&self) {
        let shared = &self.shared;
        // A callback's thread may be the one an outer `destroy` is waiting for.
        let reentrant = shared.in_callback();
        let _serial = (!reentrant).then(|| lock(&shared.destroy_lock));

        let (process, waiter) = {
            let mut session = lock(&shared.session);
            while !reentrant && session.state == DebugState::Starting {
                session = shared
                    .changed
                    .wait(session)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            (session.process.clone(), session.waiter.take())
        };
        if let Some(process) = &process {
            shared.log(format_args!("Destroying session, killing pid {:?}", process.pid()));
            process.kill(true);
        }
        join_waiter(waiter);

        {
            let mut session = lock(&shared.session);
            session.state = DebugState::Idle;
            session.generation += 1;
            session.process = None;
            session.notifying = false;
            shared.changed.notify_all();
        }

        if let Err(e) = self.backend.release() {
            log::warn!("Debug backend did not release cleanly: {}", e);
        }
    }

    /// Blocks until no session is starting, running or notifying, and returns the
    /// last exit status. Gives up with `None` once `timeout` elapses.
    pub fn wait_for_exit(&self, timeout: Option<Duration>) -> Option<i32> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut session = lock(&self.shared.session);
        loop {
            let busy = session.notifying
                || matches!(session.state, DebugState::Starting | DebugState::Running);
            if !busy {
                return session.last_exit;
            }
            session = match deadline {
                None => self
                    .shared
                    .changed
                    .wait(session)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.checked_duration_since(Instant::now())?;
                    self.shared
                        .changed
                        .wait_timeout(session, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Terminates the debuggee; the exit is reported through the callbacks as usual.
    pub fn kill(&self, force: bool) -> bool {
        match self.process() {
            Some(process) => process.kill(force),
            None => false,
        }
    }

    /// Sends `text` to the debuggee's standard input.
    pub fn write(&self, text: &str) -> bool {
        match self.process() {
            Some(process) => process.write(text),
            None => false,
        }
    }

    fn process(&self) -> Option<ProcessHandle> {
        lock(&self.shared.session).process.clone()
    }

    /// The current session state.
    pub fn state(&self) -> DebugState {
        lock(&self.shared.session).state
    }

    /// Whether a debuggee is alive.
    pub fn is_running(&self) -> bool {
        self.state() == DebugState::Running
    }

    /// Process id of the running debuggee.
    pub fn pid(&self) -> Option<u32> {
        self.process().and_then(|p| p.pid())
    }

    /// Exit status of the most recent debuggee, if it has exited.
    pub fn last_exit_status(&self) -> Option<i32> {
        lock(&self.shared.session).last_exit
    }

    /// Registers a callback that receives the exit status of every debuggee,
    /// `-1` for a failed launch.
    pub fn add_exit_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        let id = CallbackId(self.shared.next_callback.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.exit_listeners).push((id, Arc::new(callback)));
        id
    }

    /// Unregisters an exit callback. Returns `false` if it was not registered.
    pub fn remove_exit_callback(&self, id: CallbackId) -> bool {
        let mut listeners = lock(&self.shared.exit_listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Unregisters every exit callback.
    pub fn clear_exit_callbacks(&self) {
        lock(&self.shared.exit_listeners).clear();
    }

    /// Registers a callback that receives the debuggee handle right after launch.
    pub fn add_start_callback<F>(&self, callback: F)
    where
        F: Fn(&ProcessHandle) + Send + Sync + 'static,
    {
        lock(&self.shared.start_listeners).push(Arc::new(callback));
    }
}

impl Drop for DebugController {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Joins a finished session's waiter unless it is the calling thread (a callback
/// calling back into the controller).
fn join_waiter(waiter: Option<JoinHandle<()>>) {
    let Some(waiter) = waiter else {
        return;
    };
    if waiter.thread().id() == thread::current().id() {
        return;
    }
    if waiter.join().is_err() {
        log::warn!("Debug session waiter panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::process::Control;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use tokio::sync::mpsc as tokio_mpsc;

    /// Hands out handles the test completes by hand. A forced kill completes the
    /// handle with 137, the way a SIGKILLed child reports.
    #[derive(Debug, Default)]
    struct FakeBackend {
        fail: bool,
        /// How long each launch takes.
        delay: Option<Duration>,
        launched: Mutex<Vec<ProcessHandle>>,
        /// Debuggees still alive when each launch began.
        alive_at_launch: Mutex<Vec<usize>>,
        releases: AtomicUsize,
    }

    impl DebugBackend for FakeBackend {
        fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandle, DebugError> {
            if self.fail {
                return Err(DebugError::InvalidTarget(PathBuf::from(&request.executable)));
            }
            let alive = self
                .launched
                .lock()
                .unwrap()
                .iter()
                .filter(|handle| !handle.is_finished())
                .count();
            self.alive_at_launch.lock().unwrap().push(alive);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            let (tx, mut rx) = tokio_mpsc::unbounded_channel();
            let handle = ProcessHandle::new(Some(4242), request.executable.clone(), tx);
            let killed = handle.clone();
            thread::spawn(move || {
                while let Some(message) = rx.blocking_recv() {
                    if let Control::Kill { .. } = message {
                        killed.complete(137);
                        break;
                    }
                }
            });
            self.launched.lock().unwrap().push(handle.clone());
            Ok(handle)
        }

        fn release(&self) -> Result<(), DebugError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller(backend: &Arc<FakeBackend>) -> DebugController {
        DebugController::new(Arc::clone(backend) as Arc<dyn DebugBackend>, false)
    }

    fn recorder(controller: &DebugController) -> mpsc::Receiver<i32> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        controller.add_exit_callback(move |status| {
            tx.lock().unwrap().send(status).unwrap();
        });
        rx
    }

    fn request() -> LaunchRequest {
        LaunchRequest::new("./app", "/tmp")
    }

    #[test]
    fn test_every_callback_sees_exit_once() {
        // --- Setup ---
        let backend = Arc::new(FakeBackend::default());
        let controller = controller(&backend);
        let first = recorder(&controller);
        let second = recorder(&controller);

        // --- Execute ---
        let handle = controller.start(request()).unwrap();
        assert_eq!(controller.state(), DebugState::Running);
        handle.complete(5);

        // --- Assert ---
        assert_eq!(controller.wait_for_exit(Some(Duration::from_secs(10))), Some(5));
        assert_eq!(controller.state(), DebugState::Exited);
        assert_eq!(first.try_recv(), Ok(5));
        assert_eq!(second.try_recv(), Ok(5));

        controller.destroy();
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn test_second_start_is_rejected() {
        let backend = Arc::new(FakeBackend::default());
        let controller = controller(&backend);
        let exits = recorder(&controller);

        let handle = controller.start(request()).unwrap();
        let second = controller.start(request());

        assert!(matches!(
            second,
            Err(DebugError::SessionActive(DebugState::Running))
        ));
        assert_eq!(backend.launched.lock().unwrap().len(), 1);

        handle.complete(0);
        assert_eq!(controller.wait_for_exit(Some(Duration::from_secs(10))), Some(0));
        assert_eq!(exits.try_recv(), Ok(0));
        assert!(exits.try_recv().is_err());
    }

    #[test]
    fn test_destroy_is_idempotent_without_session() {
        let backend = Arc::new(FakeBackend::default());
        let controller = controller(&backend);

        controller.destroy();
        controller.destroy();

        assert_eq!(controller.state(), DebugState::Idle);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_destroy_kills_and_reports_once() {
        // --- Setup ---
        let backend = Arc::new(FakeBackend::default());
        let controller = controller(&backend);
        let exits = recorder(&controller);
        let handle = controller.start(request()).unwrap();

        // --- Execute ---
        controller.destroy();
        controller.destroy();

        // --- Assert ---
        assert_eq!(handle.exit_status(), Some(137));
        assert_eq!(exits.try_recv(), Ok(137));
        assert!(exits.try_recv().is_err());
        assert_eq!(controller.state(), DebugState::Idle);
    }

    #[test]
    fn test_destroy_races_with_exit() {
        for _ in 0..50 {
            let backend = Arc::new(FakeBackend::default());
            let controller = controller(&backend);
            let exits = recorder(&controller);
            let handle = controller.start(request()).unwrap();

            let finisher = thread::spawn(move || handle.complete(1));
            controller.destroy();
            finisher.join().unwrap();

            let received: Vec<_> = exits.try_iter().collect();
            assert_eq!(received.len(), 1);
            assert_eq!(controller.state(), DebugState::Idle);
        }
    }

    #[test]
    fn test_exit_callback_may_destroy_during_destroy() {
        // --- Setup ---
        let backend = Arc::new(FakeBackend::default());
        let controller = Arc::new(controller(&backend));
        let exits = recorder(&controller);
        let weak = Arc::downgrade(&controller);
        controller.add_exit_callback(move |_| {
            if let Some(controller) = weak.upgrade() {
                controller.destroy();
            }
        });
        controller.start(request()).unwrap();

        // --- Execute ---
        let (done_tx, done_rx) = mpsc::channel();
        let outer = Arc::clone(&controller);
        thread::spawn(move || {
            outer.destroy();
            done_tx.send(()).unwrap();
        });

        // --- Assert ---
        assert!(done_rx.recv_timeout(Duration::from_secs(10)).is_ok());
        assert_eq!(exits.try_recv(), Ok(137));
        assert!(exits.try_recv().is_err());
        assert_eq!(controller.state(), DebugState::Idle);
    }

    #[test]
    fn test_destroy_during_start_waits_for_launch() {
        // --- Setup ---
        let backend = Arc::new(FakeBackend {
            delay: Some(Duration::from_millis(200)),
            ..FakeBackend::default()
        });
        let controller = Arc::new(controller(&backend));
        let exits = recorder(&controller);
        let starting = Arc::clone(&controller);
        let first = thread::spawn(move || starting.start(request()).map(|_| ()));
        let deadline = Instant::now() + Duration::from_secs(10);
        while controller.state() != DebugState::Starting {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }

        // --- Execute ---
        controller.destroy();
        let second = controller.start(request());

        // --- Assert ---
        assert!(first.join().unwrap().is_ok());
        assert!(second.is_ok());
        assert_eq!(exits.try_recv(), Ok(137));
        assert_eq!(*backend.alive_at_launch.lock().unwrap(), vec![0, 0]);
        let launched = backend.launched.lock().unwrap().clone();
        assert_eq!(launched.len(), 2);
        assert_eq!(launched[0].exit_status(), Some(137));
        assert_eq!(launched[1].exit_status(), None);
        assert_eq!(controller.state(), DebugState::Running);
    }

    #[test]
    fn test_start_callback_may_destroy_the_session() {
        let backend = Arc::new(FakeBackend::default());
        let controller = Arc::new(controller(&backend));
        let weak = Arc::downgrade(&controller);
        controller.add_start_callback(move |_| {
            if let Some(controller) = weak.upgrade() {
                controller.destroy();
            }
        });

        let result = controller.start(request());

        assert!(matches!(result, Err(DebugError::Cancelled)));
        assert_eq!(controller.state(), DebugState::Idle);
        let launched = backend.launched.lock().unwrap()[0].clone();
        assert_eq!(launched.wait_timeout(Duration::from_secs(10)), Some(137));
    }

    #[test]
    fn test_launch_failure_notifies_and_allows_restart() {
        let backend = Arc::new(FakeBackend {
            fail: true,
            ..FakeBackend::default()
        });
        let controller = controller(&backend);
        let exits = recorder(&controller);

        let result = controller.start(request());

        assert!(matches!(result, Err(DebugError::InvalidTarget(_))));
        assert_eq!(exits.try_recv(), Ok(SPAWN_FAILURE_EXIT_STATUS));
        assert_eq!(controller.state(), DebugState::Exited);
        assert_eq!(controller.last_exit_status(), Some(SPAWN_FAILURE_EXIT_STATUS));
        assert!(matches!(
            controller.start(request()),
            Err(DebugError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_removed_callback_is_not_called() {
        let backend = Arc::new(FakeBackend::default());
        let controller = controller(&backend);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let id = controller.add_exit_callback(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        assert!(controller.remove_exit_callback(id));
        assert!(!controller.remove_exit_callback(id));
        controller.start(request()).unwrap().complete(0);
        controller.wait_for_exit(Some(Duration::from_secs(10)));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_callbacks_receive_handle() {
        let backend = Arc::new(FakeBackend::default());
        let controller = controller(&backend);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        controller.add_start_callback(move |handle| {
            tx.lock().unwrap().send(handle.pid()).unwrap();
        });

        controller.start(request()).unwrap();

        assert_eq!(rx.try_recv(), Ok(Some(4242)));
        assert_eq!(controller.pid(), Some(4242));
    }

    #[test]
    fn test_launch_request_from_command_line() {
        let request = LaunchRequest::from_command_line("GREETING=hi ./app one 'two three'", "/work").unwrap();
        assert_eq!(request.executable, "./app");
        assert_eq!(request.arguments, vec!["one", "two three"]);
        assert_eq!(request.environment, vec![("GREETING".to_string(), "hi".to_string())]);
        assert_eq!(request.working_dir, PathBuf::from("/work"));
    }

    #[cfg(unix)]
    mod process_backend {
        use super::*;
        use tempfile::tempdir;

        #[test]
        fn test_real_process_exit_code_is_reported() {
            // --- Setup ---
            let terminal = Arc::new(Terminal::new(0).unwrap());
            let controller = DebugController::with_terminal(Arc::clone(&terminal), false);
            let exits = recorder(&controller);
            let dir = tempdir().unwrap();

            // --- Execute ---
            controller
                .start(
                    LaunchRequest::new("sh", dir.path())
                        .with_arguments(["-c", "echo debuggee; exit 3"]),
                )
                .unwrap();

            // --- Assert ---
            assert_eq!(controller.wait_for_exit(Some(Duration::from_secs(10))), Some(3));
            assert_eq!(exits.try_recv(), Ok(3));
            assert_eq!(terminal.sink().contents(), "debuggee\n");
            controller.destroy();
            controller.destroy();
        }

        #[test]
        fn test_missing_target_is_rejected() {
            let terminal = Arc::new(Terminal::new(0).unwrap());
            let controller = DebugController::with_terminal(terminal, false);
            let dir = tempdir().unwrap();

            let result = controller.start(LaunchRequest::new("./missing", dir.path()));

            assert!(matches!(result, Err(DebugError::InvalidTarget(_))));
        }

        #[test]
        fn test_unknown_program_name_is_rejected() {
            let terminal = Arc::new(Terminal::new(0).unwrap());
            let controller = DebugController::with_terminal(terminal, false);

            let exits = recorder(&controller);

            let result = controller.start(LaunchRequest::new("devterm-no-such-program", "."));

            assert!(matches!(result, Err(DebugError::InvalidTarget(_))));
            assert_eq!(controller.state(), DebugState::Exited);
            assert_eq!(exits.try_recv(), Ok(SPAWN_FAILURE_EXIT_STATUS));
        }
    }
}
