// src/system/executor.rs

use crate::constants::{SCHEDULER_WORKER_THREADS, SIGNAL_EXIT_OFFSET, SPAWN_FAILURE_EXIT_STATUS};
use crate::models::{Command, CommandLine, OutputStyle};
use crate::system::process::{Control, ProcessHandle};
use crate::system::shell;
use crate::system::sink::OutputSink;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

/// Why a process could not be run. Process outcomes are exit statuses, not errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Working directory '{0}' does not exist or is not a directory.")]
    InvalidWorkingDirectory(PathBuf),
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] io::Error),
    #[error("The process scheduler could not be started: {0}")]
    Runtime(#[source] io::Error),
    #[error("The process scheduler has been shut down.")]
    SchedulerStopped,
}

/// Invoked exactly once with the exit status of an asynchronous process.
pub type ExitCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// Runs child processes, either blocking the caller or supervised by a small
/// scheduler runtime. Captured output is funnelled into the shared [`OutputSink`].
#[derive(Debug)]
pub struct Executor {
    runtime: Option<Runtime>,
    sink: Arc<OutputSink>,
}

impl Executor {
    /// Starts the scheduler runtime. Captured output goes to `sink`.
    pub fn new(sink: Arc<OutputSink>) -> Result<Self, ExecutionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(SCHEDULER_WORKER_THREADS)
            .thread_name("devterm-scheduler")
            .enable_all()
            .build()
            .map_err(ExecutionError::Runtime)?;
        Ok(Self {
            runtime: Some(runtime),
            sink,
        })
    }

    /// The sink captured output is written to.
    pub fn sink(&self) -> &Arc<OutputSink> {
        &self.sink
    }

    /// Runs `command` to completion on the calling thread and returns its exit status.
    ///
    /// With `capture` set, every line the child prints becomes one sink chunk (stderr
    /// in bold). Otherwise the child inherits this process's standard streams.
    pub fn run(&self, command: &Command) -> Result<i32, ExecutionError> {
        let display = command.to_string();
        let mut std_command = build_std_command(command)?;
        if command.capture {
            std_command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        } else {
            std_command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }

        log::debug!("Running '{}' in '{}'", display, command.working_dir.display());
        let mut child = std_command
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = &*self.sink;
        thread::scope(|scope| {
            if let Some(pipe) = stdout {
                scope.spawn(move || pump_lines(pipe, sink, OutputStyle::Normal));
            }
            if let Some(pipe) = stderr {
                scope.spawn(move || pump_lines(pipe, sink, OutputStyle::Bold));
            }
        });

        let status = child
            .wait()
            .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;
        let code = exit_code(status);
        log::debug!("'{}' exited with status {}", display, code);
        Ok(code)
    }

    /// Runs `command` synchronously, feeding `stdin` to it and copying its stdout into
    /// `stdout`. Stderr goes to `stderr` when given, otherwise to the sink in bold.
    pub fn run_with_streams(
        &self,
        command: &Command,
        stdin: &[u8],
        stdout: &mut (dyn Write + Send),
        stderr: Option<&mut (dyn Write + Send)>,
    ) -> Result<i32, ExecutionError> {
        let display = command.to_string();
        let mut std_command = build_std_command(command)?;
        std_command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("Running '{}' with redirected streams", display);
        let mut child = std_command
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;

        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();
        let sink = &*self.sink;
        thread::scope(|scope| {
            if let Some(mut pipe) = child_stdin {
                scope.spawn(move || {
                    // The pipe is closed when dropped at the end of this thread.
                    if let Err(e) = pipe.write_all(stdin) {
                        log::debug!("Child closed stdin early: {}", e);
                    }
                });
            }
            if let Some(mut pipe) = child_stderr {
                match stderr {
                    Some(writer) => {
                        scope.spawn(move || {
                            if let Err(e) = io::copy(&mut pipe, writer) {
                                log::warn!("Failed to forward stderr: {}", e);
                            }
                        });
                    }
                    None => {
                        scope.spawn(move || pump_lines(pipe, sink, OutputStyle::Bold));
                    }
                }
            }
            if let Some(mut pipe) = child_stdout {
                if let Err(e) = io::copy(&mut pipe, stdout) {
                    log::warn!("Failed to forward stdout: {}", e);
                }
            }
        });

        let status = child
            .wait()
            .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;
        Ok(exit_code(status))
    }

    /// Starts `command` and returns immediately.
    ///
    /// A scheduler task waits for the child, drains its captured output into the sink,
    /// records the exit status on the handle and then invokes `on_exit` once on a
    /// blocking worker. If the child cannot be started, `on_exit` still receives
    /// [`SPAWN_FAILURE_EXIT_STATUS`] and the error is returned.
    pub fn spawn(
        &self,
        command: &Command,
        on_exit: Option<ExitCallback>,
    ) -> Result<ProcessHandle, ExecutionError> {
        match self.start_supervised(command) {
            Ok((handle, start)) => {
                start(on_exit);
                Ok(handle)
            }
            Err(e) => {
                self.dispatch_exit(on_exit, SPAWN_FAILURE_EXIT_STATUS);
                Err(e)
            }
        }
    }

    /// Spawns the child and its output readers. The returned closure hands the exit
    /// callback to the supervising task, which starts only once it has the callback.
    fn start_supervised(
        &self,
        command: &Command,
    ) -> Result<(ProcessHandle, impl FnOnce(Option<ExitCallback>) + '_), ExecutionError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or(ExecutionError::SchedulerStopped)?;
        let display = command.to_string();

        let mut async_command = TokioCommand::from(build_std_command(command)?);
        async_command.stdin(Stdio::piped()).kill_on_drop(true);
        // Its own process group, so a kill also reaches what a shell line started.
        #[cfg(unix)]
        async_command.process_group(0);
        if command.capture {
            async_command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            async_command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        // The child must be registered with this runtime's reactor.
        let _guard = runtime.enter();
        let mut child = async_command
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?;

        let pid = child.id();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new(pid, display.clone(), tx);

        let mut pumps = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            pumps.push(runtime.spawn(pump_lines_async(
                pipe,
                Arc::clone(&self.sink),
                OutputStyle::Normal,
            )));
        }
        if let Some(pipe) = child.stderr.take() {
            pumps.push(runtime.spawn(pump_lines_async(
                pipe,
                Arc::clone(&self.sink),
                OutputStyle::Bold,
            )));
        }
        let stdin = child.stdin.take();
        log::debug!("Spawned '{}' (pid {:?})", display, pid);

        let supervised = handle.clone();
        let start = move |on_exit: Option<ExitCallback>| {
            runtime.spawn(supervise(child, stdin, rx, pumps, supervised, on_exit));
        };
        Ok((handle, start))
    }

    /// Delivers `status` to `on_exit` on a scheduler worker, or inline once the
    /// scheduler is gone.
    fn dispatch_exit(&self, on_exit: Option<ExitCallback>, status: i32) {
        let Some(callback) = on_exit else {
            return;
        };
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn_blocking(move || callback(status));
            }
            None => callback(status),
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        // Dropping a runtime from one of its own workers panics; this does not.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Translates an OS exit status into the integer reported to callers.
///
/// A Unix child killed by a signal reports `128 + signal`, the shell convention.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => signal_exit_code(status),
    }
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .signal()
        .map_or(SPAWN_FAILURE_EXIT_STATUS, |signal| SIGNAL_EXIT_OFFSET + signal)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> i32 {
    SPAWN_FAILURE_EXIT_STATUS
}

fn build_std_command(command: &Command) -> Result<StdCommand, ExecutionError> {
    if !command.working_dir.is_dir() {
        return Err(ExecutionError::InvalidWorkingDirectory(
            command.working_dir.clone(),
        ));
    }

    let (program, args) = match &command.line {
        CommandLine::Shell(line) => {
            let line = line.trim();
            if line.is_empty() {
                return Err(ExecutionError::EmptyCommand);
            }
            let (program, args) = shell::shell_invocation(line);
            (program.to_string(), args)
        }
        CommandLine::Direct { program, args } => {
            if program.trim().is_empty() {
                return Err(ExecutionError::EmptyCommand);
            }
            (program.clone(), args.clone())
        }
    };

    let mut std_command = StdCommand::new(program);
    std_command
        .args(args)
        .current_dir(dunce::simplified(&command.working_dir))
        .envs(&command.env);
    Ok(std_command)
}

/// Copies `reader` into the sink one line (one chunk) at a time.
fn pump_lines<R: Read>(reader: R, sink: &OutputSink, style: OutputStyle) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => sink.write_bytes(&line, style),
            Err(e) => {
                log::warn!("Failed to read process output: {}", e);
                break;
            }
        }
    }
}

async fn pump_lines_async<R: AsyncRead + Unpin>(reader: R, sink: Arc<OutputSink>, style: OutputStyle) {
    let mut reader = AsyncBufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => sink.write_bytes(&line, style),
            Err(e) => {
                log::warn!("Failed to read process output: {}", e);
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    mut stdin: Option<ChildStdin>,
    mut control: UnboundedReceiver<Control>,
    pumps: Vec<JoinHandle<()>>,
    handle: ProcessHandle,
    on_exit: Option<ExitCallback>,
) {
    let waited = loop {
        tokio::select! {
            result = child.wait() => break result,
            message = control.recv() => match message {
                Some(Control::Kill { force }) => terminate(&mut child, force),
                Some(Control::Write(bytes)) => write_stdin(&mut stdin, &bytes).await,
                Some(Control::CloseStdin) => stdin = None,
                None => break child.wait().await,
            },
        }
    };

    let status = match waited {
        Ok(status) => exit_code(status),
        Err(e) => {
            log::warn!("Failed to wait for '{}': {}", handle.command(), e);
            SPAWN_FAILURE_EXIT_STATUS
        }
    };

    // Output first, then the status, then the callback.
    for pump in pumps {
        if let Err(e) = pump.await {
            log::warn!("Output reader for '{}' stopped abnormally: {}", handle.command(), e);
        }
    }
    drop(stdin);
    handle.complete(status);
    log::debug!("'{}' exited with status {}", handle.command(), status);

    if let Some(callback) = on_exit {
        if let Err(e) = tokio::task::spawn_blocking(move || callback(status)).await {
            log::error!("Exit callback for '{}' panicked: {}", handle.command(), e);
        }
    }
}

async fn write_stdin(stdin: &mut Option<ChildStdin>, bytes: &[u8]) {
    let Some(pipe) = stdin.as_mut() else {
        log::debug!("Dropping {} bytes: stdin is closed", bytes.len());
        return;
    };
    let result = async {
        pipe.write_all(bytes).await?;
        pipe.flush().await
    }
    .await;
    if let Err(e) = result {
        log::debug!("Closing stdin after write failure: {}", e);
        *stdin = None;
    }
}

/// Signals the child's process group: SIGKILL when `force` is set, SIGTERM otherwise.
#[cfg(unix)]
fn terminate(child: &mut Child, force: bool) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // No id once the child has been reaped; there is nothing left to signal.
    let Some(group) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    if let Err(e) = killpg(Pid::from_raw(group), signal) {
        log::debug!("Failed to send {:?} to process group {}: {}", signal, group, e);
        if force {
            if let Err(e) = child.start_kill() {
                log::debug!("Failed to kill child process: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _force: bool) {
    if let Err(e) = child.start_kill() {
        log::debug!("Failed to kill child process: {}", e);
    }
}
