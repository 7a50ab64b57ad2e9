// src/system/terminal.rs

//! The single surface the rest of the application talks to for running things and
//! showing their output.

use crate::constants::SPAWN_FAILURE_EXIT_STATUS;
use crate::core::config::TerminalConfig;
use crate::models::{Command, Link, OutputStyle};
use crate::system::executor::{ExecutionError, ExitCallback, Executor};
use crate::system::process::ProcessHandle;
use crate::system::sink::{OutputSink, SinkEvent};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

lazy_static! {
    /// Diagnostic formats printed by compilers and runtimes, each exposing
    /// `path` and `line` plus optional `drive` and `col` groups.
    static ref LINK_PATTERNS: Vec<Regex> = [
        // gcc/clang diagnostics and rename usages
        r"^(?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+):(?P<col>[0-9]+): .*$",
        r"^In file included from (?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+)[:,]$",
        r"^                 from (?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+)[:,]$",
        // rustc
        r"^ +--> (?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+):(?P<col>[0-9]+)$",
        // clang assert()
        r"^Assertion failed: .*file (?P<drive>[A-Z]:)?(?P<path>[^:]+), line (?P<line>[0-9]+)\.$",
        // gcc assert()
        r"^[^:]*: (?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+): .* Assertion .* failed\.$",
        // g_assert
        r"^ERROR:(?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+):.*$",
        // Node.js
        r"^(?P<drive>[A-Z]:)?(?P<path>[\\/][^:]+):(?P<line>[0-9]+)$",
        r"^    at .*?\((?P<drive>[A-Z]:)?(?P<path>[\\/][^:]+):(?P<line>[0-9]+):(?P<col>[0-9]+)\)$",
        // Jest
        r"^      at .*?\((?P<drive>[A-Z]:)?(?P<path>[^:]+):(?P<line>[0-9]+):(?P<col>[0-9]+)\)$",
        // Python
        r#"^  File "(?P<drive>[A-Z]:)?(?P<path>[^"]+)", line (?P<line>[0-9]+), in .*$"#,
    ]
    .iter()
    .filter_map(|pattern| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::error!("Invalid link pattern '{}': {}", pattern, e);
            None
        }
    })
    .collect();
}

/// Output buffer plus process execution, with a registry of the asynchronous
/// processes it started.
#[derive(Debug)]
pub struct Terminal {
    sink: Arc<OutputSink>,
    executor: Executor,
    processes: Mutex<Vec<ProcessHandle>>,
}

impl Terminal {
    /// A terminal keeping about `history_size` lines of output (`0` for no limit).
    ///
    /// Fails only if the process scheduler cannot be started.
    pub fn new(history_size: usize) -> Result<Self, ExecutionError> {
        let sink = Arc::new(OutputSink::with_history_size(history_size));
        let executor = Executor::new(Arc::clone(&sink))?;
        Ok(Self {
            sink,
            executor,
            processes: Mutex::new(Vec::new()),
        })
    }

    /// A terminal sized by the `[terminal]` settings.
    pub fn from_config(config: &TerminalConfig) -> Result<Self, ExecutionError> {
        Self::new(config.history_size)
    }

    /// The buffer every captured process and `print` writes to.
    pub fn sink(&self) -> &Arc<OutputSink> {
        &self.sink
    }

    /// A channel of every later change to the output, in the order it happened.
    pub fn subscribe(&self) -> Receiver<SinkEvent> {
        self.sink.subscribe()
    }

    /// Appends `text` to the output as one chunk.
    pub fn print(&self, text: &str) {
        self.sink.write(text);
    }

    /// Appends `text` as one bold chunk.
    pub fn print_bold(&self, text: &str) {
        self.sink.write_styled(text, OutputStyle::Bold);
    }

    /// Empties the output buffer.
    pub fn clear(&self) {
        self.sink.clear();
    }

    /// Runs a shell command line in `dir` and blocks until it exits.
    ///
    /// Returns the exit status, or `-1` when the command could not be started.
    pub fn process(&self, command: &str, dir: &Path, capture: bool) -> i32 {
        self.run(&Command::shell(command, dir).with_capture(capture))
    }

    /// Blocking execution of an arbitrary [`Command`].
    pub fn run(&self, command: &Command) -> i32 {
        match self.executor.run(command) {
            Ok(status) => status,
            Err(e) => {
                self.report_failure(command, &e);
                SPAWN_FAILURE_EXIT_STATUS
            }
        }
    }

    /// Runs `command` with `stdin` as its input and its output written to the given
    /// writers. Without a stderr writer, errors are printed to the sink.
    pub fn process_with_streams(
        &self,
        stdin: &[u8],
        stdout: &mut (dyn Write + Send),
        command: &str,
        dir: &Path,
        stderr: Option<&mut (dyn Write + Send)>,
    ) -> i32 {
        let command = Command::shell(command, dir);
        match self.executor.run_with_streams(&command, stdin, stdout, stderr) {
            Ok(status) => status,
            Err(e) => {
                self.report_failure(&command, &e);
                SPAWN_FAILURE_EXIT_STATUS
            }
        }
    }

    /// Starts a shell command line in `dir` without waiting for it.
    ///
    /// `on_exit` runs exactly once, also with `-1` when the process could not start.
    pub fn async_process(
        &self,
        command: &str,
        dir: &Path,
        on_exit: Option<ExitCallback>,
        capture: bool,
    ) -> ProcessHandle {
        self.spawn(&Command::shell(command, dir).with_capture(capture), on_exit)
    }

    /// Non-blocking execution of an arbitrary [`Command`]. A command that fails to
    /// start yields an already finished handle.
    pub fn spawn(&self, command: &Command, on_exit: Option<ExitCallback>) -> ProcessHandle {
        match self.executor.spawn(command, on_exit) {
            Ok(handle) => {
                self.register(handle.clone());
                handle
            }
            Err(e) => {
                self.report_failure(command, &e);
                ProcessHandle::failed(command.to_string())
            }
        }
    }

    /// Like [`spawn`](Self::spawn) but returns the start failure to the caller
    /// instead of printing it.
    pub fn try_spawn(&self, command: &Command) -> Result<ProcessHandle, ExecutionError> {
        let handle = self.executor.spawn(command, None)?;
        self.register(handle.clone());
        Ok(handle)
    }

    fn report_failure(&self, command: &Command, error: &ExecutionError) {
        log::debug!("Failed to run '{}': {}", command, error);
        self.sink
            .write_styled(&format!("Error: failed to run command: {}\n", command), OutputStyle::Bold);
    }

    fn registry(&self) -> MutexGuard<'_, Vec<ProcessHandle>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, handle: ProcessHandle) {
        let mut processes = self.registry();
        processes.retain(|p| !p.is_finished());
        processes.push(handle);
    }

    /// Handles of the asynchronous processes that are still running, oldest first.
    pub fn running_processes(&self) -> Vec<ProcessHandle> {
        let mut processes = self.registry();
        processes.retain(|p| !p.is_finished());
        processes.clone()
    }

    /// Terminates the most recently started process that is still running.
    pub fn kill_last_async_process(&self, force: bool) -> bool {
        match self.running_processes().last() {
            Some(handle) => handle.kill(force),
            None => false,
        }
    }

    /// Terminates every running asynchronous process. Returns how many were signalled.
    pub fn kill_async_processes(&self, force: bool) -> usize {
        self.running_processes()
            .iter()
            .filter(|handle| handle.kill(force))
            .count()
    }

    /// Sends `text` to the standard input of the most recently started process.
    pub fn write_to_last_process(&self, text: &str) -> bool {
        match self.running_processes().last() {
            Some(handle) => handle.write(text),
            None => false,
        }
    }
}

/// Recognises a source location in one line of tool output.
pub fn find_link(line: &str) -> Option<Link> {
    let line = line.trim_end_matches(['\n', '\r']);
    LINK_PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.captures(line)?;
        let path = captures.name("path")?;
        let line_number = captures.name("line")?;
        let drive = captures.name("drive");
        let column = captures.name("col");

        let start = drive.map_or(path.start(), |d| d.start());
        let end = column.map_or(line_number.end(), |c| c.end());
        let mut full_path = drive.map(|d| d.as_str().to_string()).unwrap_or_default();
        full_path.push_str(path.as_str());

        Some(Link {
            start: line.get(..start)?.chars().count(),
            end: line.get(..end)?.chars().count(),
            path: full_path,
            line: line_number.as_str().parse().ok()?,
            line_index: match column {
                Some(c) => c.as_str().parse().ok()?,
                None => 1,
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_link_gcc_diagnostic() {
        let link = find_link("src/main.cpp:12:5: error: expected ';'\n").unwrap();
        assert_eq!(
            link,
            Link {
                start: 0,
                end: 17,
                path: "src/main.cpp".to_string(),
                line: 12,
                line_index: 5,
            }
        );
    }

    #[test]
    fn test_find_link_rust_arrow_and_drive() {
        let link = find_link("  --> C:/work/src/lib.rs:3:14").unwrap();
        assert_eq!(link.start, 6);
        assert_eq!(link.path, "C:/work/src/lib.rs");
        assert_eq!((link.line, link.line_index), (3, 14));
        assert_eq!(link.end, 29);
    }

    #[test]
    fn test_find_link_python_defaults_column() {
        let link = find_link(r#"  File "/tmp/tool.py", line 8, in main"#).unwrap();
        assert_eq!(link.path, "/tmp/tool.py");
        assert_eq!(link.line, 8);
        assert_eq!(link.line_index, 1);
    }

    #[test]
    fn test_find_link_counts_characters() {
        let link = find_link("ERROR:/tmp/ñandú.c:4:assertion failed").unwrap();
        assert_eq!(link.path, "/tmp/ñandú.c");
        assert_eq!(link.start, 6);
        assert_eq!(link.end, 20);
    }

    #[test]
    fn test_find_link_ignores_plain_text() {
        assert!(find_link("Build finished successfully").is_none());
    }

    #[cfg(unix)]
    mod processes {
        use super::*;
        use std::sync::mpsc;
        use std::time::Duration;
        use tempfile::tempdir;

        #[test]
        fn test_process_ls_returns_zero() {
            // --- Setup ---
            let terminal = Terminal::new(0).unwrap();
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("listed.txt"), "").unwrap();

            // --- Execute ---
            let status = terminal.process("ls", dir.path(), true);

            // --- Assert ---
            assert_eq!(status, 0);
            assert!(terminal.sink().contents().contains("listed.txt"));
        }

        #[test]
        fn test_async_process_ls_notifies_once() {
            // --- Setup ---
            let terminal = Terminal::new(0).unwrap();
            let dir = tempdir().unwrap();
            let (tx, rx) = mpsc::channel();

            // --- Execute ---
            let handle = terminal.async_process(
                "ls",
                dir.path(),
                Some(Box::new(move |status| tx.send(status).unwrap())),
                true,
            );

            // --- Assert ---
            assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 0);
            assert_eq!(handle.exit_status(), Some(0));
            assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        }

        #[test]
        fn test_spawn_failure_prints_and_returns_sentinel() {
            let terminal = Terminal::new(0).unwrap();
            let missing = Path::new("/definitely/not/here");
            let (tx, rx) = mpsc::channel();

            assert_eq!(terminal.process("ls", missing, true), SPAWN_FAILURE_EXIT_STATUS);
            let handle = terminal.async_process(
                "ls",
                missing,
                Some(Box::new(move |status| tx.send(status).unwrap())),
                true,
            );

            assert_eq!(handle.exit_status(), Some(SPAWN_FAILURE_EXIT_STATUS));
            assert_eq!(
                rx.recv_timeout(Duration::from_secs(10)).unwrap(),
                SPAWN_FAILURE_EXIT_STATUS
            );
            let chunks = terminal.sink().chunks();
            assert_eq!(chunks.len(), 2);
            assert!(chunks.iter().all(|c| c.style == OutputStyle::Bold
                && c.text == "Error: failed to run command: ls\n"));
        }

        #[test]
        fn test_registry_kills_last_process() {
            let terminal = Terminal::new(0).unwrap();
            let dir = tempdir().unwrap();

            let first = terminal.spawn(&Command::direct("sleep", ["30"], dir.path()), None);
            let second = terminal.spawn(&Command::direct("sleep", ["30"], dir.path()), None);
            assert_eq!(terminal.running_processes().len(), 2);

            assert!(terminal.kill_last_async_process(true));
            assert!(second.wait_timeout(Duration::from_secs(10)).is_some());
            assert!(!first.is_finished());

            assert_eq!(terminal.kill_async_processes(true), 1);
            assert!(first.wait_timeout(Duration::from_secs(10)).is_some());
            assert!(terminal.running_processes().is_empty());
        }

        #[test]
        fn test_write_to_last_process() {
            let terminal = Terminal::new(0).unwrap();
            let dir = tempdir().unwrap();

            let handle = terminal.spawn(&Command::shell("read line; echo got $line", dir.path()), None);
            assert!(terminal.write_to_last_process("hello\n"));

            assert_eq!(handle.wait_timeout(Duration::from_secs(10)), Some(0));
            assert_eq!(terminal.sink().contents(), "got hello\n");
        }

        #[test]
        fn test_process_with_streams_routes_stderr_to_sink() {
            let terminal = Terminal::new(0).unwrap();
            let dir = tempdir().unwrap();
            let mut stdout = Vec::new();

            let status = terminal.process_with_streams(
                b"abc",
                &mut stdout,
                "cat; echo warn >&2",
                dir.path(),
                None,
            );

            assert_eq!(status, 0);
            assert_eq!(stdout, b"abc");
            assert_eq!(terminal.sink().contents(), "warn\n");
        }
    }
}
