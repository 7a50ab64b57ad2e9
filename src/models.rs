// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

// --- COMMAND MODELS ---
// What the execution layer is asked to run.

/// How the program of a [`Command`] is described.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A full command line handed to the platform shell (`sh -c` / `cmd /C`).
    Shell(String),
    /// A program executed directly with an explicit argument vector.
    Direct { program: String, args: Vec<String> },
}

/// A request to run one child process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub line: CommandLine,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    /// When true, stdout/stderr are connected to the output sink.
    pub capture: bool,
}

impl Command {
    /// A shell command line run in `working_dir`, captured by default.
    pub fn shell(line: impl Into<String>, working_dir: impl AsRef<Path>) -> Self {
        Self {
            line: CommandLine::Shell(line.into()),
            working_dir: working_dir.as_ref().to_path_buf(),
            env: HashMap::new(),
            capture: true,
        }
    }

    /// A program with arguments, executed without a shell.
    pub fn direct<I, S>(program: impl Into<String>, args: I, working_dir: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line: CommandLine::Direct {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            working_dir: working_dir.as_ref().to_path_buf(),
            env: HashMap::new(),
            capture: true,
        }
    }

    /// Sets whether output goes to the sink or to this process's own streams.
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Adds one environment variable on top of the inherited environment.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds several environment variables.
    pub fn with_envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.line {
            CommandLine::Shell(line) => f.write_str(line),
            CommandLine::Direct { program, args } => {
                let mut parts = Vec::with_capacity(args.len() + 1);
                parts.push(program.as_str());
                parts.extend(args.iter().map(String::as_str));
                match shlex::try_join(parts.iter().copied()) {
                    Ok(joined) => f.write_str(&joined),
                    Err(_) => f.write_str(&parts.join(" ")),
                }
            }
        }
    }
}

// --- OUTPUT MODELS ---

/// Presentation hint attached to a chunk of output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    #[default]
    Normal,
    Bold,
}

/// One atomic write to the output sink.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub style: OutputStyle,
}

impl Chunk {
    /// A chunk of `text` in `style`.
    pub fn new(text: impl Into<String>, style: OutputStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    /// Number of line breaks contained in the chunk.
    pub fn line_breaks(&self) -> usize {
        self.text.matches('\n').count()
    }
}

/// A source location recognised inside a line of tool output.
///
/// `start` and `end` are character offsets into the scanned line; `line` and
/// `line_index` are 1-based as printed by compilers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub start: usize,
    pub end: usize,
    pub path: String,
    pub line: u32,
    pub line_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_command_display_quotes_arguments() {
        let command = Command::direct("echo", ["hello world", "x"], "/tmp");
        let rendered = command.to_string();
        assert!(rendered.starts_with("echo "));
        assert!(rendered.contains("hello world"));
        assert_ne!(rendered, "echo hello world x");
    }

    #[test]
    fn test_chunk_line_breaks() {
        assert_eq!(Chunk::new("a\nb\n", OutputStyle::Normal).line_breaks(), 2);
        assert_eq!(Chunk::new("tail", OutputStyle::Bold).line_breaks(), 0);
    }
}
