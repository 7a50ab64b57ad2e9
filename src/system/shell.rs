// src/system/shell.rs

//! Platform shell plumbing: how a command line is handed to the OS shell and how a
//! "run" line (`NAME=value program args...`) is broken into its parts.

use std::env;
use thiserror::Error;

/// A command line that cannot be split into a program and its arguments.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShellError {
    #[error("Command line could not be parsed (unbalanced quotes?): {0}")]
    Parse(String),
    #[error("Command line does not name a program to run.")]
    MissingProgram,
}

/// The program and leading arguments used to run a full command line through the
/// platform shell.
pub fn shell_invocation(line: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        ("cmd", vec!["/C".to_string(), line.to_string()])
    } else {
        ("sh", vec!["-c".to_string(), line.to_string()])
    }
}

/// Splits a command line into words using POSIX shell quoting rules.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ShellError> {
    shlex::split(line).ok_or_else(|| ShellError::Parse(line.to_string()))
}

/// Quotes `argument` so the platform shell passes it through as a single word.
pub fn escape_argument(argument: &str) -> String {
    if cfg!(target_os = "windows") {
        return format!("\"{}\"", argument.replace('"', "\\\""));
    }
    match shlex::try_quote(argument) {
        Ok(quoted) => quoted.into_owned(),
        // try_quote only rejects NUL bytes.
        Err(_) => format!("'{}'", argument.replace('\0', "")),
    }
}

/// A command line decomposed into environment, executable and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunArguments {
    pub environment: Vec<(String, String)>,
    pub executable: String,
    pub arguments: Vec<String>,
}

/// Parses lines such as `LD_LIBRARY_PATH=lib ./app --flag "two words"`.
///
/// Leading `NAME=value` words become environment entries; the first other word is
/// the executable and everything after it is passed through as arguments.
pub fn parse_run_arguments(line: &str) -> Result<RunArguments, ShellError> {
    let words = split_command_line(line)?;
    let mut words = words.into_iter().peekable();

    let mut environment = Vec::new();
    while let Some(word) = words.peek() {
        match split_env_assignment(word) {
            Some((name, value)) => {
                environment.push((name.to_string(), value.to_string()));
                words.next();
            }
            None => break,
        }
    }

    let executable = words.next().ok_or(ShellError::MissingProgram)?;
    Ok(RunArguments {
        environment,
        executable,
        arguments: words.collect(),
    })
}

/// Returns `(name, value)` when `word` is a shell variable assignment.
fn split_env_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some((name, value))
    } else {
        None
    }
}

/// Whether `executable_name` can be found in one of the `PATH` directories.
pub fn is_executable_in_path(executable_name: &str) -> bool {
    let Ok(path_var) = env::var("PATH") else {
        return false;
    };
    env::split_paths(&path_var).any(|dir| dir.join(executable_name).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments_with_environment() {
        let parsed =
            parse_run_arguments(r#"FOO=1 _BAR=two ./app --name "hello world" X=3"#).unwrap();

        assert_eq!(
            parsed.environment,
            vec![
                ("FOO".to_string(), "1".to_string()),
                ("_BAR".to_string(), "two".to_string())
            ]
        );
        assert_eq!(parsed.executable, "./app");
        // Assignments after the executable are ordinary arguments.
        assert_eq!(parsed.arguments, vec!["--name", "hello world", "X=3"]);
    }

    #[test]
    fn test_parse_run_arguments_rejects_bad_input() {
        assert_eq!(
            parse_run_arguments("FOO=1"),
            Err(ShellError::MissingProgram)
        );
        assert!(matches!(
            parse_run_arguments("app \"unterminated"),
            Err(ShellError::Parse(_))
        ));
    }

    #[test]
    fn test_env_assignment_requires_identifier() {
        assert_eq!(split_env_assignment("A1=x"), Some(("A1", "x")));
        assert_eq!(split_env_assignment("1A=x"), None);
        assert_eq!(split_env_assignment("--opt=x"), None);
        assert_eq!(split_env_assignment("plain"), None);
    }

    #[test]
    fn test_shell_invocation_wraps_line() {
        let (_, args) = shell_invocation("echo hi");
        assert_eq!(args.last().map(String::as_str), Some("echo hi"));
    }

    #[cfg(unix)]
    #[test]
    fn test_escape_argument_round_trips_through_split() {
        let path = "/tmp/my project/it's here";
        let escaped = escape_argument(path);
        assert_eq!(split_command_line(&escaped).unwrap(), vec![path.to_string()]);
        assert_eq!(escape_argument("plain"), "plain");
    }
}
