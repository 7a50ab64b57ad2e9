// src/cli/handlers/commons.rs

// Helpers shared by the action handlers.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// The given directory, or the current one.
pub fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => env::current_dir().context(t!("error.current_dir")),
    }
}

/// Turns the words after an action back into one command line.
///
/// A single word is taken as a complete line (`devterm run "make | less"`); several
/// words are quoted so each stays one argument.
pub fn command_line(words: &[String]) -> String {
    match words {
        [line] => line.clone(),
        _ => shlex::try_join(words.iter().map(String::as_str))
            .unwrap_or_else(|_| words.join(" ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_keeps_single_word_lines() {
        assert_eq!(command_line(&["ls -la | wc -l".to_string()]), "ls -la | wc -l");
    }

    #[test]
    fn test_command_line_quotes_separate_words() {
        let words = vec!["echo".to_string(), "hello world".to_string()];
        let line = command_line(&words);
        assert_eq!(shlex::split(&line), Some(words));
    }
}
