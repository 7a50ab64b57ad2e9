// src/core/config.rs

//! Global settings, persisted as `~/.config/devterm/config.toml`.
//!
//! Every section is `#[serde(default)]`, so a partial file is completed with the
//! built-in defaults and unknown keys are ignored.

use crate::constants::{CONFIG_DIR_NAME, DEFAULT_HISTORY_SIZE};
use crate::core::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures reading or writing `config.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not locate the configuration directory: {0}")]
    Path(#[from] paths::PathError),
    #[error("Failed to parse config.toml: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Keyboard shortcuts, by menu action name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MenuConfig {
    pub keys: HashMap<String, String>,
}

/// Colour theme and font of the editor front-end.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ThemeConfig {
    pub name: String,
    pub variant: String,
    pub font: String,
}

/// Output buffer settings and when to clear it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Lines kept by the output sink; `0` keeps everything.
    pub history_size: usize,
    pub font: String,
    pub clear_on_compile: bool,
    pub clear_on_run_command: bool,
    pub hide_entry_on_run_command: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            font: String::new(),
            clear_on_compile: true,
            clear_on_run_command: false,
            hide_entry_on_run_command: true,
        }
    }
}

/// Commands of one build management system.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSystemConfig {
    pub command: String,
    pub compile_command: String,
}

/// Build directories and the external tools run for a project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Template for the default build directory, see [`paths::expand_path_template`].
    pub default_build_path: String,
    /// Template for the debug build directory; may use `<default_build_path>`.
    pub debug_build_path: String,
    pub cmake: BuildSystemConfig,
    pub meson: BuildSystemConfig,
    pub default_build_management_system: String,
    pub save_on_compile_or_run: bool,
    pub ctags_command: String,
    pub grep_command: String,
    pub cargo_command: String,
    pub python_command: String,
    pub markdown_command: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            default_build_path: "./build".to_string(),
            debug_build_path: "<default_build_path>/debug".to_string(),
            cmake: BuildSystemConfig {
                command: "cmake".to_string(),
                compile_command: "cmake --build .".to_string(),
            },
            meson: BuildSystemConfig {
                command: "meson".to_string(),
                compile_command: "ninja".to_string(),
            },
            default_build_management_system: "cmake".to_string(),
            save_on_compile_or_run: true,
            ctags_command: "ctags".to_string(),
            grep_command: "grep".to_string(),
            cargo_command: "cargo".to_string(),
            python_command: "python -u".to_string(),
            markdown_command: "grip -b".to_string(),
        }
    }
}

/// Online documentation lookup for one language.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentationSearch {
    pub separator: String,
    pub queries: HashMap<String, String>,
}

/// Editing preferences. Carried for the editor front-end; the execution core reads none.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    pub style: String,
    pub font: String,
    pub spellcheck_language: String,
    pub cleanup_whitespace_characters: bool,
    pub show_whitespace_characters: String,
    pub format_style_on_save: bool,
    pub format_style_on_save_if_style_file_found: bool,
    pub smart_brackets: bool,
    pub smart_inserts: bool,
    pub show_map: bool,
    pub show_git_diff: bool,
    pub show_right_margin: bool,
    pub right_margin_position: u32,
    pub auto_tab_char_and_size: bool,
    pub default_tab_char: char,
    pub default_tab_size: u32,
    pub tab_indents_line: bool,
    pub word_wrap: String,
    pub highlight_current_line: bool,
    pub show_line_numbers: bool,
    pub auto_reload_changed_files: bool,
    pub clang_format_style: String,
    pub clang_tidy_enable: bool,
    pub clang_tidy_checks: String,
    pub debug_place_cursor_at_stop: bool,
    pub documentation_searches: HashMap<String, DocumentationSearch>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            style: "classic".to_string(),
            font: "Monospace".to_string(),
            spellcheck_language: "en_US".to_string(),
            cleanup_whitespace_characters: false,
            show_whitespace_characters: String::new(),
            format_style_on_save: false,
            format_style_on_save_if_style_file_found: true,
            smart_brackets: true,
            smart_inserts: true,
            show_map: true,
            show_git_diff: true,
            show_right_margin: false,
            right_margin_position: 80,
            auto_tab_char_and_size: true,
            default_tab_char: ' ',
            default_tab_size: 2,
            tab_indents_line: true,
            word_wrap: "english_and_markdown".to_string(),
            highlight_current_line: true,
            show_line_numbers: true,
            auto_reload_changed_files: true,
            clang_format_style: "ColumnLimit: 0, NamespaceIndentation: All".to_string(),
            clang_tidy_enable: false,
            clang_tidy_checks: String::new(),
            debug_place_cursor_at_stop: false,
            documentation_searches: HashMap::new(),
        }
    }
}

/// Diagnostic toggles. `debugger` and `build` promote those subsystems' log lines
/// from `debug` to `info`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub libclang: bool,
    pub language_server: bool,
    pub debugger: bool,
    pub build: bool,
}

/// The whole of `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub menu: MenuConfig,
    pub theme: ThemeConfig,
    pub terminal: TerminalConfig,
    pub project: ProjectConfig,
    pub source: SourceConfig,
    pub log: LogConfig,
    pub home_path: PathBuf,
    pub home_config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home_path = dirs::home_dir().unwrap_or_default();
        let home_config_path = dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .unwrap_or_default();
        Self {
            menu: MenuConfig::default(),
            theme: ThemeConfig::default(),
            terminal: TerminalConfig::default(),
            project: ProjectConfig::default(),
            source: SourceConfig::default(),
            log: LogConfig::default(),
            home_path,
            home_config_path,
        }
    }
}

impl Config {
    /// Loads the global configuration, writing the defaults on first use.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = paths::get_config_file_path()?;
        Self::load_from(&config_path)
    }

    /// Loads `config_path`, creating it with the defaults if it does not exist.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            log::debug!("Writing default configuration to '{}'", config_path.display());
            let default_config = Self::default();
            default_config.save_to(config_path)?;
            return Ok(default_config);
        }
        let content = fs::read_to_string(config_path)?;
        let mut config: Self = toml::from_str(&content)?;
        if config.source.smart_inserts {
            config.source.smart_brackets = true;
        }
        Ok(config)
    }

    /// Writes the configuration to `config_path`, creating its directory.
    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        // --- Execute ---
        let config = Config::load_from(&path).unwrap();

        // --- Assert ---
        assert!(path.exists());
        assert_eq!(config.terminal.history_size, DEFAULT_HISTORY_SIZE);
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_is_completed_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[terminal]\nhistory_size = 5\n\n[log]\ndebugger = true\n\n[project.cmake]\ncommand = \"cmake3\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.terminal.history_size, 5);
        assert!(config.terminal.clear_on_compile);
        assert!(config.log.debugger);
        assert!(!config.log.build);
        assert_eq!(config.project.cmake.command, "cmake3");
        assert_eq!(config.project.cmake.compile_command, "");
        assert_eq!(config.project.ctags_command, "ctags");
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[terminal\nhistory_size = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }
}
