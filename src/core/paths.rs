// src/core/paths.rs

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILENAME};
use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Failures locating or creating the configuration directory.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the devterm configuration directory (`~/.config/devterm`), creating it
/// if needed.
///
/// The first call computes and caches the path; later calls return the cached value.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = CONFIG_DIR.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);

    if !config_path.exists() {
        fs::create_dir_all(&config_path).map_err(|e| PathError::ConfigDirCreation {
            path: config_path.display().to_string(),
            source: e,
        })?;
    }

    *cached = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path to the global `config.toml`.
pub fn get_config_file_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// Expands a build path template for `project_path`.
///
/// Handles `~` and environment variables, then the `<project_directory_name>` token.
/// A relative result is taken relative to the project directory.
pub fn expand_path_template(template: &str, project_path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(template)
        .map_err(|e| anyhow!("Failed to expand path template '{}': {}", template, e))?;

    let directory_name = project_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let with_tokens = expanded.replace("<project_directory_name>", &directory_name);

    let path = PathBuf::from(with_tokens);
    if path.is_absolute() {
        Ok(normalize(&path))
    } else {
        Ok(normalize(&project_path.join(path)))
    }
}

/// Lexically removes `.` and resolves `..` components without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Whether `file_path` is `directory` itself or lies below it.
pub fn file_in_path(file_path: &Path, directory: &Path) -> bool {
    normalize(file_path).starts_with(normalize(directory))
}

/// Makes `path` absolute against `base` and normalises it.
pub fn absolute_from(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_relative_template_with_token() {
        let project = Path::new("/work/hello");
        let path = expand_path_template("./build/<project_directory_name>", project).unwrap();
        assert_eq!(path, PathBuf::from("/work/hello/build/hello"));
    }

    #[test]
    fn test_expand_absolute_template() {
        let path = expand_path_template("/tmp/builds/../out", Path::new("/work/hello")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_expand_unknown_variable_fails() {
        assert!(expand_path_template("$DEVTERM_UNSET_VARIABLE_XYZ/build", Path::new("/p")).is_err());
    }

    #[test]
    fn test_file_in_path() {
        assert!(file_in_path(Path::new("/a/b/c.cpp"), Path::new("/a/b")));
        assert!(file_in_path(Path::new("/a/b/../b/c.cpp"), Path::new("/a/b/")));
        assert!(!file_in_path(Path::new("/a/bc/c.cpp"), Path::new("/a/b")));
    }
}
