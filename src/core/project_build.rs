// src/core/project_build.rs

//! The build system a source path belongs to and the directories it builds into.

use crate::constants::{CMAKE_LISTS_FILENAME, COMPILE_COMMANDS_FILENAME};
use crate::core::cmake::CMake;
use crate::core::config::ProjectConfig;
use crate::core::paths;
use crate::system::terminal::Terminal;
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

const DEFAULT_BUILD_PATH_TOKEN: &str = "<default_build_path>";
const PROJECT_DIRECTORY_TOKEN: &str = "<project_directory_name>";

/// How a project is built.
#[derive(Debug, Clone)]
pub enum BuildSystem {
    CMake(CMake),
    /// A project with only a compilation database in its default build directory.
    CompileCommands,
}

/// A project root, its build system and the settings for its build directories.
#[derive(Debug, Clone)]
pub struct ProjectBuild {
    pub project_path: PathBuf,
    pub system: BuildSystem,
    config: ProjectConfig,
}

impl ProjectBuild {
    /// Detects the build system of `path` by walking up its directories.
    ///
    /// Returns `None` when no supported project encloses `path`.
    pub fn create(path: &Path, config: &ProjectConfig) -> Option<Self> {
        let search_start = if path.is_dir() { path } else { path.parent()? };
        for directory in search_start.ancestors() {
            if directory.join(CMAKE_LISTS_FILENAME).exists() {
                let cmake = CMake::new(path);
                let project_path = cmake.project_path.clone()?;
                return Some(Self {
                    project_path,
                    system: BuildSystem::CMake(cmake),
                    config: config.clone(),
                });
            }

            let default_path = paths::expand_path_template(&config.default_build_path, directory).ok();
            if default_path.is_some_and(|build| build.join(COMPILE_COMMANDS_FILENAME).exists()) {
                return Some(Self {
                    project_path: directory.to_path_buf(),
                    system: BuildSystem::CompileCommands,
                    config: config.clone(),
                });
            }
        }
        None
    }

    /// The default build directory, from `project.default_build_path`.
    pub fn get_default_path(&self) -> Result<PathBuf> {
        paths::expand_path_template(&self.config.default_build_path, &self.project_path)
    }

    /// The debug build directory, from `project.debug_build_path`.
    pub fn get_debug_path(&self) -> Result<PathBuf> {
        let template = self
            .config
            .debug_build_path
            .replace(DEFAULT_BUILD_PATH_TOKEN, &self.config.default_build_path);
        paths::expand_path_template(&template, &self.project_path)
    }

    /// Folder names that never hold project sources.
    pub fn get_exclude_folders(config: &ProjectConfig) -> Vec<String> {
        let default_build_path = config.default_build_path.replace(PROJECT_DIRECTORY_TOKEN, "");
        let debug_build_path = config
            .debug_build_path
            .replace(DEFAULT_BUILD_PATH_TOKEN, &config.default_build_path)
            .replace(PROJECT_DIRECTORY_TOKEN, "");
        let folder_name = |path: &str| {
            Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let mut folders: Vec<String> = [".git", "build", "debug"].map(String::from).to_vec();
        for name in [folder_name(&default_build_path), folder_name(&debug_build_path)] {
            if !name.is_empty() && !folders.contains(&name) {
                folders.push(name);
            }
        }
        folders.extend(
            ["target", "node_modules", "dist", "coverage", ".expo", ".mypy_cache", "__pycache__"]
                .map(String::from),
        );
        folders
    }

    /// Configures the default build directory. `force` reconfigures an existing one.
    pub fn update_default(&self, terminal: &Terminal, force: bool) -> bool {
        let default_path = match self.get_default_path() {
            Ok(path) => path,
            Err(e) => return self.report(terminal, &e),
        };
        match &self.system {
            BuildSystem::CMake(cmake) => {
                cmake.update_default_build(terminal, &self.config.cmake.command, &default_path, force)
            }
            BuildSystem::CompileCommands => default_path.join(COMPILE_COMMANDS_FILENAME).exists(),
        }
    }

    /// Configures the debug build directory. `force` reconfigures an existing one.
    pub fn update_debug(&self, terminal: &Terminal, force: bool) -> bool {
        let debug_path = match self.get_debug_path() {
            Ok(path) => path,
            Err(e) => return self.report(terminal, &e),
        };
        match &self.system {
            BuildSystem::CMake(cmake) => {
                cmake.update_debug_build(terminal, &self.config.cmake.command, &debug_path, force)
            }
            BuildSystem::CompileCommands => false,
        }
    }

    /// The command that compiles the configured build directory.
    pub fn get_compile_command(&self) -> Option<&str> {
        match &self.system {
            BuildSystem::CMake(_) => Some(self.config.cmake.compile_command.as_str()),
            BuildSystem::CompileCommands => None,
        }
    }

    /// The executable built from `file_path` in the default build directory.
    ///
    /// Falls back to the project's `src/` directory when `file_path` maps to nothing.
    pub fn get_executable(&self, file_path: &Path) -> Result<PathBuf> {
        let BuildSystem::CMake(cmake) = &self.system else {
            return Err(anyhow!(
                "'{}' has no build system that names its executables",
                self.project_path.display()
            ));
        };
        let default_path = self.get_default_path()?;
        cmake
            .get_executable(&default_path, file_path)
            .or_else(|| {
                let src_path = self.project_path.join("src");
                if src_path.is_dir() {
                    CMake::new(&src_path).get_executable(&default_path, &src_path)
                } else {
                    None
                }
            })
            .ok_or_else(|| anyhow!("No executable found for '{}'", file_path.display()))
    }

    fn report(&self, terminal: &Terminal, error: &anyhow::Error) -> bool {
        terminal.print_bold(&format!("Error: {:#}\n", error));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn cmake_project(root: &Path) -> PathBuf {
        let project = root.join("hello");
        fs::create_dir_all(project.join("src")).unwrap();
        fs::write(project.join(CMAKE_LISTS_FILENAME), "project(hello)\nadd_subdirectory(src)\n").unwrap();
        project
    }

    #[test]
    fn test_create_detects_cmake_project() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let project = cmake_project(dir.path());

        // --- Execute ---
        let build = ProjectBuild::create(&project.join("src"), &ProjectConfig::default()).unwrap();

        // --- Assert ---
        assert_eq!(build.project_path, project);
        assert!(matches!(build.system, BuildSystem::CMake(_)));
        assert_eq!(build.get_default_path().unwrap(), project.join("build"));
        assert_eq!(build.get_debug_path().unwrap(), project.join("build").join("debug"));
        assert_eq!(build.get_compile_command(), Some("cmake --build ."));
    }

    #[test]
    fn test_create_detects_compile_commands_project() {
        let dir = tempdir().unwrap();
        let build_dir = dir.path().join("build");
        fs::create_dir_all(&build_dir).unwrap();
        fs::write(build_dir.join(COMPILE_COMMANDS_FILENAME), "[]").unwrap();

        let build = ProjectBuild::create(dir.path(), &ProjectConfig::default()).unwrap();

        assert_eq!(build.project_path, dir.path());
        assert!(matches!(build.system, BuildSystem::CompileCommands));
        assert!(build.get_executable(&dir.path().join("main.cpp")).is_err());
    }

    #[test]
    fn test_paths_follow_templates() {
        let dir = tempdir().unwrap();
        let project = cmake_project(dir.path());
        let config = ProjectConfig {
            default_build_path: "../builds/<project_directory_name>".to_string(),
            debug_build_path: "<default_build_path>-debug".to_string(),
            ..ProjectConfig::default()
        };

        let build = ProjectBuild::create(&project, &config).unwrap();

        assert_eq!(build.get_default_path().unwrap(), dir.path().join("builds").join("hello"));
        assert_eq!(build.get_debug_path().unwrap(), dir.path().join("builds").join("hello-debug"));
    }

    #[test]
    fn test_exclude_folders() {
        let config = ProjectConfig {
            default_build_path: "./out/<project_directory_name>".to_string(),
            debug_build_path: "<default_build_path>/dbg".to_string(),
            ..ProjectConfig::default()
        };

        let folders = ProjectBuild::get_exclude_folders(&config);

        assert!(folders.contains(&"out".to_string()));
        assert!(folders.contains(&"dbg".to_string()));
        assert!(folders.contains(&"node_modules".to_string()));
        assert_eq!(folders.iter().filter(|f| f.as_str() == "build").count(), 1);
    }

    #[test]
    fn test_get_executable_falls_back_to_src() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let project = cmake_project(dir.path());
        fs::write(project.join("src").join(CMAKE_LISTS_FILENAME), "add_executable(app main.cpp)\n").unwrap();
        let build_dir = project.join("build");
        fs::create_dir_all(&build_dir).unwrap();
        let main = project.join("src").join("main.cpp");
        let database = serde_json::json!([{
            "directory": build_dir.join("src"),
            "command": format!("c++ -o CMakeFiles/app.dir/main.cpp.o -c {}", main.display()),
            "file": main,
        }]);
        fs::write(build_dir.join(COMPILE_COMMANDS_FILENAME), database.to_string()).unwrap();
        let build = ProjectBuild::create(&project, &ProjectConfig::default()).unwrap();

        // --- Execute ---
        let executable = build.get_executable(&project.join("README.md")).unwrap();

        // --- Assert ---
        assert_eq!(executable, build_dir.join("src").join("app"));
    }
}
