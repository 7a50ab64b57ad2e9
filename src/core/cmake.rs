// src/core/cmake.rs

//! CMake projects: discovery, configuring build directories and mapping source
//! files to the executables built from them.

use crate::constants::{CMAKE_CACHE_FILENAME, CMAKE_LISTS_FILENAME, COMPILE_COMMANDS_FILENAME};
use crate::core::compile_commands::CompileCommands;
use crate::core::paths;
use crate::system::shell::escape_argument;
use crate::system::terminal::Terminal;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref PROJECT_PATTERN: Option<Regex> = Regex::new(r"(?i)^ *project *\(.*$").ok();
}

/// CMake variables, keyed by upper-cased name.
/// CMake variables seen while parsing, each possibly a list.
pub type Variables = HashMap<String, Vec<String>>;

/// One command invocation in a CMake file, name lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CMakeFunction {
    pub name: String,
    pub parameters: Vec<String>,
}

/// A CMake project and the `CMakeLists.txt` files leading to a path inside it.
#[derive(Debug, Clone, Default)]
pub struct CMake {
    /// The directory holding the `CMakeLists.txt` that declares `project(...)`.
    pub project_path: Option<PathBuf>,
    /// Every `CMakeLists.txt` from the project root down to the searched path.
    pub paths: Vec<PathBuf>,
}

impl CMake {
    /// Walks up from `path` collecting `CMakeLists.txt` files until one declares a
    /// project.
    pub fn new(path: &Path) -> Self {
        let mut cmake = Self::default();
        let search_start = if path.is_dir() { path } else { path.parent().unwrap_or(path) };
        for directory in search_start.ancestors() {
            let lists = directory.join(CMAKE_LISTS_FILENAME);
            if !lists.is_file() {
                continue;
            }
            let declares_project = declares_project(&lists);
            cmake.paths.insert(0, lists);
            if declares_project {
                cmake.project_path = Some(directory.to_path_buf());
                break;
            }
        }
        cmake
    }

    /// Configures `build_path` with compile command export enabled.
    ///
    /// Skipped when a compilation database already exists, unless `force` is set.
    pub fn update_default_build(
        &self,
        terminal: &Terminal,
        cmake_command: &str,
        build_path: &Path,
        force: bool,
    ) -> bool {
        self.configure(
            terminal,
            cmake_command,
            build_path,
            force,
            COMPILE_COMMANDS_FILENAME,
            "-DCMAKE_EXPORT_COMPILE_COMMANDS=ON",
        )
    }

    /// Configures `build_path` as a debug build. Skipped when it already has a
    /// `CMakeCache.txt`, unless `force` is set.
    pub fn update_debug_build(
        &self,
        terminal: &Terminal,
        cmake_command: &str,
        build_path: &Path,
        force: bool,
    ) -> bool {
        self.configure(
            terminal,
            cmake_command,
            build_path,
            force,
            CMAKE_CACHE_FILENAME,
            "-DCMAKE_BUILD_TYPE=Debug",
        )
    }

    fn configure(
        &self,
        terminal: &Terminal,
        cmake_command: &str,
        build_path: &Path,
        force: bool,
        marker: &str,
        flag: &str,
    ) -> bool {
        let Some(project_path) = &self.project_path else {
            return false;
        };
        if !project_path.join(CMAKE_LISTS_FILENAME).exists() || build_path.as_os_str().is_empty() {
            return false;
        }

        if let Err(e) = fs::create_dir_all(build_path) {
            terminal.print_bold(&format!(
                "Error: could not create {}: {}\n",
                build_path.display(),
                e
            ));
            return false;
        }

        if !force && build_path.join(marker).exists() {
            return true;
        }

        let command = format!(
            "{} {} {}",
            cmake_command,
            escape_argument(&project_path.to_string_lossy()),
            flag
        );
        log::debug!("Configuring '{}' with: {}", build_path.display(), command);
        terminal.process(&command, build_path, true) == 0
    }

    /// Finds the executable built from `file_path`, or from the closest source
    /// directory containing it.
    ///
    /// Targets named by `add_executable` are preferred; when none of them matches,
    /// every object output in the compilation database is considered.
    pub fn get_executable(&self, build_path: &Path, file_path: &Path) -> Option<PathBuf> {
        let file_path = paths::normalize(file_path);

        // (source file, executable its object belongs to)
        let mut candidates = Vec::new();
        for entry in &CompileCommands::new(build_path).entries {
            let Some(output) = entry.parameter_values("-o").into_iter().next() else {
                continue;
            };
            let output = output.replacen("CMakeFiles/", "", 1);
            if let Some(end) = output.find(".dir") {
                let target = output.get(..end).unwrap_or_default();
                candidates.push((paths::normalize(&entry.file), entry.directory.join(target)));
            }
        }

        let cmake_executables = self.cmake_executables(build_path);
        let declared: Vec<&(PathBuf, PathBuf)> = candidates
            .iter()
            .filter(|(_, executable)| cmake_executables.contains(executable))
            .collect();
        best_match(&declared, &file_path)
            .or_else(|| best_match(&candidates.iter().collect::<Vec<_>>(), &file_path))
    }

    /// Paths of the `add_executable` targets, mapped into `build_path`.
    fn cmake_executables(&self, build_path: &Path) -> Vec<PathBuf> {
        let project_path = self
            .project_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default();
        let build_path = build_path.to_string_lossy();

        let mut executables = Vec::new();
        let mut variables = Variables::new();
        for path in &self.paths {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("Could not read '{}': {}", path.display(), e);
                    continue;
                }
            };
            let directory = path.parent().unwrap_or(Path::new(""));
            parse_file(&content, &mut variables, |function| {
                if function.name != "add_executable" {
                    return;
                }
                let Some(target) = function.parameters.first().filter(|name| !name.is_empty()) else {
                    return;
                };
                let executable = directory.join(target).to_string_lossy().into_owned();
                let executable = if project_path.is_empty() {
                    executable
                } else {
                    executable.replacen(&project_path, &build_path, 1)
                };
                executables.push(PathBuf::from(executable));
            });
        }
        executables
    }
}

fn declares_project(cmake_lists: &Path) -> bool {
    let Some(pattern) = PROJECT_PATTERN.as_ref() else {
        return false;
    };
    fs::read_to_string(cmake_lists)
        .map(|content| content.lines().any(|line| pattern.is_match(line)))
        .unwrap_or(false)
}

/// An exact source match wins; otherwise the executable whose source lies in the
/// deepest directory containing `file_path`.
fn best_match(candidates: &[&(PathBuf, PathBuf)], file_path: &Path) -> Option<PathBuf> {
    let mut best: Option<(usize, &PathBuf)> = None;
    for (source_file, executable) in candidates.iter().copied() {
        if source_file == file_path {
            return Some(executable.clone());
        }
        let Some(source_directory) = source_file.parent() else {
            continue;
        };
        if paths::file_in_path(file_path, source_directory) {
            let depth = source_directory.components().count();
            if best.is_none_or(|(best_depth, _)| depth > best_depth) {
                best = Some((depth, executable));
            }
        }
    }
    best.map(|(_, executable)| executable.clone())
}

/// Parses CMake source, calling `on_function` for every command invocation.
///
/// `set(...)` and `project(...)` define variables for the invocations that follow;
/// an already defined variable keeps its first value. `${NAME}` references are
/// expanded in both quoted and unquoted arguments.
pub fn parse_file<F>(source: &str, variables: &mut Variables, mut on_function: F)
where
    F: FnMut(CMakeFunction),
{
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
        variables,
    };
    while parser.skip_whitespace() {
        if !parser.skip_comment() {
            if let Some(mut function) = parser.function() {
                function.name = function.name.to_lowercase();
                parser.define_variables(&function);
                on_function(function);
            }
        }
        parser.pos += 1;
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    variables: &'a mut Variables,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Advances to the next non-whitespace character; `false` at the end of input.
    fn skip_whitespace(&mut self) -> bool {
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
        self.peek().is_some()
    }

    /// Leaves the cursor on the newline that ends a `#` comment.
    fn skip_comment(&mut self) -> bool {
        if self.peek() != Some('#') {
            return false;
        }
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
        true
    }

    /// Reads `${NAME}`, leaving the cursor on the closing brace.
    fn variable_name(&mut self) -> Option<String> {
        if self.peek() != Some('$') || self.peek_at(1) != Some('{') {
            return None;
        }
        let start = self.pos + 2;
        let end = start + self.chars.get(start..)?.iter().position(|&c| c == '}')?;
        self.pos = end;
        Some(self.chars.get(start..end)?.iter().collect::<String>().to_uppercase())
    }

    fn function(&mut self) -> Option<CMakeFunction> {
        let first = self.peek()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let mut function = CMakeFunction::default();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
            function.name.push(c);
            self.pos += 1;
        }
        if !self.skip_whitespace() || self.peek() != Some('(') {
            return None;
        }
        self.pos += 1;

        while self.skip_whitespace() {
            match self.peek() {
                Some(')') => return Some(function),
                Some('"') => {
                    self.pos += 1;
                    let parameter = self.quoted_parameter();
                    function.parameters.push(parameter);
                    self.pos += 1;
                }
                _ => {
                    self.unquoted_parameters(&mut function.parameters);
                    if self.peek() == Some(')') {
                        return Some(function);
                    }
                }
            }
        }
        None
    }

    /// Reads up to the closing quote; a multi-value variable is joined with `;`.
    fn quoted_parameter(&mut self) -> String {
        let mut parameter = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' && self.peek_at(1).is_some() {
                self.pos += 1;
                parameter.extend(self.peek());
            } else if c == '"' {
                break;
            } else if let Some(name) = self.variable_name() {
                if let Some(values) = self.variables.get(&name) {
                    parameter.push_str(&values.join(";"));
                }
            } else {
                parameter.push(c);
            }
            self.pos += 1;
        }
        parameter
    }

    /// Reads one unquoted argument. A multi-value variable splits it into several.
    fn unquoted_parameters(&mut self, parameters: &mut Vec<String>) {
        let mut current: Option<String> = None;
        while let Some(c) = self.peek().filter(|&c| !is_whitespace(c) && c != ')') {
            let parameter = current.get_or_insert_with(String::new);
            if c == '\\' && self.peek_at(1).is_some() {
                self.pos += 1;
                parameter.extend(self.peek());
            } else if let Some(name) = self.variable_name() {
                if let Some((first, rest)) = self.variables.get(&name).and_then(|v| v.split_first()) {
                    parameter.push_str(first);
                    if let Some((last, middle)) = rest.split_last() {
                        parameters.extend(current.take());
                        parameters.extend(middle.iter().cloned());
                        current = Some(last.clone());
                    }
                }
            } else {
                parameter.push(c);
            }
            self.pos += 1;
        }
        parameters.extend(current);
    }

    fn define_variables(&mut self, function: &CMakeFunction) {
        match function.name.as_str() {
            "set" => {
                if let Some((name, values)) = function.parameters.split_first() {
                    if !name.is_empty() {
                        self.variables
                            .entry(name.to_uppercase())
                            .or_insert_with(|| values.to_vec());
                    }
                }
            }
            "project" if !function.parameters.is_empty() => {
                for name in ["CMAKE_PROJECT_NAME", "PROJECT_NAME"] {
                    self.variables
                        .entry(name.to_string())
                        .or_insert_with(|| function.parameters.clone());
                }
            }
            _ => {}
        }
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}
