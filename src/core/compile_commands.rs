// src/core/compile_commands.rs

//! Reader for `compile_commands.json` and the clang argument list derived from it.

use crate::constants::COMPILE_COMMANDS_FILENAME;
use crate::core::config::SourceConfig;
use crate::core::paths;
use crate::system::terminal::Terminal;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const DEFAULT_STD_ARGUMENT: &str = "-std=c++1y";

const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hp", "hpp", "h++", "tcc", "cuh"];
const SOURCE_EXTENSIONS: &[&str] = &["c", "cpp", "cxx", "cc", "C", "c++", "cu", "cl"];

static SYSTEM_INCLUDE_PATHS: OnceLock<Option<SystemIncludePaths>> = OnceLock::new();

#[derive(Deserialize)]
struct RawEntry {
    directory: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    file: PathBuf,
}

/// One translation unit of the compilation database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileEntry {
    pub directory: PathBuf,
    /// The full command line, compiler first.
    pub parameters: Vec<String>,
    /// Absolute path of the compiled file.
    pub file: PathBuf,
}

impl CompileEntry {
    /// Values that directly follow every occurrence of `flag`, e.g. the output of `-o`.
    pub fn parameter_values(&self, flag: &str) -> Vec<String> {
        let mut values = Vec::new();
        let mut found = false;
        for parameter in &self.parameters {
            if found {
                values.push(parameter.clone());
                found = false;
            } else if parameter == flag {
                found = true;
            }
        }
        values
    }
}

/// The entries of a `compile_commands.json`.
#[derive(Debug, Clone, Default)]
pub struct CompileCommands {
    pub entries: Vec<CompileEntry>,
}

impl CompileCommands {
    /// Reads `<build_path>/compile_commands.json`.
    pub fn load(build_path: &Path) -> Result<Self> {
        let path = build_path.join(COMPILE_COMMANDS_FILENAME);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let raw: Vec<RawEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse '{}'", path.display()))?;

        let entries = raw
            .into_iter()
            .map(|entry| {
                let parameters = match (entry.arguments, entry.command) {
                    (Some(arguments), _) => arguments,
                    (None, Some(command)) => tokenize(&command),
                    (None, None) => Vec::new(),
                };
                CompileEntry {
                    directory: entry.directory,
                    parameters,
                    file: paths::absolute_from(&entry.file, build_path),
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// Like [`load`](Self::load), but a missing or malformed database is an empty one.
    pub fn new(build_path: &Path) -> Self {
        Self::load(build_path).unwrap_or_else(|e| {
            log::debug!("No compilation database in '{}': {:#}", build_path.display(), e);
            Self::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` has a C, C++ or CUDA header extension.
    pub fn is_header(path: &Path) -> bool {
        has_extension(path, HEADER_EXTENSIONS)
    }

    /// Whether `path` has a C, C++, CUDA or OpenCL source extension.
    pub fn is_source(path: &Path) -> bool {
        has_extension(path, SOURCE_EXTENSIONS)
    }

    /// Builds the clang arguments used to parse `file_path` on its own.
    ///
    /// Flags come from the database entries of the file (or, for a header, of the
    /// sources next to it). Without a database a default language standard is used.
    pub fn get_arguments(
        terminal: &Terminal,
        source: &SourceConfig,
        build_path: &Path,
        file_path: &Path,
    ) -> Vec<String> {
        let extension = file_path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Standard C++ headers have no extension.
        let is_header = Self::is_header(file_path) || extension.is_empty();
        let has_build_path = !build_path.as_os_str().is_empty();

        let mut arguments = Vec::new();
        let database = if has_build_path {
            Self::load(build_path).ok()
        } else {
            None
        };
        match database {
            Some(database) => {
                let file_path = paths::normalize(file_path);
                let mut file_paths = Vec::new();
                if is_header && !extension.is_empty() {
                    let parent = file_path.parent();
                    file_paths.extend(
                        database
                            .entries
                            .iter()
                            .filter(|entry| entry.file.parent() == parent)
                            .map(|entry| entry.file.clone()),
                    );
                }
                if file_paths.is_empty() {
                    file_paths.push(file_path);
                }

                for entry in &database.entries {
                    if file_paths.contains(&paths::normalize(&entry.file)) {
                        arguments.extend(entry_flags(&entry.parameters, is_header));
                    }
                }
            }
            None => arguments.push(DEFAULT_STD_ARGUMENT.to_string()),
        }

        if let Some(system) = SYSTEM_INCLUDE_PATHS.get_or_init(|| SystemIncludePaths::find(terminal)) {
            arguments.extend(system.include_paths.iter().map(|path| format!("-I{}", path)));
            arguments.extend(system.framework_paths.iter().map(|path| format!("-F{}", path)));
        }

        // A precompiled header was most likely built without this flag.
        if !arguments.iter().any(|argument| argument == "-include-pch") {
            arguments.push("-fretain-comments-from-system-headers".to_string());
        }

        if is_header {
            arguments.extend(
                [
                    "-Wno-pragma-once-outside-header",
                    "-Wno-pragma-system-header-outside-header",
                    "-Wno-include-next-outside-header",
                ]
                .map(String::from),
            );
        }

        match extension.as_str() {
            "cu" | "cuh" => arguments.extend(
                ["-xcuda", "-D__CUDACC__", "-include", "cuda_runtime.h", "-ferror-limit=1000"]
                    .map(String::from),
            ),
            "cl" => arguments.extend(
                ["-xcl", "-cl-std=CL2.0", "-Xclang", "-finclude-default-header", "-Wno-gcc-compat"]
                    .map(String::from),
            ),
            _ if is_header => arguments.push("-xc++".to_string()),
            _ => {}
        }

        if has_build_path {
            arguments.push("-working-directory".to_string());
            arguments.push(build_path.to_string_lossy().into_owned());
        }

        if source.clang_tidy_enable {
            arguments.extend(["-Xclang", "-add-plugin", "-Xclang", "clang-tidy"].map(String::from));
            if !source.clang_tidy_checks.is_empty() {
                arguments.extend(["-Xclang", "-plugin-arg-clang-tidy", "-Xclang"].map(String::from));
                arguments.push(format!("-checks={}", source.clang_tidy_checks));
            }
        }

        arguments
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

/// The flags of one database command without the compiler, the input file, the
/// output and dependency files, `-x` languages and `-c`.
fn entry_flags(parameters: &[String], is_header: bool) -> Vec<String> {
    let inner = match parameters {
        [_, inner @ .., _] => inner,
        _ => return Vec::new(),
    };
    let mut flags = Vec::new();
    let mut skip_next = false;
    for parameter in inner {
        if skip_next {
            skip_next = false;
            continue;
        }
        match parameter.as_str() {
            "-o" | "-x" | "-MF" => skip_next = true,
            "-include-pch" if is_header => skip_next = true,
            "-c" => {}
            _ => flags.push(parameter.clone()),
        }
    }
    flags
}

/// Splits a database `command` string, honouring quotes and backslash escapes.
fn tokenize(command: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    let mut current: Option<String> = None;
    let mut single_quote = false;
    let mut double_quote = false;
    let mut chars = command.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !single_quote => {
                let word = current.get_or_insert_with(String::new);
                if let Some(next) = chars.next() {
                    word.push(next);
                }
            }
            ' ' | '\t' if !single_quote && !double_quote => {
                if let Some(word) = current.take() {
                    parameters.push(word);
                }
            }
            '\'' if !double_quote => {
                single_quote = !single_quote;
                current.get_or_insert_with(String::new);
            }
            '"' if !single_quote => {
                double_quote = !double_quote;
                current.get_or_insert_with(String::new);
            }
            _ => current.get_or_insert_with(String::new).push(c),
        }
    }
    if let Some(word) = current {
        parameters.push(word);
    }
    parameters
}

/// Include and framework directories the system clang searches by default.
#[derive(Debug)]
struct SystemIncludePaths {
    include_paths: Vec<String>,
    framework_paths: Vec<String>,
}

impl SystemIncludePaths {
    fn find(terminal: &Terminal) -> Option<Self> {
        let mut stdout = Vec::new();
        let status = terminal.process_with_streams(
            b"int main() {}",
            &mut stdout,
            "clang++ -v -x c++ -E 2>&1 -",
            Path::new("."),
            None,
        );
        if status != 0 {
            log::debug!("System include paths unavailable, clang++ exited with {}", status);
            return None;
        }
        Some(Self::parse(&String::from_utf8_lossy(&stdout)))
    }

    fn parse(output: &str) -> Self {
        let mut paths = Self {
            include_paths: Vec::new(),
            framework_paths: Vec::new(),
        };
        let listed = output
            .lines()
            .skip_while(|line| !line.starts_with("#include <...> search starts here:"))
            .skip(1)
            .take_while(|line| line.starts_with(' '));
        for line in listed {
            let line = line.trim_end_matches('\r');
            let path = line.get(1..).unwrap_or_default();
            match path.strip_suffix(" (framework directory)") {
                Some(framework) => paths.framework_paths.push(framework.to_string()),
                None => paths.include_paths.push(path.to_string()),
            }
        }
        paths
    }
}
