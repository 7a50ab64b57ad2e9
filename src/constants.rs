// src/constants.rs

/// Exit status reported when a process could not be started at all.
pub const SPAWN_FAILURE_EXIT_STATUS: i32 = -1;

/// Offset added to a signal number when a Unix child is killed by that signal.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

/// The name of the directory holding devterm's global configuration.
pub const CONFIG_DIR_NAME: &str = "devterm";

/// The name of the global configuration file (inside the config directory).
pub const CONFIG_FILENAME: &str = "config.toml";

/// Default number of lines the output sink keeps before dropping old chunks.
pub const DEFAULT_HISTORY_SIZE: usize = 10_000;

/// Worker threads backing the asynchronous process scheduler.
pub const SCHEDULER_WORKER_THREADS: usize = 2;

/// Build and project files the CMake support looks for.
pub const CMAKE_LISTS_FILENAME: &str = "CMakeLists.txt";
pub const CMAKE_CACHE_FILENAME: &str = "CMakeCache.txt";
pub const COMPILE_COMMANDS_FILENAME: &str = "compile_commands.json";
