//! # System Interaction Layer
//!
//! Everything that touches child processes and their output.
//!
//! ## Modules
//!
//! - **`sink`**: The bounded, observable output buffer every process writes into.
//! - **`process`**: Handles to asynchronous children (status, kill, stdin).
//! - **`executor`**: Runs commands synchronously or on the background scheduler and
//!   streams their output into the sink.
//! - **`shell`**: Platform shell invocation and command line splitting.
//! - **`terminal`**: The façade over sink and executor, with the registry of running
//!   processes and diagnostic link detection.
//! - **`debug`**: The debug session controller built on the terminal's processes.

pub mod debug;
pub mod executor;
pub mod process;
pub mod shell;
pub mod sink;
pub mod terminal;
