// src/cli/handlers/mod.rs

// One module per CLI action. Every handler returns the exit status for the process.

pub mod cmake;
pub mod commons;
pub mod compile_commands;
pub mod config;
pub mod ctags;
pub mod debug;
pub mod run;
