// src/core/mod.rs

pub mod cmake;
pub mod compile_commands;
pub mod config;
pub mod ctags;
pub mod paths;
pub mod project_build;
