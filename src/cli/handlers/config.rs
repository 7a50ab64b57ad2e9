// src/cli/handlers/config.rs

use crate::{cli::args::ConfigArgs, context::HostContext, core::paths};
use anyhow::{Context, Result};
use clap::Parser;

/// Prints the effective configuration, or where it is stored.
pub fn handle(args: Vec<String>, context: &HostContext) -> Result<i32> {
    let config_args = ConfigArgs::try_parse_from(&args)?;
    let config_path = paths::get_config_file_path()?;

    if config_args.path {
        context.terminal.print(&format!("{}\n", config_path.display()));
        return Ok(0);
    }

    let rendered = toml::to_string_pretty(&context.config).context(t!("config.error.render"))?;
    context
        .terminal
        .print_bold(&format!("# {}\n", config_path.display()));
    context.terminal.print(&rendered);
    Ok(0)
}
