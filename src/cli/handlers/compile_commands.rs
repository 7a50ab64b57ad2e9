// src/cli/handlers/compile_commands.rs

use crate::{
    cli::args::CompileCommandsArgs, context::HostContext, core::compile_commands::CompileCommands,
};
use anyhow::Result;
use clap::Parser;

/// Prints the entries of a compilation database, or the clang arguments for a file.
pub fn handle(args: Vec<String>, context: &HostContext) -> Result<i32> {
    let cc_args = CompileCommandsArgs::try_parse_from(&args)?;
    let terminal = &context.terminal;

    if let Some(file) = cc_args.file {
        let arguments = CompileCommands::get_arguments(
            terminal,
            &context.config.source,
            &cc_args.build_path,
            &file,
        );
        for argument in arguments {
            terminal.print(&format!("{}\n", argument));
        }
        return Ok(0);
    }

    let database = CompileCommands::load(&cc_args.build_path)?;
    for entry in &database.entries {
        let kind = if CompileCommands::is_header(&entry.file) {
            t!("cc.kind.header")
        } else if CompileCommands::is_source(&entry.file) {
            t!("cc.kind.source")
        } else {
            t!("cc.kind.other")
        };
        terminal.print_bold(&format!("{} ({})\n", entry.file.display(), kind));
        terminal.print(&format!("    {}\n", entry.parameters.join(" ")));
    }
    Ok(0)
}
