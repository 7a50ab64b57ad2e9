// src/cli/handlers/debug.rs

use crate::{
    cli::{args::DebugArgs, handlers::commons},
    constants::SPAWN_FAILURE_EXIT_STATUS,
    context::HostContext,
    system::debug::LaunchRequest,
};
use anyhow::Result;
use clap::Parser;
use std::time::Duration;

/// Starts a debug session for an executable and waits for the debuggee to exit.
pub fn handle(args: Vec<String>, context: &HostContext) -> Result<i32> {
    let debug_args = DebugArgs::try_parse_from(&args)?;
    let dir = commons::resolve_dir(debug_args.dir)?;
    let request = LaunchRequest::from_command_line(&commons::command_line(&debug_args.command), &dir)?;
    let debugger = &context.debugger;

    let terminal = context.terminal.clone();
    debugger.add_start_callback(move |process| {
        terminal.print_bold(&format!(
            "{} {} (pid {})\n",
            t!("debug.started"),
            process.command(),
            process.pid().map_or_else(|| "?".to_string(), |pid| pid.to_string())
        ));
    });
    let terminal = context.terminal.clone();
    let callback = debugger.add_exit_callback(move |status| {
        terminal.print_bold(&format!("{} {}\n", t!("debug.exited"), status));
    });

    let result = debugger.start(request).map_err(anyhow::Error::from).map(|_| {
        let timeout = debug_args.timeout.map(Duration::from_secs);
        match debugger.wait_for_exit(timeout) {
            Some(status) => status,
            None => {
                context.terminal.print_bold(&format!("{}\n", t!("debug.timeout")));
                debugger.kill(true);
                debugger.wait_for_exit(None).unwrap_or(SPAWN_FAILURE_EXIT_STATUS)
            }
        }
    });
    debugger.remove_exit_callback(callback);
    result
}
