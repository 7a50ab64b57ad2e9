// src/cli/handlers/run.rs

use crate::{
    cli::{args::RunArgs, handlers::commons},
    context::HostContext,
    system::terminal::find_link,
};
use anyhow::Result;
use clap::Parser;
use std::sync::mpsc;

/// Runs a shell command line through the terminal and returns its exit status.
pub fn handle(args: Vec<String>, context: &HostContext) -> Result<i32> {
    let run_args = RunArgs::try_parse_from(&args)?;
    let dir = commons::resolve_dir(run_args.dir)?;
    let line = commons::command_line(&run_args.command);
    let capture = !run_args.no_capture;
    let terminal = &context.terminal;

    if context.config.terminal.clear_on_run_command {
        terminal.clear();
    }

    let status = if run_args.run_async {
        let (sender, receiver) = mpsc::channel();
        let handle = terminal.async_process(
            &line,
            &dir,
            Some(Box::new(move |status| {
                if sender.send(status).is_err() {
                    log::debug!("Exit status {} arrived after the run handler returned", status);
                }
            })),
            capture,
        );
        log::debug!("Started '{}' with pid {:?}", line, handle.pid());
        receiver.recv().unwrap_or_else(|_| handle.wait())
    } else {
        terminal.process(&line, &dir, capture)
    };

    if run_args.links {
        print_links(context);
    }
    Ok(status)
}

/// Lists the source locations found in the captured output.
fn print_links(context: &HostContext) {
    let contents = context.terminal.sink().contents();
    let links: Vec<_> = contents.lines().filter_map(find_link).collect();
    if links.is_empty() {
        context.terminal.print(&format!("{}\n", t!("run.links.none")));
        return;
    }
    context.terminal.print_bold(&format!("{}\n", t!("run.links.header")));
    for link in links {
        context
            .terminal
            .print(&format!("  {}:{}:{}\n", link.path, link.line, link.line_index));
    }
}
