// src/bin/devterm.rs

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser};
use colored::*;
use devterm::{
    cli::{Cli, handlers},
    context::HostContext,
    models::OutputStyle,
    system::sink::SinkEvent,
    t,
};
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::thread;

// --- Command Definition and Registry ---

/// A system command, its aliases and its handler. Handlers return the process exit status.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &HostContext) -> Result<i32>,
}

static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "cmake",
        aliases: &[],
        handler: handlers::cmake::handle,
    },
    CommandDefinition {
        name: "compile-commands",
        aliases: &["cc"],
        handler: handlers::compile_commands::handle,
    },
    CommandDefinition {
        name: "config",
        aliases: &[],
        handler: handlers::config::handle,
    },
    CommandDefinition {
        name: "ctags",
        aliases: &["tags"],
        handler: handlers::ctags::handle,
    },
    CommandDefinition {
        name: "debug",
        aliases: &[],
        handler: handlers::debug::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Sets up logging, dispatches to the handler and exits with its status.
fn main() {
    env_logger::init();

    match run_cli(Cli::parse()) {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run_cli(cli: Cli) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(action) = cli.action else {
        Cli::command().print_help()?;
        return Ok(0);
    };
    let command = find_command(&action)
        .ok_or_else(|| anyhow!(t!("error.unknown_action"), action = action))?;

    let context = HostContext::load()?;
    let printer = {
        let events = context.terminal.subscribe();
        thread::spawn(move || print_events(events))
    };

    let result = (command.handler)(cli.args, &context);

    context.shutdown();
    // Hanging up ends the printer once it has drained the pending events.
    context.terminal.sink().disconnect_subscribers();
    if printer.join().is_err() {
        log::warn!("Output printer thread panicked");
    }
    result
}

/// Renders sink events on stdout until every sender is gone.
fn print_events(events: Receiver<SinkEvent>) {
    let stdout = io::stdout();
    for event in events {
        let mut out = stdout.lock();
        let written = match event {
            SinkEvent::Appended(chunk) => match chunk.style {
                OutputStyle::Bold => write!(out, "{}", chunk.text.bold()),
                OutputStyle::Normal => write!(out, "{}", chunk.text),
            },
            SinkEvent::Cleared => Ok(()),
        };
        if written.and_then(|_| out.flush()).is_err() {
            // stdout is gone (e.g. a closed pipe); nothing left to print to.
            return;
        }
    }
}
