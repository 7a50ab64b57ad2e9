// src/cli/handlers/ctags.rs

use crate::{
    cli::args::CtagsArgs,
    context::HostContext,
    core::ctags::{self, Ctags, Location},
};
use anyhow::{Result, anyhow};
use clap::Parser;

/// Lists the tags of a file or project, or the best matches for one symbol.
pub fn handle(args: Vec<String>, context: &HostContext) -> Result<i32> {
    let ctags_args = CtagsArgs::try_parse_from(&args)?;
    if !ctags_args.path.exists() {
        return Err(anyhow!(
            t!("ctags.error.missing_path"),
            path = ctags_args.path.display()
        ));
    }
    let project = &context.config.project;
    let terminal = &context.terminal;

    let locations: Vec<Location> = match &ctags_args.symbol {
        Some(symbol) => ctags::get_locations(
            terminal,
            project,
            &ctags_args.path,
            symbol,
            &ctags_args.type_signature,
            &ctags_args.languages,
        ),
        None => {
            let tags = Ctags::new(
                terminal,
                project,
                &ctags_args.path,
                ctags_args.scope,
                ctags_args.kind,
                &ctags_args.languages,
            );
            tags.lines()
                .map(|line| tags.get_location(line, ctags_args.markup, false))
                .filter(Location::is_valid)
                .collect()
        }
    };

    if locations.is_empty() {
        terminal.print(&format!("{}\n", t!("ctags.none")));
        return Ok(1);
    }
    for location in &locations {
        terminal.print(&format_location(location));
    }
    Ok(0)
}

/// `file:line:column symbol [scope] [kind]` followed by the indented source.
fn format_location(location: &Location) -> String {
    let mut header = format!(
        "{}:{}:{} {}",
        location.file_path.display(),
        location.line + 1,
        location.index + 1,
        location.symbol
    );
    if !location.scope.is_empty() {
        header.push_str(&format!(" [{}]", location.scope));
    }
    if !location.kind.is_empty() {
        header.push_str(&format!(" ({})", location.kind));
    }
    format!("{}\n    {}\n", header, location.source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_location_is_one_based() {
        let location = Location {
            file_path: PathBuf::from("main.cpp"),
            line: 0,
            index: 4,
            symbol: "main".to_string(),
            scope: String::new(),
            source: "int main() {}".to_string(),
            kind: "function".to_string(),
        };

        assert_eq!(
            format_location(&location),
            "main.cpp:1:5 main (function)\n    int main() {}\n"
        );
    }
}
