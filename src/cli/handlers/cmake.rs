// src/cli/handlers/cmake.rs

use crate::{
    cli::{args::CMakeArgs, handlers::commons},
    context::HostContext,
    core::project_build::ProjectBuild,
};
use anyhow::{Result, anyhow};
use clap::Parser;

/// Configures the default or debug build directory of a CMake project, and
/// optionally resolves the executable built from a source file.
pub fn handle(args: Vec<String>, context: &HostContext) -> Result<i32> {
    let cmake_args = CMakeArgs::try_parse_from(&args)?;
    let path = commons::resolve_dir(cmake_args.path)?;
    let terminal = &context.terminal;

    let build = ProjectBuild::create(&path, &context.config.project)
        .ok_or_else(|| anyhow!(t!("cmake.error.no_project"), path = path.display()))?;
    // `log.build` raises build diagnostics from debug to info.
    let level = if context.config.log.build {
        log::Level::Info
    } else {
        log::Level::Debug
    };
    log::log!(level, "Project root: '{}'", build.project_path.display());

    let (configured, build_path) = if cmake_args.debug {
        (build.update_debug(terminal, cmake_args.force), build.get_debug_path()?)
    } else {
        (build.update_default(terminal, cmake_args.force), build.get_default_path()?)
    };
    log::log!(level, "Build directory: '{}'", build_path.display());
    if !configured {
        terminal.print_bold(&format!(
            "{} {}\n",
            t!("cmake.configure_failed"),
            build_path.display()
        ));
        return Ok(1);
    }
    terminal.print(&format!("{} {}\n", t!("cmake.configured"), build_path.display()));

    if let Some(file) = cmake_args.executable {
        let file = if file.is_absolute() { file } else { path.join(file) };
        let executable = build.get_executable(&file)?;
        terminal.print(&format!("{}\n", executable.display()));
    }
    Ok(0)
}
