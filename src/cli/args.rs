// src/cli/args.rs
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // The action name is stripped by the dispatcher
#[command(trailing_var_arg = true)]
pub struct RunArgs {
    /// Directory to run the command in. Defaults to the current directory.
    #[arg(long, short)]
    pub dir: Option<PathBuf>,

    /// Start the command on the background scheduler and wait for its exit callback.
    #[arg(long = "async")]
    pub run_async: bool,

    /// Let the command write straight to this terminal instead of the output buffer.
    #[arg(long)]
    pub no_capture: bool,

    /// List the source locations mentioned in the output once the command exits.
    #[arg(long)]
    pub links: bool,

    /// The command line, passed to the platform shell.
    #[arg(required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
#[command(trailing_var_arg = true)]
pub struct DebugArgs {
    /// Working directory of the debuggee. Defaults to the current directory.
    #[arg(long, short)]
    pub dir: Option<PathBuf>,

    /// Kill the debuggee if it runs longer than this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// `[NAME=value...] executable [arguments...]`
    #[arg(required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct CtagsArgs {
    /// A source file, or a directory to scan recursively.
    pub path: PathBuf,

    /// Only show the best matches for this symbol (`Scope::name` allowed).
    #[arg(long)]
    pub symbol: Option<String>,

    /// Type signature used to rank `--symbol` matches, e.g. "void (int)".
    #[arg(long = "type", default_value = "")]
    pub type_signature: String,

    /// Restrict ctags to these languages (e.g. "C,C++").
    #[arg(long, default_value = "")]
    pub languages: String,

    /// Include the scope of each tag.
    #[arg(long)]
    pub scope: bool,

    /// Include the kind of each tag.
    #[arg(long)]
    pub kind: bool,

    /// Print sources with the symbol marked up in bold.
    #[arg(long)]
    pub markup: bool,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct CMakeArgs {
    /// A path inside the project. Defaults to the current directory.
    pub path: Option<PathBuf>,

    /// Configure the debug build directory instead of the default one.
    #[arg(long)]
    pub debug: bool,

    /// Reconfigure even if the build directory is already set up.
    #[arg(long)]
    pub force: bool,

    /// Print the executable built from this source file.
    #[arg(long)]
    pub executable: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct CompileCommandsArgs {
    /// The build directory holding `compile_commands.json`.
    pub build_path: PathBuf,

    /// Print the clang arguments for this file instead of the database entries.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct ConfigArgs {
    /// Only print where the configuration file lives.
    #[arg(long)]
    pub path: bool,
}
