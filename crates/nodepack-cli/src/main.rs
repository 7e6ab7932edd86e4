use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use nodepack_resolver::ResolveScope;

mod dispatch;
mod logging;
mod render;

#[derive(Parser, Debug)]
#[command(name = "nodepack")]
#[command(about = "Lifecycle manager for custom node packs", long_about = None)]
struct Cli {
    /// Config file; defaults to $NODEPACK_CONFIG, then <pack-root>/nodepack.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    pack_root: Option<PathBuf>,
    #[arg(long, global = true)]
    registry_root: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show installed packs.
    List {
        /// List every instance instead of one line per pack.
        #[arg(long)]
        all: bool,
    },
    /// Install `<id>[@version|@nightly|@latest|@<commit>]` or a repository URL.
    Install { spec: String },
    /// Re-enable a disabled instance.
    Enable { spec: String },
    Disable { id: String },
    /// Remove every instance of a pack.
    Uninstall { id: String },
    Update { id: String },
    /// Make another version active.
    Switch { spec: String },
    /// Re-run post-install for the active instance.
    Fix { id: String },
    Resolve {
        spec: String,
        #[arg(long, value_enum, default_value_t = ScopeArg::Global)]
        scope: ScopeArg,
    },
    /// Run actions deferred by earlier runs.
    Recover,
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Install { .. }
                | Self::Enable { .. }
                | Self::Disable { .. }
                | Self::Uninstall { .. }
                | Self::Update { .. }
                | Self::Switch { .. }
                | Self::Fix { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Active,
    Inactive,
    Global,
}

impl From<ScopeArg> for ResolveScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Active => Self::Active,
            ScopeArg::Inactive => Self::Inactive,
            ScopeArg::Global => Self::Global,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match dispatch::run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render::render_error(&err));
            ExitCode::FAILURE
        }
    }
}
