use std::env;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::CommandFactory;
use nodepack_core::VersionSpec;
use nodepack_installer::{
    Collaborators, GitCli, HttpArchiveFetcher, ManagerConfig, NoopPostInstall, PackManager,
    PostInstall, PythonPostInstall, CONFIG_FILE_NAME,
};
use nodepack_registry::{FsRegistry, NoRegistry, Registry};
use nodepack_resolver::parse_pack_request;
use tracing::debug;

use crate::render::{
    current_output_style, format_instance_lines, format_outcome_lines, format_recovery_lines,
    format_summary_lines, OutputStyle, StatusLine, TerminalRenderer,
};
use crate::{Cli, Commands};

pub(crate) const CONFIG_ENV: &str = "NODEPACK_CONFIG";

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "nodepack", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(
        cli.config.as_deref(),
        env::var_os(CONFIG_ENV).map(PathBuf::from).as_deref(),
        cli.pack_root.as_deref(),
        cli.registry_root.as_deref(),
    )?;
    debug!(
        pack_root = %config.pack_root.display(),
        registry_root = ?config.registry_root,
        "loaded configuration"
    );

    let output_style = current_output_style();
    let renderer = TerminalRenderer::from_style(output_style);
    let registry: Box<dyn Registry> = match &config.registry_root {
        Some(root) => Box::new(FsRegistry::open(root)),
        None => Box::new(NoRegistry),
    };
    let post_install: Box<dyn PostInstall> = if config.post_install.enabled {
        Box::new(PythonPostInstall::new(config.post_install.interpreter.clone()))
    } else {
        Box::new(NoopPostInstall)
    };
    let fetcher = HttpArchiveFetcher::new(output_style == OutputStyle::Rich)?;
    let vcs = GitCli;
    let services = Collaborators {
        registry: registry.as_ref(),
        vcs: &vcs,
        fetcher: &fetcher,
        post_install: post_install.as_ref(),
    };
    let mut manager = PackManager::new(config, services)?;

    if cli.command.is_mutating() {
        let report = manager.run_recovery()?;
        renderer.print_status_lines(&format_recovery_lines(&report));
    }

    let outcome = match cli.command {
        Commands::List { all } => {
            let lines = if all {
                format_instance_lines(manager.index().instances())
            } else {
                format_summary_lines(&manager.installed_packs())
            };
            renderer.print_lines(&lines);
            return Ok(());
        }
        Commands::Resolve { spec, scope } => {
            let request = parse_pack_request(&spec)?;
            let version = manager.resolve(&request, scope.into())?;
            println!("{} {version}", request.id);
            return Ok(());
        }
        Commands::Recover => {
            let report = manager.run_recovery()?;
            let lines = format_recovery_lines(&report);
            if lines.is_empty() {
                renderer.print_status_lines(&[StatusLine {
                    status: "ok",
                    message: "no pending actions".to_string(),
                }]);
            } else {
                renderer.print_status_lines(&lines);
            }
            return Ok(());
        }
        Commands::Completions { .. } => return Ok(()),
        Commands::Install { spec } => {
            let request = parse_pack_request(&spec)?;
            manager.install(&request.id, request.spec.as_ref())?
        }
        Commands::Enable { spec } => {
            let request = parse_pack_request(&spec)?;
            manager.enable(&request.id, request.spec.as_ref())?
        }
        Commands::Disable { id } => manager.disable(&id)?,
        Commands::Uninstall { id } => manager.uninstall(&id)?,
        Commands::Update { id } => manager.update(&id)?,
        Commands::Switch { spec } => {
            let request = parse_pack_request(&spec)?;
            let target = request.spec.unwrap_or(VersionSpec::Latest);
            manager.switch_version(&request.id, &target)?
        }
        Commands::Fix { id } => manager.fix(&id)?,
    };

    renderer.print_status_lines(&format_outcome_lines(&outcome));
    Ok(())
}

/// Config file precedence: `--config`, then `$NODEPACK_CONFIG`, then
/// `<pack root>/nodepack.toml`, then defaults. Explicitly named files must
/// exist. Root flags override whatever the file says.
pub(crate) fn load_config(
    flag_path: Option<&Path>,
    env_path: Option<&Path>,
    pack_root: Option<&Path>,
    registry_root: Option<&Path>,
) -> Result<ManagerConfig> {
    let mut config = match flag_path.or(env_path) {
        Some(path) => ManagerConfig::load(path)?,
        None => {
            let root = pack_root
                .map(Path::to_path_buf)
                .unwrap_or_else(|| ManagerConfig::default().pack_root);
            ManagerConfig::load_optional(&root.join(CONFIG_FILE_NAME))?.unwrap_or_default()
        }
    };

    if let Some(pack_root) = pack_root {
        if pack_root.as_os_str().is_empty() {
            return Err(anyhow!("--pack-root must not be empty"));
        }
        config.pack_root = pack_root.to_path_buf();
    }
    if let Some(registry_root) = registry_root {
        config.registry_root = Some(registry_root.to_path_buf());
    }
    Ok(config)
}
