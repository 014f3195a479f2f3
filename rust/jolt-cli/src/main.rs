//! Jolt CLI: an interactive shell that evaluates fragments one at a time.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};
use jolt_cli::colors::Palette;
use jolt_cli::config::JoltConfig;
use jolt_cli::logging;
use jolt_cli::repl::{self, ReplOptions, Shell};
use jolt_engine::Engine;
use jolt_vm::VmService;
use tracing::{debug, info};

#[derive(ClapParser)]
#[command(
    name = "jolt",
    version,
    about = "Evaluate class-based language fragments incrementally"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Read settings from this file instead of searching for jolt.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory under which compiled units are staged
    #[arg(long, global = true)]
    staging_root: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log filter, e.g. `debug` or `jolt_engine=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell (the default)
    Repl,
    /// Evaluate every fragment in a file, as if typed at the prompt
    Eval {
        #[arg()]
        file: PathBuf,

        /// Continue after a failing fragment
        #[arg(long)]
        keep_going: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => JoltConfig::load_from(path).map(|cfg| Some((path.clone(), cfg))),
        None => JoltConfig::load(),
    };
    let (config_path, config) = match loaded {
        Ok(Some((path, cfg))) => (Some(path), cfg),
        Ok(None) => (None, JoltConfig::default()),
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    logging::init(cli.log_level.as_deref(), config.log.level.as_deref());
    if let Some(path) = &config_path {
        debug!(path = %path.display(), "loaded configuration");
    }

    let palette = Palette::new(config.color && !cli.no_color && std::io::stdout().is_terminal());
    let staging_root = cli.staging_root.clone().unwrap_or_else(|| config.staging_root());
    let service = VmService::with_staging(&staging_root);
    if let Some(dir) = service.staging_dir() {
        info!(dir = %dir.display(), "staging session units");
    }
    let mut shell = Shell::new(Engine::new(service), palette);

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => {
            let options = ReplOptions {
                palette,
                history_path: repl::history_path(config.history_path.as_deref()),
            };
            match repl::run_repl(shell, options) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("{} {}", palette.red("error:"), err);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Eval { file, keep_going } => {
            let result = shell.eval_file(&file, keep_going);
            shell.shutdown();
            match result {
                Ok(0) => ExitCode::SUCCESS,
                Ok(failed) => {
                    eprintln!("{} {} fragment(s) failed", palette.red("error:"), failed);
                    ExitCode::FAILURE
                }
                Err(err) => {
                    eprintln!(
                        "{} cannot read '{}': {}",
                        palette.red("error:"),
                        file.display(),
                        err
                    );
                    ExitCode::FAILURE
                }
            }
        }
    }
}
