use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, LevelFilter};
use pacman_vcs::command::TRACE_TARGET;
use pacman_vcs::{driver, Config, SystemCommandRunner, VcsKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Trace every external command before running it.
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Properties file with additional settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Version control system of the repository.
    #[arg(long, global = true, default_value = "git")]
    vcs: VcsKind,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Prints whether a directory already holds a checkout of a remote.
    Exists {
        /// Remote repository URI.
        remote: String,
        /// Local directory to inspect.
        dir: PathBuf,
    },
    /// Checks out a remote repository into a new directory.
    Checkout {
        /// Remote repository URI.
        remote: String,
        /// Directory the checkout is created at.
        into: PathBuf,
    },
    /// Fetches remote changes without touching the working tree.
    Fetch {
        /// Path of an existing checkout.
        path: PathBuf,
    },
    /// Applies fetched changes to the working tree.
    Update {
        /// Path of an existing checkout.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().merge(Config { debug: cli.debug });
    if let Some(path) = &cli.config {
        config = config.merge(Config::from_file(path)?);
    }

    let log_level = if config.debug { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(log_level));
    if config.debug {
        builder.filter_module(TRACE_TARGET, LevelFilter::Debug);
    }
    builder.init();
    debug!("Effective configuration: {:?}", config);

    let runner = SystemCommandRunner::new(&config);
    let backend = driver(cli.vcs);

    match &cli.command {
        Commands::Exists { remote, dir } => {
            let exists = backend
                .exists(&runner, remote, dir)
                .with_context(|| {
                    format!("Checking {} for a checkout of {}", dir.display(), remote)
                })?;
            println!("{}", exists);
        }
        Commands::Checkout { remote, into } => {
            backend
                .checkout(&runner, remote, into)
                .with_context(|| format!("Checking out {} into {}", remote, into.display()))?;
        }
        Commands::Fetch { path } => {
            backend
                .fetch(&runner, path)
                .with_context(|| format!("Fetching {}", path.display()))?;
        }
        Commands::Update { path } => {
            backend
                .update(&runner, path)
                .with_context(|| format!("Updating {}", path.display()))?;
        }
    }

    Ok(())
}
