use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jobjar::packager::{self, PackageConfig, Packager};
use jobjar::launcher;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jobjar", version, about = "Package and launch map/reduce job artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the job artifact for a project
    Package {
        /// Project file
        #[arg(long, default_value = "jobjar.toml")]
        config: PathBuf,
        /// Resolved library lock file; overrides the project file
        #[arg(long)]
        lock: Option<PathBuf>,
        /// Runner binary to embed; overrides the project file
        #[arg(long)]
        entry_point: Option<PathBuf>,
    },
    /// Remove previously built artifacts
    Clean {
        #[arg(long, default_value = "jobjar.toml")]
        config: PathBuf,
    },
    /// Print the flattened library list of a lock file
    Resolve {
        #[arg(long, default_value = "jobjar.lock")]
        lock: PathBuf,
    },
    /// Unpack an artifact and run its entry point
    Launch {
        artifact: PathBuf,
        /// Passed to the entry point: `<job-description> <input> <output>`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Package { config, lock, entry_point } => {
            let cfg = PackageConfig::from_project_file(&config, lock.as_deref(), entry_point.as_deref())?;
            let artifact = Packager::new(cfg).package()?;
            println!("{}", artifact.path.display());
        }
        Command::Clean { config } => {
            let cfg = PackageConfig::from_project_file(&config, None, None)?;
            let removed = packager::clean(&cfg.build_dir)?;
            info!(removed, build_dir = %cfg.build_dir.display(), "Clean complete");
        }
        Command::Resolve { lock } => {
            for lib in packager::load_lock(&lock)? {
                println!("{}\t{}", lib.identity(), lib.root.display());
            }
        }
        Command::Launch { artifact, args } => {
            let status = launcher::launch(&artifact, &args, &[])?;
            if !status.success() {
                bail!("artifact exited with {}", status);
            }
        }
    }
    Ok(())
}
