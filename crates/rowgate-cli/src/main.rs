use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use rowgate_core::config::{Config, ConfigWarning, WarnLevel};

#[derive(Parser)]
#[command(
    name = "rowgate",
    about = "Template-driven SQL-to-HTTP dispatcher — stored actions become live JSON endpoints",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: the executable's own path with a .json extension)
    #[arg(long, global = true, env = "ROWGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP dispatcher
    Serve,

    /// Load the config file and report problems without starting
    Check,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve => tracing::Level::INFO,
        Commands::Check => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());

    let result = match cli.command {
        Commands::Serve => run_serve(&config_path),
        Commands::Check => run_check(&config_path),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// Deployment convention: the config is a JSON file sitting next to the
/// binary and named after it, unless overridden by flag or environment.
fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    let mut path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("rowgate"));
    path.set_extension("json");
    path
}

fn run_serve(path: &Path) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => anyhow::bail!("config error: {}", warning.message),
            WarnLevel::Warning => tracing::warn!("config: {}", warning.message),
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(rowgate_server::serve(config))
}

fn run_check(path: &Path) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    let warnings = config.validate();
    if warnings.is_empty() {
        println!("{} OK", path.display());
        return Ok(());
    }
    print_warnings(&warnings);
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config has errors");
    }
    Ok(())
}

fn print_warnings(warnings: &[ConfigWarning]) {
    for warning in warnings {
        match warning.level {
            WarnLevel::Error => eprintln!("error: {}", warning.message),
            WarnLevel::Warning => eprintln!("warning: {}", warning.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
