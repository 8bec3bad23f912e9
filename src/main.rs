use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use probehive::bucket::{self, NUM_BUCKETS};
use probehive::config::Config;
use probehive::session::Session;

/// Kernel-probe aggregation core.
#[derive(Parser)]
#[command(name = "probehive", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate the configuration, then construct a session.
    Check,
    /// Print the histogram bucket index to value-range table.
    Buckets,
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Command::Version = cli.command {
        println!("probehive {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    match cli.command {
        Command::Check => check(cli.config.as_deref()),
        Command::Buckets => {
            print_buckets();
            Ok(())
        }
        // Handled before tracing init.
        Command::Version => Ok(()),
    }
}

fn check(config_path: Option<&std::path::Path>) -> Result<()> {
    let cfg = match config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    tracing::info!(version = version::RELEASE, "configuration is valid");

    // Construct a session to surface any capacity mistakes early.
    let _session = Session::new(&cfg);

    println!("ok");
    Ok(())
}

fn print_buckets() {
    println!("{:>5}  {:>12}  {:>12}", "index", "low", "high");
    for index in 0..NUM_BUCKETS as u32 {
        // In range by construction.
        let Some(range) = bucket::bucket_range(index) else {
            continue;
        };
        match range.high {
            Some(high) => println!("{index:>5}  {:>12}  {high:>12}", range.low),
            None => println!("{index:>5}  {:>12}  {:>12}", range.low, "inf"),
        }
    }
}
