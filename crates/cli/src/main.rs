mod vault_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "tally", about = "tally: encrypted local entry vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of tally.{toml,json}).
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Store file (overrides `storage.path`).
    #[arg(long, global = true, env = "TALLY_STORE")]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Vault management (setup, unlock, encrypt, migrate, clear).
    Vault {
        #[command(subcommand)]
        action: vault_commands::VaultAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<tally_config::TallyConfig> {
    let mut config = match &cli.config {
        Some(path) => tally_config::load_config(path)?,
        None => tally_config::discover_and_load(),
    };
    if let Some(store) = &cli.store {
        config.storage.path = Some(store.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "tally starting");

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Vault { action } => vault_commands::handle_vault(action, &config).await,
    }
}
