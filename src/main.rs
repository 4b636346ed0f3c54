use std::path::PathBuf;

use clap::Parser;
use guestgate::engine::{Engine, EngineConfig};
use guestgate::{seed, settings, storage, web};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "guestgate",
    version,
    about = "Captive-portal guest access authorization"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Import a newline-separated voucher list before serving
    #[arg(long)]
    vouchers: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database + migrations)
    let db = storage::init(&settings.database).await.into_diagnostic()?;

    let engine = Engine::new(db, EngineConfig::from_settings(&settings));
    tracing::info!(policy = ?engine.policy(), "Issuance policy selected");

    // The flag wins over the configured file
    let voucher_file = cli.vouchers.or_else(|| settings.portal.voucher_file.clone());
    seed::bootstrap(&engine, voucher_file.as_deref())
        .await
        .into_diagnostic()?;

    web::serve(settings, engine).await?;
    Ok(())
}
