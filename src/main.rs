mod entities;
mod errors;
mod rbac;
mod settings;
mod storage;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use migration::MigratorTrait;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "lodestone",
    version,
    about = "Content-management admin backend"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(database = %settings.database.url, "Loaded configuration");

    // a built-in role preset referencing an action its resource does not
    // allow must abort boot, not surface later as a runtime denial
    rbac::roles::validate_builtin_roles()?;

    // init storage (database) and bring the schema up to date
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    // materialize the permission/role registries and the first super-admin
    storage::seed_rbac(&db).await?;
    storage::ensure_bootstrap_admin(&db, &settings.bootstrap).await?;

    tracing::info!("Bootstrap complete");
    Ok(())
}
