//! Standalone migration CLI: materialize the schema without starting the HTTP
//! server, e.g. for a deploy step run ahead of the rolling restart.

use anyhow::{Context, Result};
use clap::Parser;
use kurbisio::model::{meta_schema, Configuration};
use kurbisio::schema::materialize;
use kurbisio::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(about = "Materialize the kurbisio schema from its declarative configuration document")]
struct Args {
    /// Re-run every DDL statement even if the configuration's fingerprint is unchanged.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,kurbisio=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let document = config.load_resource_config()?;

    let parsed_document: serde_json::Value = serde_json::from_str(&document)
        .context("configuration document is not valid JSON")?;
    meta_schema::validate(&parsed_document).context("configuration document failed schema validation")?;
    let parsed = Configuration::from_json(&document).context("failed to parse configuration document")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    let migrated = materialize(&pool, &config.schema_name, &parsed, &document, args.force)
        .await
        .context("migration failed")?;

    if migrated {
        tracing::info!("schema migrated");
    } else {
        tracing::info!("schema already up to date, fingerprint unchanged");
    }

    Ok(())
}
