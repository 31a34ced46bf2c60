use precis::{config::Config, telemetry};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Applies pending migrations and exits. Safe to run on every deploy.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format());

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(config.database_url())
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied");

    Ok(())
}
