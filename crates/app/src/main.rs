use clap::Parser;
use ledger::FinanceService;
use migration::{Migrator, MigratorTrait};

mod cli;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = cli::Cli::parse();
    let settings = settings::Settings::load(cli.config.as_deref())?;

    // stdout carries the JSON output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "expense_ledger={level},ledger={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let service = build_service(&settings).await?;
    let output = cli::run(&service, cli.command, &cli.actor).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn build_service(
    settings: &settings::Settings,
) -> Result<FinanceService, Box<dyn std::error::Error + Send + Sync>> {
    let builder = FinanceService::builder().config(settings.ledger.clone());
    let builder = match settings.database.url() {
        Some(url) => {
            tracing::debug!(%url, "opening database");
            let database = sea_orm::Database::connect(url).await?;
            Migrator::up(&database, None).await?;
            builder.database(database)
        }
        None => {
            tracing::info!("using in-memory stores");
            builder
        }
    };
    Ok(builder.build().await?)
}
