use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_URL: &str = "sqlite:./ledger.db?mode=rwc";

/// `LEDGER_DATABASE_URL` wins over the generic `DATABASE_URL`.
fn database_url() -> String {
    ["LEDGER_DATABASE_URL", "DATABASE_URL"]
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .unwrap_or_else(|| DEFAULT_URL.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let action = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    let db = Database::connect(&database_url()).await?;

    match action.as_str() {
        "up" => migration::Migrator::up(&db, None).await?,
        "down" => migration::Migrator::down(&db, Some(1)).await?,
        "reset" => migration::Migrator::refresh(&db).await?,
        "status" => migration::Migrator::status(&db).await?,
        other => {
            eprintln!("unknown action `{other}`; expected one of: up, down, reset, status");
            std::process::exit(2);
        }
    }

    Ok(())
}
