//! Utility to inspect the service tables and print their columns.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::env;

const SERVICE_TABLES: &[&str] = &[
    "leads",
    "questionnaire_responses",
    "submissions",
    "analysis_results",
];

/// Connects to the database and lists the columns of each service table.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = env::var("DB_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .context("DB_URL or DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    for table in SERVICE_TABLES {
        let columns: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position",
        )
        .bind(*table)
        .fetch_all(&pool)
        .await?;

        if columns.is_empty() {
            println!("- {} (missing)", table);
            println!();
            continue;
        }

        println!("- {}", table);
        for (col, type_, nullable) in columns {
            let null_marker = if nullable == "YES" { "" } else { " not null" };
            println!("  - {}: {}{}", col, type_, null_marker);
        }
        println!();
    }

    Ok(())
}
