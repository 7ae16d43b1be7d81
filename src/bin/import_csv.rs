//! Imports a registry CSV from disk, the same way the admin upload does.
//!
//! Usage: `import_csv <path/to/file.csv>`

use anyhow::Context;
use cin_lookup_api::csv_import::parse_csv;
use cin_lookup_api::db::Database;
use cin_lookup_api::db_storage::RecordStorage;
use cin_lookup_api::validation::import_file_name;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let path = env::args()
        .nth(1)
        .context("usage: import_csv <path/to/file.csv>")?;
    let file_name = import_file_name(&path)?;

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::new(&database_url).await?;

    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path))?;

    tracing::info!("Importing {} as {}", path, file_name);

    let parsed = parse_csv(&bytes, &file_name)?;
    let report = RecordStorage::new(db.pool.clone())
        .import(&file_name, parsed, None)
        .await?;

    tracing::info!(
        "Import complete. {} inserted, {} duplicate, {} invalid",
        report.rows_inserted,
        report.rows_duplicate,
        report.rows_invalid
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
