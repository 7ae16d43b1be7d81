//! One-shot reconciliation of unlock orders against the payment gateway.
//!
//! Runs the same sweep as the server's background task, without sending
//! emails, and prints the counts.

use chrono::Utc;
use cin_lookup_api::config::Config;
use cin_lookup_api::db::Database;
use cin_lookup_api::db_storage::PgUnlockStore;
use cin_lookup_api::gateway_client::RazorpayClient;
use cin_lookup_api::reconciliation::reconcile_pending_orders;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;

    let gateway = RazorpayClient::new(
        config.razorpay_base_url.clone(),
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    )?;

    tracing::info!("Connected to database. Reconciling pending unlock orders...");

    let store = PgUnlockStore::new(db.pool.clone());
    let report = reconcile_pending_orders(&store, &gateway, None, Utc::now()).await?;

    tracing::info!(
        "Reconciliation complete. checked={} recovered={} expired={} errors={}",
        report.checked,
        report.recovered,
        report.expired,
        report.errors
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
