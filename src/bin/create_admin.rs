//! Promotes an existing account to administrator.
//!
//! Usage: `create_admin [email]` (falls back to `ADMIN_EMAIL`). The account
//! must already be registered through `/api/v1/auth/register`.

use anyhow::Context;
use cin_lookup_api::auth::promote_to_admin;
use cin_lookup_api::db::Database;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let email = env::args()
        .nth(1)
        .or_else(|| env::var("ADMIN_EMAIL").ok())
        .filter(|e| !e.trim().is_empty())
        .context("usage: create_admin <email> (or set ADMIN_EMAIL)")?;

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::new(&database_url).await?;

    let user = promote_to_admin(&db.pool, &email).await?;
    tracing::info!("User {} is now an administrator", user.id);
    println!("{} ({}) is now an administrator", user.email, user.id);

    Ok(())
}
