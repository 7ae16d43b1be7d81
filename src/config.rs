use serde::Deserialize;

pub const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com/v1";
pub const DEFAULT_EMAIL_BASE_URL: &str = "https://api.resend.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_base_url: String,
    /// Webhooks are refused while this is unset.
    pub razorpay_webhook_secret: Option<String>,
    pub email_api_key: String,
    pub email_base_url: String,
    pub email_from: String,
    /// Receives data-change reports. Reports are accepted but not mailed when unset.
    pub admin_notify_email: Option<String>,
    pub cookie_secure: bool,
    /// Seconds between reconciliation sweeps; 0 disables the background task.
    pub reconcile_interval_secs: u64,
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn http_url(name: &str, default: &str) -> anyhow::Result<String> {
    let raw = optional(name).unwrap_or_else(|| default.to_string());
    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(raw.trim_end_matches('/').to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            razorpay_key_id: required("RAZORPAY_KEY_ID")?,
            razorpay_key_secret: required("RAZORPAY_KEY_SECRET")?,
            razorpay_base_url: http_url("RAZORPAY_BASE_URL", DEFAULT_RAZORPAY_BASE_URL)?,
            razorpay_webhook_secret: optional("RAZORPAY_WEBHOOK_SECRET"),
            email_api_key: required("EMAIL_API_KEY")?,
            email_base_url: http_url("EMAIL_BASE_URL", DEFAULT_EMAIL_BASE_URL)?,
            email_from: required("EMAIL_FROM")?,
            admin_notify_email: optional("ADMIN_NOTIFY_EMAIL"),
            cookie_secure: optional("COOKIE_SECURE")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            reconcile_interval_secs: optional("RECONCILE_INTERVAL_SECS")
                .map(|v| v.trim().parse::<u64>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("RECONCILE_INTERVAL_SECS must be a whole number"))?
                .unwrap_or(300),
        };

        // Never log secrets; the key id is public (it is sent to the browser).
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Razorpay base URL: {}", config.razorpay_base_url);
        tracing::debug!("Razorpay key id: {}", config.razorpay_key_id);
        if config.razorpay_webhook_secret.is_none() {
            tracing::warn!("RAZORPAY_WEBHOOK_SECRET not set; payment webhooks will be rejected");
        }
        tracing::debug!("Email base URL: {}", config.email_base_url);
        if config.admin_notify_email.is_none() {
            tracing::warn!("ADMIN_NOTIFY_EMAIL not set; data-change reports will not be mailed");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
