use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Order as returned by the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor units.
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    /// `created`, `attempted` or `paid`.
    pub status: String,
    #[serde(default)]
    pub notes: Value,
}

impl GatewayOrder {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

/// Payment attempt as returned by the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    /// `created`, `authorized`, `captured`, `refunded` or `failed`.
    pub status: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == "captured"
    }
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Client for the Razorpay orders API.
///
/// Authenticates with HTTP basic auth (`key_id:key_secret`). Failures are
/// reported once; nothing here retries.
#[derive(Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    /// Creates a new `RazorpayClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.razorpay.com/v1`.
    /// * `key_id` - Public key id (also handed to the checkout widget).
    /// * `key_secret` - Secret used for basic auth and checkout signatures.
    pub fn new(base_url: String, key_id: String, key_secret: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create gateway client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn key_secret(&self) -> &str {
        &self.key_secret
    }

    /// Creates an order.
    ///
    /// # Arguments
    ///
    /// * `amount` - Amount in minor units.
    /// * `currency` - ISO currency code.
    /// * `receipt` - Merchant reference, at most 40 characters.
    /// * `notes` - Free-form key/value notes stored with the order.
    ///
    /// # Returns
    ///
    /// * `Result<GatewayOrder, AppError>` - The created order. A rejected
    ///   amount/currency or bad credentials surface as `ExternalApiError`.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
        notes: Value,
    ) -> Result<GatewayOrder, AppError> {
        let url = format!("{}/orders", self.base_url);
        tracing::info!(
            "Creating gateway order: amount={} currency={} receipt={}",
            amount,
            currency,
            receipt
        );

        let body = json!({
            "amount": amount,
            "currency": currency,
            "receipt": receipt,
            "notes": notes,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Gateway request failed: {}", e)))?;

        let order: GatewayOrder = Self::parse(response, "order creation").await?;
        tracing::info!("Gateway order created: {}", order.id);
        Ok(order)
    }

    /// Fetches an order by id.
    pub async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, AppError> {
        let url = format!("{}/orders/{}", self.base_url, order_id);
        tracing::debug!("Fetching gateway order {}", order_id);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Gateway request failed: {}", e)))?;

        Self::parse(response, "order fetch").await
    }

    /// Lists the payment attempts made against an order.
    pub async fn fetch_order_payments(
        &self,
        order_id: &str,
    ) -> Result<Vec<GatewayPayment>, AppError> {
        let url = format!("{}/orders/{}/payments", self.base_url, order_id);
        tracing::debug!("Fetching payments for gateway order {}", order_id);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Gateway request failed: {}", e)))?;

        let collection: Collection<GatewayPayment> =
            Self::parse(response, "order payments fetch").await?;
        Ok(collection.items)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Gateway {} failed {}: {}",
                what,
                status,
                gateway_error_description(&error_text)
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse gateway {} response: {}", what, e))
        })
    }
}

/// Pulls `error.description` out of a gateway error body, falling back to
/// the raw text.
fn gateway_error_description(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
