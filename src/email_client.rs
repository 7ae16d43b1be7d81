use crate::circuit_breaker::{create_email_circuit_breaker, EmailCircuitBreaker};
use crate::errors::AppError;
use crate::models::{CompanyDirectorRecord, DataChangeReport, UnlockPaymentRecord};
use failsafe::futures::CircuitBreaker;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReceipt {
    #[serde(default)]
    pub id: Option<String>,
}

/// Client for the transactional email API (`POST /emails`).
#[derive(Clone)]
pub struct EmailClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
    breaker: EmailCircuitBreaker,
}

impl EmailClient {
    pub fn new(base_url: String, api_key: String, from: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create email client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from,
            breaker: create_email_circuit_breaker(),
        })
    }

    /// Sends one HTML email.
    ///
    /// While the circuit is open the call fails immediately without an HTTP
    /// request. Only provider outages count towards opening it; a message the
    /// provider refuses (bad recipient, 4xx) does not.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<EmailReceipt, AppError> {
        let request = self.send_inner(to, subject, html);
        match self.breaker.call_with(is_provider_failure, request).await {
            Ok(receipt) => Ok(receipt),
            Err(failsafe::Error::Inner(SendFailure::Refused(e)))
            | Err(failsafe::Error::Inner(SendFailure::Unavailable(e))) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "Email service circuit open; send skipped".to_string(),
            )),
        }
    }

    async fn send_inner(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<EmailReceipt, SendFailure> {
        let url = format!("{}/emails", self.base_url);
        tracing::info!("Sending email '{}' to {}", subject, to);

        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                SendFailure::Unavailable(AppError::ExternalApiError(format!(
                    "Email request failed: {}",
                    e
                )))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let error = AppError::ExternalApiError(format!(
                "Email service returned {}: {}",
                status, error_text
            ));
            return Err(if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                SendFailure::Refused(error)
            } else {
                SendFailure::Unavailable(error)
            });
        }

        let receipt: EmailReceipt = response.json().await.map_err(|e| {
            SendFailure::Unavailable(AppError::ExternalApiError(format!(
                "Failed to parse email response: {}",
                e
            )))
        })?;

        tracing::info!("Email accepted by provider: {:?}", receipt.id);
        Ok(receipt)
    }
}

/// Why a send failed, as far as the circuit breaker is concerned.
#[derive(Debug)]
enum SendFailure {
    /// The provider answered and refused this message (4xx other than 429).
    Refused(AppError),
    /// Transport error, timeout, rate limiting or 5xx.
    Unavailable(AppError),
}

fn is_provider_failure(failure: &SendFailure) -> bool {
    matches!(failure, SendFailure::Unavailable(_))
}

/// Minimal HTML escaping for values interpolated into email bodies.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn row(label: &str, value: Option<&str>) -> String {
    format!(
        "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
        label,
        escape_html(value.filter(|v| !v.trim().is_empty()).unwrap_or("-"))
    )
}

/// Subject and body of the email sent after a successful unlock.
pub fn format_unlock_email(
    payment: &UnlockPaymentRecord,
    director: &CompanyDirectorRecord,
    appointments: &[CompanyDirectorRecord],
) -> (String, String) {
    let name = director.director_full_name();
    let subject = format!("Contact details for {} (DIN {})", name, payment.din);

    let companies: String = appointments
        .iter()
        .map(|a| {
            format!(
                "<li>{} ({}){}</li>",
                escape_html(a.company_name.as_deref().unwrap_or("Unnamed company")),
                escape_html(&a.cin),
                a.designation
                    .as_deref()
                    .map(|d| format!(" - {}", escape_html(d)))
                    .unwrap_or_default()
            )
        })
        .collect();

    let html = format!(
        "<p>Hi {payer},</p>\
         <p>Thank you for your payment. Here are the details you unlocked.</p>\
         <table>{name_row}{din_row}{email_row}{mobile_row}{present_row}{permanent_row}</table>\
         <p>Appointments:</p><ul>{companies}</ul>\
         <p>Payment reference: {payment_id} ({amount} {currency})</p>",
        payer = escape_html(&payment.payer_name),
        name_row = row("Name", Some(&name)),
        din_row = row("DIN", Some(&payment.din)),
        email_row = row("Email", director.director_email.as_deref()),
        mobile_row = row("Mobile", director.director_mobile.as_deref()),
        present_row = row("Present address", director.present_address_line().as_deref()),
        permanent_row = row(
            "Permanent address",
            director.permanent_address_line().as_deref()
        ),
        companies = companies,
        payment_id = escape_html(&payment.payment_id),
        amount = format_minor_units(payment.amount),
        currency = escape_html(&payment.currency),
    );

    (subject, html)
}

/// Subject and body of the internal "data change reported" notification.
pub fn format_report_email(report: &DataChangeReport, cin: &str, din: Option<&str>) -> (String, String) {
    let subject = format!("Data change reported for {}", cin);
    let html = format!(
        "<p>A user reported that registry data may be wrong.</p>\
         <table>{cin_row}{din_row}{reporter_row}</table>\
         <p>{message}</p>",
        cin_row = row("CIN", Some(cin)),
        din_row = row("DIN", din),
        reporter_row = row("Reporter", report.reporter_email.as_deref()),
        message = escape_html(report.message.trim()),
    );
    (subject, html)
}

/// `10000` → `"100.00"`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
