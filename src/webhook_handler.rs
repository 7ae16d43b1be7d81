use crate::errors::AppError;
use crate::gateway_client::GatewayPayment;
use crate::handlers::AppState;
use crate::models::{PaymentSource, UnlockPaymentRecord};
use crate::signature::verify_webhook_signature;
use crate::unlock::{persist_unlock, spawn_unlock_notification_lookup, UnlockStore};
use crate::webhook_models::{GatewayWebhookEvent, WebhookResponse};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Payment gateway webhook.
///
/// Covers checkouts whose client never called `/unlock/verify` (closed tab,
/// network drop). The body is authenticated with an HMAC of the raw bytes,
/// so it is read as `Bytes` before any JSON parsing.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    validate_webhook_signature(&state, &headers, &body)?;

    let event: GatewayWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
    tracing::info!("Received gateway webhook: {}", event.event);

    let mut processed = 0;
    let mut duplicates = 0;

    if let Some(payment) = event.captured_payment() {
        let store = state.unlock_store();
        match process_captured_payment(&store, payment).await {
            Ok(ProcessResult::Processed(record)) => {
                processed += 1;
                spawn_unlock_notification_lookup(store.clone(), state.email.clone(), record);
            }
            Ok(ProcessResult::Duplicate) => {
                duplicates += 1;
                tracing::debug!("Payment {} already recorded", payment.id);
            }
            Ok(ProcessResult::Ignored(reason)) => {
                tracing::info!("Ignoring payment {}: {}", payment.id, reason);
            }
            Err(e) => {
                // A 5xx makes the gateway redeliver later.
                tracing::error!("Failed to process payment {}: {}", payment.id, e);
                return Err(e);
            }
        }
    }

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            status: "received".to_string(),
            received: 1,
            processed,
            duplicates,
        }),
    ))
}

/// Checks `X-Razorpay-Signature` against the configured webhook secret.
/// Without a secret every delivery is refused.
fn validate_webhook_signature(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), AppError> {
    let Some(ref secret) = state.config.razorpay_webhook_secret else {
        tracing::warn!("Webhook received but RAZORPAY_WEBHOOK_SECRET is not set");
        return Err(AppError::Unauthorized(
            "Webhook secret not configured".to_string(),
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", SIGNATURE_HEADER)))?;

    if !verify_webhook_signature(secret, body, signature) {
        tracing::warn!("Invalid webhook signature received");
        return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
    }

    Ok(())
}

#[derive(Debug)]
pub enum ProcessResult {
    Processed(UnlockPaymentRecord),
    Duplicate,
    Ignored(String),
}

/// Records a captured payment against its unlock order.
///
/// Payments for orders this service did not create, or whose amount differs
/// from the order, are ignored.
pub async fn process_captured_payment<S: UnlockStore>(
    store: &S,
    payment: &GatewayPayment,
) -> Result<ProcessResult, AppError> {
    let Some(order_id) = payment.order_id.as_deref() else {
        return Ok(ProcessResult::Ignored("no order id".to_string()));
    };

    let Some(order) = store.find_order(order_id).await? else {
        return Ok(ProcessResult::Ignored(format!("unknown order {}", order_id)));
    };

    if payment.amount != order.amount || payment.currency != order.currency {
        tracing::warn!(
            "Payment {} is for {} {}, order {} expects {} {}",
            payment.id,
            payment.amount,
            payment.currency,
            order_id,
            order.amount,
            order.currency
        );
        return Ok(ProcessResult::Ignored("amount mismatch".to_string()));
    }

    let persisted = persist_unlock(store, &order, &payment.id, None, PaymentSource::Webhook).await?;
    if persisted.already_recorded {
        Ok(ProcessResult::Duplicate)
    } else {
        Ok(ProcessResult::Processed(persisted.payment))
    }
}
