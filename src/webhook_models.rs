use crate::gateway_client::GatewayPayment;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PAYMENT_CAPTURED: &str = "payment.captured";

/// Gateway webhook envelope.
///
/// Only the payment entity is typed; everything else is kept raw for logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayWebhookEvent {
    /// Event name (e.g. "payment.captured", "order.paid")
    pub event: String,

    #[serde(default)]
    pub payload: WebhookEventPayload,

    /// Unix seconds
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookEventPayload {
    #[serde(default)]
    pub payment: Option<EntityWrapper<GatewayPayment>>,

    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

impl GatewayWebhookEvent {
    /// The captured payment carried by a `payment.captured` event.
    pub fn captured_payment(&self) -> Option<&GatewayPayment> {
        if self.event != PAYMENT_CAPTURED {
            return None;
        }
        self.payload
            .payment
            .as_ref()
            .map(|p| &p.entity)
            .filter(|p| p.is_captured())
    }
}

/// Response to webhook
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub received: usize,
    pub processed: usize,
    pub duplicates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, status: &str) -> GatewayWebhookEvent {
        serde_json::from_value(json!({
            "entity": "event",
            "account_id": "acc_test",
            "event": name,
            "contains": ["payment"],
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_29QQoUBi66xm2f",
                        "entity": "payment",
                        "amount": 10000,
                        "currency": "INR",
                        "status": status,
                        "order_id": "order_9A33XWu170gUtm",
                        "email": "buyer@example.com",
                        "contact": "+919876543210"
                    }
                }
            },
            "created_at": 1_700_000_000
        }))
        .unwrap()
    }

    #[test]
    fn captured_payment_extracted() {
        let e = event("payment.captured", "captured");
        let payment = e.captured_payment().unwrap();
        assert_eq!(payment.id, "pay_29QQoUBi66xm2f");
        assert_eq!(payment.order_id.as_deref(), Some("order_9A33XWu170gUtm"));
        assert_eq!(payment.amount, 10000);
    }

    #[test]
    fn other_events_ignored() {
        assert!(event("payment.failed", "failed").captured_payment().is_none());
        assert!(event("payment.authorized", "authorized")
            .captured_payment()
            .is_none());
    }

    #[test]
    fn payload_without_payment_parses() {
        let e: GatewayWebhookEvent = serde_json::from_value(json!({
            "event": "order.paid",
            "payload": { "order": { "entity": { "id": "order_1" } } }
        }))
        .unwrap();
        assert!(e.payload.payment.is_none());
        assert!(e.captured_payment().is_none());
    }
}
