/// Pay-to-unlock workflow shared by the checkout, webhook and
/// reconciliation paths:
///
/// 1. Resolve the director and the payer
/// 2. Create a gateway order for the fixed price
/// 3. Verify the checkout signature and corroborate the order with the gateway
/// 4. Persist the payment at most once per payment id
/// 5. Reveal the unmasked director and send the notification email
use crate::email_client::{format_unlock_email, EmailClient};
use crate::errors::{AppError, ResultExt};
use crate::gateway_client::RazorpayClient;
use crate::models::*;
use crate::services::director_profile;
use crate::signature::verify_payment_signature;
use crate::validation::{is_valid_email, normalize_din_value, validate_in_phone};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::future::Future;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Fixed unlock price in minor units (paise).
pub const UNLOCK_PRICE_MINOR: i64 = 10_000;
pub const UNLOCK_CURRENCY: &str = "INR";

/// Persistence the unlock flow needs. Implemented over Postgres in
/// `db_storage` and in memory by the tests.
pub trait UnlockStore: Send + Sync {
    /// Appointment rows for a canonical DIN, oldest first.
    fn director_rows(
        &self,
        din: &str,
    ) -> impl Future<Output = Result<Vec<CompanyDirectorRecord>, AppError>> + Send;

    fn insert_order(&self, order: &UnlockOrder) -> impl Future<Output = Result<(), AppError>> + Send;

    fn find_order(
        &self,
        order_id: &str,
    ) -> impl Future<Output = Result<Option<UnlockOrder>, AppError>> + Send;

    /// Moves an order to `status`. Returns false when the order does not exist.
    fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn find_payment(
        &self,
        payment_id: &str,
    ) -> impl Future<Output = Result<Option<UnlockPaymentRecord>, AppError>> + Send;

    /// Inserts unless a record with the same payment id exists. Returns
    /// whether a row was written.
    fn insert_payment(
        &self,
        record: &UnlockPaymentRecord,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Up to `limit` orders still `created` that were created before
    /// `before`, ordered by `(created_at, order_id)` and starting after
    /// `after` when given.
    fn pending_orders(
        &self,
        before: DateTime<Utc>,
        after: Option<&UnlockOrder>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<UnlockOrder>, AppError>> + Send;
}

/// Who pays and where the unlock email goes.
#[derive(Debug, Clone, PartialEq)]
pub struct Payer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Payer details default to the account's own; supplied values are validated.
pub fn resolve_payer(user: &User, request: &CreateOrderRequest) -> Result<Payer, AppError> {
    let name = request
        .payer_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&user.name)
        .to_string();

    let email = request
        .payer_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(&user.email)
        .to_string();
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest(format!("Invalid payer email '{}'", email)));
    }

    let raw_phone = request
        .payer_phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .or(user.phone.as_deref());
    let phone = match raw_phone {
        Some(raw) => {
            let (valid, normalized) = validate_in_phone(raw);
            if !valid {
                return Err(AppError::BadRequest(format!("Invalid payer phone '{}'", raw)));
            }
            Some(normalized)
        }
        None => None,
    };

    Ok(Payer { name, email, phone })
}

/// Receipt reference embedding the DIN and a millisecond timestamp.
pub fn receipt_for(din: &str, now: DateTime<Utc>) -> String {
    format!("unlock_{}_{}", din, now.timestamp_millis())
}

/// Creates a gateway order to unlock `request.din` for `user`.
///
/// Nothing is stored when the gateway rejects the order.
pub async fn create_order<S: UnlockStore>(
    store: &S,
    gateway: &RazorpayClient,
    user: &User,
    request: &CreateOrderRequest,
) -> Result<CreateOrderResponse, AppError> {
    let din = normalize_din_value(&request.din)?;
    let payer = resolve_payer(user, request)?;

    let rows = store.director_rows(&din).await?;
    let primary = rows
        .first()
        .ok_or_else(|| AppError::NotFound(format!("No director found for DIN {}", din)))?;

    let now = Utc::now();
    let receipt = receipt_for(&din, now);
    let notes = json!({
        "din": din,
        "user_id": user.id.to_string(),
    });

    let gateway_order = gateway
        .create_order(UNLOCK_PRICE_MINOR, UNLOCK_CURRENCY, &receipt, notes)
        .await
        .context("creating unlock order")?;

    if gateway_order.amount != UNLOCK_PRICE_MINOR || gateway_order.currency != UNLOCK_CURRENCY {
        return Err(AppError::ExternalApiError(format!(
            "Gateway created order {} for {} {}, expected {} {}",
            gateway_order.id,
            gateway_order.amount,
            gateway_order.currency,
            UNLOCK_PRICE_MINOR,
            UNLOCK_CURRENCY
        )));
    }

    let order = UnlockOrder {
        order_id: gateway_order.id.clone(),
        user_id: user.id,
        din: din.clone(),
        amount: gateway_order.amount,
        currency: gateway_order.currency.clone(),
        receipt: receipt.clone(),
        payer_name: payer.name,
        payer_email: payer.email,
        payer_phone: payer.phone,
        status: OrderStatus::Created.as_str().to_string(),
        failure_reason: None,
        created_at: now,
        updated_at: None,
    };
    store.insert_order(&order).await?;

    tracing::info!(
        "Unlock order {} created for DIN {} by user {}",
        order.order_id,
        din,
        user.id
    );

    Ok(CreateOrderResponse {
        order_id: order.order_id,
        amount: order.amount,
        currency: order.currency,
        receipt,
        key_id: gateway.key_id().to_string(),
        din,
        director: primary.masked(),
    })
}

/// Looks up an order and checks it belongs to `user`.
async fn owned_order<S: UnlockStore>(
    store: &S,
    user: &User,
    order_id: &str,
) -> Result<UnlockOrder, AppError> {
    let order = store
        .find_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown order {}", order_id)))?;

    if order.user_id != user.id {
        return Err(AppError::Forbidden(format!(
            "Order {} does not belong to user {}",
            order_id, user.id
        )));
    }
    Ok(order)
}

/// Payer closed the checkout widget. The order stays unpaid and unlocks
/// nothing.
pub async fn dismiss_order<S: UnlockStore>(
    store: &S,
    user: &User,
    order_id: &str,
) -> Result<UnlockOrder, AppError> {
    let mut order = owned_order(store, user, order_id).await?;

    if order.status() == Some(OrderStatus::Created) {
        store
            .set_order_status(order_id, OrderStatus::Dismissed, None)
            .await?;
        order.status = OrderStatus::Dismissed.as_str().to_string();
        tracing::info!("Unlock order {} dismissed", order_id);
    }
    Ok(order)
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedUnlock {
    pub payment: UnlockPaymentRecord,
    pub already_recorded: bool,
    pub director: DirectorProfile,
}

/// Verifies a completed checkout and records the unlock.
///
/// Calling this again with the same payment id succeeds without writing a
/// second record (`already_recorded` is then true).
pub async fn verify_and_persist<S: UnlockStore>(
    store: &S,
    gateway: &RazorpayClient,
    user: &User,
    request: &VerifyPaymentRequest,
) -> Result<VerifiedUnlock, AppError> {
    let order_id = request.order_id.trim();
    let payment_id = request.payment_id.trim();
    let signature = request.signature.trim();
    if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
        return Err(AppError::BadRequest(
            "order_id, payment_id and signature are required".to_string(),
        ));
    }

    let order = owned_order(store, user, order_id).await?;

    match order.status() {
        Some(OrderStatus::Failed) => {
            return Err(AppError::VerificationFailed(format!(
                "Order {} already failed verification; start a new payment",
                order_id
            )));
        }
        Some(OrderStatus::Expired) => {
            return Err(AppError::VerificationFailed(format!(
                "Order {} has expired",
                order_id
            )));
        }
        _ => {}
    }

    if !verify_payment_signature(gateway.key_secret(), order_id, payment_id, signature) {
        store
            .set_order_status(order_id, OrderStatus::Failed, Some("signature mismatch"))
            .await?;
        return Err(AppError::VerificationFailed(format!(
            "Signature mismatch for order {} payment {}",
            order_id, payment_id
        )));
    }

    // A retry after a network blip lands here with the payment already saved.
    if let Some(existing) = store.find_payment(payment_id).await? {
        if existing.order_id != order_id {
            return Err(AppError::VerificationFailed(format!(
                "Payment {} is recorded against order {}",
                payment_id, existing.order_id
            )));
        }
        tracing::info!("Payment {} already recorded; returning it", payment_id);
        let rows = store.director_rows(&existing.din).await?;
        return Ok(VerifiedUnlock {
            director: director_profile(existing.din.clone(), rows, true),
            payment: existing,
            already_recorded: true,
        });
    }

    let gateway_order = gateway
        .fetch_order(order_id)
        .await
        .context("corroborating order with gateway")?;
    if gateway_order.amount != order.amount || gateway_order.currency != order.currency {
        store
            .set_order_status(order_id, OrderStatus::Failed, Some("amount mismatch"))
            .await?;
        return Err(AppError::VerificationFailed(format!(
            "Gateway order {} is for {} {}, expected {} {}",
            order_id, gateway_order.amount, gateway_order.currency, order.amount, order.currency
        )));
    }

    // Read before writing: once the payment row exists, a failed read would
    // turn a granted unlock into an error and the retry would skip the email.
    let rows = store.director_rows(&order.din).await?;

    let persisted = persist_unlock(
        store,
        &order,
        payment_id,
        Some(signature),
        PaymentSource::Checkout,
    )
    .await?;

    Ok(VerifiedUnlock {
        director: director_profile(order.din.clone(), rows, true),
        payment: persisted.payment,
        already_recorded: persisted.already_recorded,
    })
}

#[derive(Debug, Clone)]
pub struct PersistedUnlock {
    pub payment: UnlockPaymentRecord,
    pub already_recorded: bool,
}

/// Writes the unlock record for `payment_id` at most once and marks the
/// order verified.
///
/// Callers must have established that the payment is genuine.
pub async fn persist_unlock<S: UnlockStore>(
    store: &S,
    order: &UnlockOrder,
    payment_id: &str,
    signature: Option<&str>,
    source: PaymentSource,
) -> Result<PersistedUnlock, AppError> {
    if let Some(existing) = store.find_payment(payment_id).await? {
        return Ok(PersistedUnlock {
            payment: existing,
            already_recorded: true,
        });
    }

    let record = UnlockPaymentRecord {
        id: Uuid::new_v4(),
        user_id: order.user_id,
        payer_name: order.payer_name.clone(),
        payer_email: order.payer_email.clone(),
        payer_phone: order.payer_phone.clone(),
        order_id: order.order_id.clone(),
        payment_id: payment_id.to_string(),
        signature: signature.map(str::to_string),
        amount: order.amount,
        currency: order.currency.clone(),
        status: "paid".to_string(),
        din: order.din.clone(),
        source: source.as_str().to_string(),
        created_at: Utc::now(),
    };

    let inserted = store.insert_payment(&record).await?;
    let (payment, already_recorded) = if inserted {
        tracing::info!(
            "Recorded unlock payment {} ({}) for DIN {}",
            payment_id,
            source.as_str(),
            order.din
        );
        (record, false)
    } else {
        // Lost a race with a concurrent verify for the same payment.
        let existing = store.find_payment(payment_id).await?.ok_or_else(|| {
            AppError::InternalError(format!(
                "Payment {} neither inserted nor found",
                payment_id
            ))
        })?;
        (existing, true)
    };

    // The payment row is what grants the unlock. An order left in `created`
    // is picked up and marked verified by the next reconciliation sweep.
    if let Err(e) = store
        .set_order_status(&order.order_id, OrderStatus::Verified, None)
        .await
    {
        tracing::error!(
            "Payment {} recorded but order {} not marked verified: {}",
            payment_id,
            order.order_id,
            e
        );
    }

    Ok(PersistedUnlock {
        payment,
        already_recorded,
    })
}

/// Sends the unlock email in the background. Failures are logged and do not
/// affect the unlock.
pub fn spawn_unlock_notification(
    email: EmailClient,
    payment: UnlockPaymentRecord,
    rows: Vec<CompanyDirectorRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move { send_unlock_email(&email, &payment, &rows).await })
}

/// Like [`spawn_unlock_notification`], but reads the director rows inside
/// the task. For paths where the payment is already recorded when the
/// email is scheduled; a failed read is logged there.
pub fn spawn_unlock_notification_lookup<S>(
    store: S,
    email: EmailClient,
    payment: UnlockPaymentRecord,
) -> JoinHandle<()>
where
    S: UnlockStore + 'static,
{
    tokio::spawn(async move {
        match store.director_rows(&payment.din).await {
            Ok(rows) => send_unlock_email(&email, &payment, &rows).await,
            Err(e) => tracing::error!(
                "Could not load DIN {} for the unlock email of payment {}: {}",
                payment.din,
                payment.payment_id,
                e
            ),
        }
    })
}

async fn send_unlock_email(
    email: &EmailClient,
    payment: &UnlockPaymentRecord,
    rows: &[CompanyDirectorRecord],
) {
    let Some(primary) = rows.first() else {
        tracing::warn!(
            "No director rows for DIN {}; skipping unlock email",
            payment.din
        );
        return;
    };
    let (subject, html) = format_unlock_email(payment, primary, rows);
    match email.send(&payment.payer_email, &subject, &html).await {
        Ok(_) => tracing::info!("Unlock email sent for payment {}", payment.payment_id),
        Err(e) => tracing::error!(
            "Failed to send unlock email for payment {}: {}",
            payment.payment_id,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "buyer@example.com".to_string(),
            name: "Ravi Kumar".to_string(),
            phone: Some("9876543210".to_string()),
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            din: json!("01234567"),
            payer_name: None,
            payer_email: None,
            payer_phone: None,
        }
    }

    #[test]
    fn payer_defaults_to_account() {
        let payer = resolve_payer(&user(), &request()).unwrap();
        assert_eq!(payer.name, "Ravi Kumar");
        assert_eq!(payer.email, "buyer@example.com");
        assert_eq!(payer.phone.as_deref(), Some("+919876543210"));
    }

    #[test]
    fn payer_overrides_are_validated() {
        let mut req = request();
        req.payer_email = Some("not-an-email".to_string());
        assert!(matches!(
            resolve_payer(&user(), &req),
            Err(AppError::BadRequest(_))
        ));

        let mut req = request();
        req.payer_email = Some(" other@example.com ".to_string());
        req.payer_name = Some("Someone Else".to_string());
        let payer = resolve_payer(&user(), &req).unwrap();
        assert_eq!(payer.email, "other@example.com");
        assert_eq!(payer.name, "Someone Else");
    }

    #[test]
    fn receipt_embeds_din_and_time() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let receipt = receipt_for("01234567", now);
        assert_eq!(receipt, "unlock_01234567_1700000000123");
        assert!(receipt.len() <= 40);
    }
}
