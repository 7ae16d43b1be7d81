//! Recovers unlocks whose payment succeeded at the gateway but never reached
//! `/unlock/verify` or the webhook, and expires orders that were never paid.

use crate::email_client::EmailClient;
use crate::errors::AppError;
use crate::gateway_client::RazorpayClient;
use crate::models::{OrderStatus, PaymentSource, UnlockOrder};
use crate::unlock::{persist_unlock, spawn_unlock_notification, UnlockStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;

/// Orders younger than this may still be mid-checkout and are left alone.
pub const PENDING_GRACE_MINUTES: i64 = 10;
/// Unpaid orders older than this are expired.
pub const ORDER_EXPIRY_HOURS: i64 = 24;
/// Orders fetched per page during a sweep.
pub const PENDING_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub recovered: usize,
    pub expired: usize,
    pub errors: usize,
}

enum Outcome {
    Recovered,
    Expired,
    Pending,
}

/// One sweep over orders still in `created`.
///
/// A failure on one order is logged and counted; the sweep carries on.
pub async fn reconcile_pending_orders<S: UnlockStore>(
    store: &S,
    gateway: &RazorpayClient,
    email: Option<&EmailClient>,
    now: DateTime<Utc>,
) -> Result<ReconcileReport, AppError> {
    reconcile_in_pages(store, gateway, email, now, PENDING_PAGE_SIZE).await
}

/// [`reconcile_pending_orders`] with an explicit page size. Every pending
/// order is visited once per sweep, however many are still waiting.
pub async fn reconcile_in_pages<S: UnlockStore>(
    store: &S,
    gateway: &RazorpayClient,
    email: Option<&EmailClient>,
    now: DateTime<Utc>,
    page_size: i64,
) -> Result<ReconcileReport, AppError> {
    let cutoff = now - ChronoDuration::minutes(PENDING_GRACE_MINUTES);
    let page_size = page_size.max(1);
    let mut report = ReconcileReport::default();
    let mut after: Option<UnlockOrder> = None;

    loop {
        let page = store.pending_orders(cutoff, after.as_ref(), page_size).await?;
        report.checked += page.len();

        for order in &page {
            match reconcile_order(store, gateway, email, order, now).await {
                Ok(Outcome::Recovered) => report.recovered += 1,
                Ok(Outcome::Expired) => report.expired += 1,
                Ok(Outcome::Pending) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::error!("Failed to reconcile order {}: {}", order.order_id, e);
                }
            }
        }

        let last_page = (page.len() as i64) < page_size;
        after = page.into_iter().last();
        if last_page || after.is_none() {
            break;
        }
    }

    if report.checked > 0 {
        tracing::info!(
            "Reconciliation: {} checked, {} recovered, {} expired, {} errors",
            report.checked,
            report.recovered,
            report.expired,
            report.errors
        );
    }

    Ok(report)
}

async fn reconcile_order<S: UnlockStore>(
    store: &S,
    gateway: &RazorpayClient,
    email: Option<&EmailClient>,
    order: &UnlockOrder,
    now: DateTime<Utc>,
) -> Result<Outcome, AppError> {
    let gateway_order = gateway.fetch_order(&order.order_id).await?;

    if gateway_order.is_paid() {
        let payments = gateway.fetch_order_payments(&order.order_id).await?;
        let captured = payments
            .iter()
            .find(|p| p.is_captured() && p.amount == order.amount && p.currency == order.currency)
            .ok_or_else(|| {
                AppError::ExternalApiError(format!(
                    "Order {} is paid but has no matching captured payment",
                    order.order_id
                ))
            })?;

        // Rows for the email are read before the payment is written, so a
        // failed read leaves the order pending for the next sweep.
        let rows = match email {
            Some(_) => store.director_rows(&order.din).await?,
            None => Vec::new(),
        };

        let persisted = persist_unlock(
            store,
            order,
            &captured.id,
            None,
            PaymentSource::Reconciliation,
        )
        .await?;

        if !persisted.already_recorded {
            tracing::info!(
                "Recovered payment {} for order {}",
                captured.id,
                order.order_id
            );
            if let Some(email) = email {
                spawn_unlock_notification(email.clone(), persisted.payment, rows);
            }
        }
        return Ok(Outcome::Recovered);
    }

    if order.created_at < now - ChronoDuration::hours(ORDER_EXPIRY_HOURS) {
        store
            .set_order_status(&order.order_id, OrderStatus::Expired, Some("not paid in time"))
            .await?;
        return Ok(Outcome::Expired);
    }

    Ok(Outcome::Pending)
}

/// Runs [`reconcile_pending_orders`] every `every` until the process exits.
pub fn spawn_reconciliation_task<S>(
    store: S,
    gateway: RazorpayClient,
    email: EmailClient,
    every: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: UnlockStore + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let swept = reconcile_pending_orders(&store, &gateway, Some(&email), Utc::now()).await;
            if let Err(e) = swept {
                tracing::error!("Reconciliation sweep failed: {}", e);
            }
        }
    })
}
