use crate::auth::{CurrentUser, MaybeUser};
use crate::config::Config;
use crate::db_storage::PgUnlockStore;
use crate::email_client::{format_report_email, EmailClient};
use crate::errors::AppError;
use crate::gateway_client::RazorpayClient;
use crate::models::*;
use crate::services::{CompanyCache, RegistryService};
use crate::unlock::{self, spawn_unlock_notification};
use crate::validation::{is_valid_email, normalize_din_value, parse_cin};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Payment gateway client.
    pub gateway: RazorpayClient,
    /// Transactional email client.
    pub email: EmailClient,
    /// Appointment rows by canonical CIN.
    pub company_cache: CompanyCache,
}

impl AppState {
    pub fn registry(&self) -> RegistryService {
        RegistryService::new(self.db.clone(), self.company_cache.clone())
    }

    pub fn unlock_store(&self) -> PgUnlockStore {
        PgUnlockStore::new(self.db.clone())
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "cin-lookup-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/companies/:cin
///
/// Company record plus every appointment sharing the CIN. Director contacts
/// are always masked here.
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    Path(cin): Path<String>,
) -> Result<Json<CompanyProfile>, AppError> {
    tracing::info!("GET /companies/{}", cin);
    let profile = state.registry().company_by_cin(&cin).await?;
    Ok(Json(profile))
}

/// GET /api/v1/companies?name=
pub async fn search_companies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NameSearchParams>,
) -> Result<Json<Vec<CompanySummary>>, AppError> {
    let name = params.name.unwrap_or_default();
    let companies = state.registry().companies_by_name(&name).await?;
    tracing::debug!("Company search '{}' matched {}", name, companies.len());
    Ok(Json(companies))
}

/// GET /api/v1/directors/:din
///
/// Contacts are revealed only to a signed-in user holding an unlock for the
/// DIN.
pub async fn get_director(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    Path(din): Path<String>,
) -> Result<Json<DirectorProfile>, AppError> {
    tracing::info!("GET /directors/{}", din);
    let profile = state
        .registry()
        .director_by_din(&din, viewer.map(|u| u.id))
        .await?;
    Ok(Json(profile))
}

/// GET /api/v1/directors?name=
pub async fn search_directors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NameSearchParams>,
) -> Result<Json<Vec<DirectorSummary>>, AppError> {
    let name = params.name.unwrap_or_default();
    let directors = state.registry().directors_by_name(&name).await?;
    tracing::debug!("Director search '{}' matched {}", name, directors.len());
    Ok(Json(directors))
}

/// POST /api/v1/unlock/orders
pub async fn create_unlock_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let store = state.unlock_store();
    let order = unlock::create_order(&store, &state.gateway, &user, &request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /api/v1/unlock/orders/:order_id/dismiss
pub async fn dismiss_unlock_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.unlock_store();
    let order = unlock::dismiss_order(&store, &user, &order_id).await?;
    Ok(Json(json!({
        "order_id": order.order_id,
        "status": order.status,
    })))
}

/// POST /api/v1/unlock/verify
///
/// The unlock email goes out only the first time a payment is recorded.
pub async fn verify_unlock_payment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let store = state.unlock_store();
    let verified = unlock::verify_and_persist(&store, &state.gateway, &user, &request).await?;

    if !verified.already_recorded {
        spawn_unlock_notification(
            state.email.clone(),
            verified.payment.clone(),
            verified.director.appointments.clone(),
        );
    }

    Ok(Json(VerifyPaymentResponse {
        success: true,
        already_recorded: verified.already_recorded,
        payment: verified.payment,
        director: verified.director,
    }))
}

/// GET /api/v1/unlocks
pub async fn list_unlocks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<UnlockPaymentRecord>>, AppError> {
    let payments = state.unlock_store().payments_for_user(user.id).await?;
    Ok(Json(payments))
}

/// POST /api/v1/reports
///
/// Accepts a "this data is wrong" report and forwards it to the admin inbox
/// in the background.
pub async fn report_data_change(
    State(state): State<Arc<AppState>>,
    MaybeUser(reporter): MaybeUser,
    Json(mut report): Json<DataChangeReport>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let cin = parse_cin(&report.cin)?;
    let din = match report.din.as_ref().filter(|v| !v.is_null()) {
        Some(value) => Some(normalize_din_value(value)?),
        None => None,
    };

    if report.message.trim().is_empty() {
        return Err(AppError::BadRequest("Report message is required".to_string()));
    }

    if report.reporter_email.is_none() {
        report.reporter_email = reporter.map(|u| u.email);
    }
    if let Some(email) = report.reporter_email.as_deref() {
        if !is_valid_email(email.trim()) {
            return Err(AppError::BadRequest(format!("Invalid reporter email '{}'", email)));
        }
    }

    tracing::info!("Data change reported for {} (DIN {:?})", cin, din);

    match state.config.admin_notify_email.clone() {
        Some(to) => {
            let email = state.email.clone();
            tokio::spawn(async move {
                let (subject, html) = format_report_email(&report, &cin, din.as_deref());
                if let Err(e) = email.send(&to, &subject, &html).await {
                    tracing::error!("Failed to forward data change report for {}: {}", cin, e);
                }
            });
        }
        None => tracing::warn!("ADMIN_NOTIFY_EMAIL not set; report for {} not forwarded", cin),
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "received" }))))
}
