use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// One company/director appointment row.
///
/// The table is denormalized: a CIN repeats once per appointment and a DIN
/// once per company the director sits on.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CompanyDirectorRecord {
    /// Internal identifier used by the admin endpoints.
    pub id: Uuid,
    /// Corporate Identification Number, stored upper-case.
    pub cin: String,
    pub company_name: Option<String>,
    pub company_type: Option<String>,
    pub company_category: Option<String>,
    pub company_sub_category: Option<String>,
    pub company_class: Option<String>,
    pub company_status: Option<String>,
    /// Indian or foreign company.
    pub company_origin: Option<String>,
    /// Registrar of Companies office.
    pub roc: Option<String>,
    pub date_of_incorporation: Option<String>,
    pub authorized_capital: Option<BigDecimal>,
    pub paid_up_capital: Option<BigDecimal>,
    pub registered_address: Option<String>,
    pub company_state: Option<String>,
    pub company_pincode: Option<String>,
    pub company_email: Option<String>,
    /// Director Identification Number, canonical 8-digit form.
    pub din: Option<String>,
    pub director_first_name: Option<String>,
    pub director_middle_name: Option<String>,
    pub director_last_name: Option<String>,
    /// Sensitive: masked unless the caller holds an unlock for this DIN.
    pub director_email: Option<String>,
    /// Sensitive: masked unless the caller holds an unlock for this DIN.
    pub director_mobile: Option<String>,
    pub designation: Option<String>,
    pub appointment_date: Option<String>,
    /// Sensitive: the personal address blocks are withheld until unlocked.
    pub permanent_address: Option<String>,
    pub permanent_city: Option<String>,
    pub permanent_state: Option<String>,
    pub permanent_pincode: Option<String>,
    pub present_address: Option<String>,
    pub present_city: Option<String>,
    pub present_state: Option<String>,
    pub present_pincode: Option<String>,
    /// Name of the import batch this row came from.
    pub source_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CompanyDirectorRecord {
    /// Director name as "first middle last", skipping blanks.
    pub fn director_full_name(&self) -> String {
        [
            self.director_first_name.as_deref(),
            self.director_middle_name.as_deref(),
            self.director_last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Present address on one line, or `None` when every part is blank.
    pub fn present_address_line(&self) -> Option<String> {
        join_address(&[
            &self.present_address,
            &self.present_city,
            &self.present_state,
            &self.present_pincode,
        ])
    }

    pub fn permanent_address_line(&self) -> Option<String> {
        join_address(&[
            &self.permanent_address,
            &self.permanent_city,
            &self.permanent_state,
            &self.permanent_pincode,
        ])
    }

    /// Copy of the record with the director's contact fields masked and the
    /// personal addresses removed.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.permanent_address = None;
        masked.permanent_city = None;
        masked.permanent_state = None;
        masked.permanent_pincode = None;
        masked.present_address = None;
        masked.present_city = None;
        masked.present_state = None;
        masked.present_pincode = None;
        masked.director_email = self
            .director_email
            .as_deref()
            .map(crate::masking::mask_email);
        masked.director_mobile = self
            .director_mobile
            .as_deref()
            .map(crate::masking::mask_phone);
        masked
    }
}

fn join_address(parts: &[&Option<String>]) -> Option<String> {
    let line = parts
        .iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!line.is_empty()).then_some(line)
}

/// Server-side lifecycle of a gateway order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order exists at the gateway; the payer has not finished checkout.
    Created,
    /// Payer closed the widget without paying.
    Dismissed,
    /// Payment verified and unlock persisted.
    Verified,
    /// Signature or amount check failed.
    Failed,
    /// Never paid within the reconciliation window.
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Dismissed => "dismissed",
            OrderStatus::Verified => "verified",
            OrderStatus::Failed => "failed",
            OrderStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(OrderStatus::Created),
            "dismissed" => Some(OrderStatus::Dismissed),
            "verified" => Some(OrderStatus::Verified),
            "failed" => Some(OrderStatus::Failed),
            "expired" => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

/// Where a persisted unlock payment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    /// Client-side checkout followed by `/unlock/verify`.
    Checkout,
    /// Gateway `payment.captured` webhook.
    Webhook,
    /// Found paid by the reconciliation sweep.
    Reconciliation,
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSource::Checkout => "checkout",
            PaymentSource::Webhook => "webhook",
            PaymentSource::Reconciliation => "reconciliation",
        }
    }
}

/// Gateway order created for one user and one DIN.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct UnlockOrder {
    pub order_id: String,
    pub user_id: Uuid,
    pub din: String,
    /// Minor units (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub payer_name: String,
    pub payer_email: String,
    pub payer_phone: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UnlockOrder {
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::parse(&self.status)
    }
}

/// One successful payment unlocking one director for one user.
///
/// At most one row exists per `payment_id`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct UnlockPaymentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payer_name: String,
    pub payer_email: String,
    pub payer_phone: Option<String>,
    pub order_id: String,
    pub payment_id: String,
    /// Absent for payments recorded from a webhook or by reconciliation.
    pub signature: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub din: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A CSV file that has been imported.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ImportBatch {
    pub file_name: String,
    pub rows_parsed: i32,
    pub rows_invalid: i32,
    pub rows_inserted: i32,
    pub rows_duplicate: i32,
    pub imported_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Account as exposed to handlers (no password hash).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

// ============ Search Models ============

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NameSearchParams {
    pub name: Option<String>,
}

/// One company in a name search, grouped by CIN.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CompanySummary {
    pub cin: String,
    pub company_name: Option<String>,
    pub company_status: Option<String>,
    pub company_state: Option<String>,
    pub appointments: i64,
}

/// One director in a name search, grouped by DIN.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DirectorSummary {
    pub din: String,
    pub director_first_name: Option<String>,
    pub director_middle_name: Option<String>,
    pub director_last_name: Option<String>,
    pub companies: i64,
}

/// A company and every appointment row sharing its CIN.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyProfile {
    pub cin: String,
    pub company: CompanyDirectorRecord,
    pub appointments: Vec<CompanyDirectorRecord>,
}

/// A director's primary record plus every appointment sharing the DIN.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorProfile {
    pub din: String,
    /// True when the contact fields below are unmasked.
    pub contacts_unlocked: bool,
    pub primary: CompanyDirectorRecord,
    pub appointments: Vec<CompanyDirectorRecord>,
}

// ============ Unlock Flow Models ============

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub din: serde_json::Value,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    /// Public key id the checkout widget needs.
    pub key_id: String,
    pub din: String,
    /// Masked preview of what will be unlocked.
    pub director: CompanyDirectorRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    /// True when this payment id had already been recorded.
    pub already_recorded: bool,
    pub payment: UnlockPaymentRecord,
    pub director: DirectorProfile,
}

// ============ Admin Models ============

/// Outcome of a CSV import, reported as counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub file_name: String,
    pub rows_parsed: usize,
    pub rows_invalid: usize,
    pub rows_attempted: usize,
    pub rows_inserted: usize,
    pub rows_duplicate: usize,
    pub errors: Vec<String>,
}

// ============ Account Models ============

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: User,
    /// Also set as an HTTP-only cookie; returned for API clients.
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A user's report that registry data is wrong.
#[derive(Debug, Clone, Deserialize)]
pub struct DataChangeReport {
    pub cin: String,
    pub din: Option<serde_json::Value>,
    pub message: String,
    pub reporter_email: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A fully populated appointment row for tests.
    pub fn record(cin: &str, din: &str) -> CompanyDirectorRecord {
        CompanyDirectorRecord {
            id: Uuid::new_v4(),
            cin: cin.to_string(),
            company_name: Some("Acme Widgets Private Limited".to_string()),
            company_type: Some("Private".to_string()),
            company_category: Some("Company limited by Shares".to_string()),
            company_sub_category: Some("Non-govt company".to_string()),
            company_class: Some("Private".to_string()),
            company_status: Some("Active".to_string()),
            company_origin: Some("Indian".to_string()),
            roc: Some("RoC-Delhi".to_string()),
            date_of_incorporation: Some("2020-04-01".to_string()),
            authorized_capital: None,
            paid_up_capital: None,
            registered_address: Some("12 Example Road, New Delhi".to_string()),
            company_state: Some("Delhi".to_string()),
            company_pincode: Some("110001".to_string()),
            company_email: Some("info@acme.example".to_string()),
            din: Some(din.to_string()),
            director_first_name: Some("Asha".to_string()),
            director_middle_name: None,
            director_last_name: Some("Verma".to_string()),
            director_email: Some("asha.verma@example.com".to_string()),
            director_mobile: Some("9876543210".to_string()),
            designation: Some("Director".to_string()),
            appointment_date: Some("2020-04-01".to_string()),
            permanent_address: None,
            permanent_city: None,
            permanent_state: None,
            permanent_pincode: None,
            present_address: None,
            present_city: None,
            present_state: None,
            present_pincode: None,
            source_file: Some("seed.csv".to_string()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_skips_blank_parts() {
        let mut record = fixtures::record("U12345DL2020PTC123456", "01234567");
        record.director_middle_name = Some("  ".to_string());
        assert_eq!(record.director_full_name(), "Asha Verma");
    }

    #[test]
    fn masked_record_hides_contacts_only() {
        let record = fixtures::record("U12345DL2020PTC123456", "01234567");
        let masked = record.masked();
        assert_ne!(masked.director_email, record.director_email);
        assert_ne!(masked.director_mobile, record.director_mobile);
        assert_eq!(masked.company_email, record.company_email);
        assert_eq!(masked.registered_address, record.registered_address);
        assert_eq!(masked.din, record.din);
    }

    #[test]
    fn masked_record_withholds_personal_addresses() {
        let mut record = fixtures::record("U12345DL2020PTC123456", "01234567");
        record.present_address = Some("4 Lodhi Estate".to_string());
        record.present_city = Some("New Delhi".to_string());
        record.present_pincode = Some("110003".to_string());
        record.permanent_address = Some("22 MG Road".to_string());
        record.permanent_state = Some("Karnataka".to_string());

        let masked = record.masked();
        assert_eq!(masked.present_address, None);
        assert_eq!(masked.present_city, None);
        assert_eq!(masked.present_pincode, None);
        assert_eq!(masked.permanent_address, None);
        assert_eq!(masked.permanent_state, None);
        assert_eq!(
            record.present_address_line().as_deref(),
            Some("4 Lodhi Estate, New Delhi, 110003")
        );
        assert_eq!(record.permanent_address_line().as_deref(), Some("22 MG Road, Karnataka"));
        assert_eq!(masked.present_address_line(), None);
    }

    #[test]
    fn order_status_round_trips_through_text() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Dismissed,
            OrderStatus::Verified,
            OrderStatus::Failed,
            OrderStatus::Expired,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("paid"), None);
    }
}
