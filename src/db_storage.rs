use crate::csv_import::ParsedCsv;
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::services::director_rows;
use crate::unlock::UnlockStore;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

// ============ Registry records (admin side) ============

/// Fields that identify a record and can never be edited.
pub const IMMUTABLE_FIELDS: &[&str] = &["id", "cin", "din", "source_file", "created_at", "updated_at"];

/// Whitelisted admin edit. Absent fields are left unchanged; an empty string
/// clears a text field.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPatch {
    pub company_name: Option<String>,
    pub company_type: Option<String>,
    pub company_category: Option<String>,
    pub company_sub_category: Option<String>,
    pub company_class: Option<String>,
    pub company_status: Option<String>,
    pub company_origin: Option<String>,
    pub roc: Option<String>,
    pub date_of_incorporation: Option<String>,
    pub authorized_capital: Option<BigDecimal>,
    pub paid_up_capital: Option<BigDecimal>,
    pub registered_address: Option<String>,
    pub company_state: Option<String>,
    pub company_pincode: Option<String>,
    pub company_email: Option<String>,
    pub director_first_name: Option<String>,
    pub director_middle_name: Option<String>,
    pub director_last_name: Option<String>,
    pub director_email: Option<String>,
    pub director_mobile: Option<String>,
    pub designation: Option<String>,
    pub appointment_date: Option<String>,
    pub permanent_address: Option<String>,
    pub permanent_city: Option<String>,
    pub permanent_state: Option<String>,
    pub permanent_pincode: Option<String>,
    pub present_address: Option<String>,
    pub present_city: Option<String>,
    pub present_state: Option<String>,
    pub present_pincode: Option<String>,
}

/// Value bound for one `SET column = ...` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Text(Option<String>),
    Amount(BigDecimal),
}

impl RecordPatch {
    /// Parses an admin edit body, rejecting identifier changes and unknown
    /// fields.
    pub fn from_json(body: Value) -> Result<Self, AppError> {
        let Value::Object(map) = &body else {
            return Err(AppError::BadRequest("Expected a JSON object".to_string()));
        };

        if let Some(field) = map.keys().find(|k| IMMUTABLE_FIELDS.contains(&k.as_str())) {
            return Err(AppError::BadRequest(format!(
                "Field '{}': canonical identifier cannot be changed",
                field
            )));
        }

        let patch: RecordPatch = serde_json::from_value(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid update: {}", e)))?;

        if let Some(email) = patch.director_email.as_deref().map(str::trim) {
            if !email.is_empty() && !crate::validation::is_valid_email(email) {
                return Err(AppError::BadRequest(format!(
                    "Invalid director email '{}'",
                    email
                )));
            }
        }

        if patch.assignments().is_empty() {
            return Err(AppError::BadRequest("No updatable fields supplied".to_string()));
        }

        Ok(patch)
    }

    /// Column/value pairs to write, in a stable order.
    pub fn assignments(&self) -> Vec<(&'static str, PatchValue)> {
        let texts: [(&'static str, &Option<String>); 28] = [
            ("company_name", &self.company_name),
            ("company_type", &self.company_type),
            ("company_category", &self.company_category),
            ("company_sub_category", &self.company_sub_category),
            ("company_class", &self.company_class),
            ("company_status", &self.company_status),
            ("company_origin", &self.company_origin),
            ("roc", &self.roc),
            ("date_of_incorporation", &self.date_of_incorporation),
            ("registered_address", &self.registered_address),
            ("company_state", &self.company_state),
            ("company_pincode", &self.company_pincode),
            ("company_email", &self.company_email),
            ("director_first_name", &self.director_first_name),
            ("director_middle_name", &self.director_middle_name),
            ("director_last_name", &self.director_last_name),
            ("director_email", &self.director_email),
            ("director_mobile", &self.director_mobile),
            ("designation", &self.designation),
            ("appointment_date", &self.appointment_date),
            ("permanent_address", &self.permanent_address),
            ("permanent_city", &self.permanent_city),
            ("permanent_state", &self.permanent_state),
            ("permanent_pincode", &self.permanent_pincode),
            ("present_address", &self.present_address),
            ("present_city", &self.present_city),
            ("present_state", &self.present_state),
            ("present_pincode", &self.present_pincode),
        ];

        let mut out: Vec<(&'static str, PatchValue)> = texts
            .into_iter()
            .filter_map(|(column, value)| {
                value.as_ref().map(|v| {
                    let trimmed = v.trim();
                    let value = (!trimmed.is_empty()).then(|| trimmed.to_string());
                    (column, PatchValue::Text(value))
                })
            })
            .collect();

        if let Some(amount) = &self.authorized_capital {
            out.push(("authorized_capital", PatchValue::Amount(amount.clone())));
        }
        if let Some(amount) = &self.paid_up_capital {
            out.push(("paid_up_capital", PatchValue::Amount(amount.clone())));
        }
        out
    }
}

/// Admin reads and writes against `company_directors` and `import_batches`.
pub struct RecordStorage {
    pool: PgPool,
}

impl RecordStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<CompanyDirectorRecord, AppError> {
        sqlx::query_as::<_, CompanyDirectorRecord>("SELECT * FROM company_directors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching record")?
            .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: &RecordPatch,
    ) -> Result<CompanyDirectorRecord, AppError> {
        let assignments = patch.assignments();
        if assignments.is_empty() {
            return Err(AppError::BadRequest("No updatable fields supplied".to_string()));
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE company_directors SET ");
        {
            let mut set = qb.separated(", ");
            for (column, value) in assignments {
                set.push(format!("{} = ", column));
                match value {
                    PatchValue::Text(text) => set.push_bind_unseparated(text),
                    PatchValue::Amount(amount) => set.push_bind_unseparated(amount),
                };
            }
            set.push("updated_at = now()");
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let updated = qb
            .build_query_as::<CompanyDirectorRecord>()
            .fetch_optional(&self.pool)
            .await
            .context("updating record")?
            .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))?;

        tracing::info!("Updated record {} ({})", id, updated.cin);
        Ok(updated)
    }

    /// Deletes a record, returning it so callers can invalidate caches.
    pub async fn delete(&self, id: Uuid) -> Result<CompanyDirectorRecord, AppError> {
        let deleted = sqlx::query_as::<_, CompanyDirectorRecord>(
            "DELETE FROM company_directors WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("deleting record")?
        .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))?;

        tracing::info!("Deleted record {} ({})", id, deleted.cin);
        Ok(deleted)
    }

    /// Whether a file with this name has already been imported, either as a
    /// recorded batch or as the provenance of existing rows.
    pub async fn file_already_imported(&self, file_name: &str) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM import_batches WHERE file_name = $1)
                OR EXISTS(SELECT 1 FROM company_directors WHERE source_file = $1)
            "#,
        )
        .bind(file_name)
        .fetch_one(&self.pool)
        .await
        .context("checking import history")
    }

    /// Imports parsed rows under `file_name`.
    ///
    /// The whole file is refused if the name was imported before. Rows are
    /// inserted one by one; a row that conflicts with an existing one is
    /// counted as a duplicate and the import carries on.
    pub async fn import(
        &self,
        file_name: &str,
        parsed: ParsedCsv,
        imported_by: Option<Uuid>,
    ) -> Result<ImportReport, AppError> {
        if self.file_already_imported(file_name).await? {
            return Err(AppError::Conflict(format!(
                "A file named '{}' has already been imported",
                file_name
            )));
        }

        // Claims the name; a concurrent upload of the same file loses here.
        let claimed = sqlx::query(
            r#"
            INSERT INTO import_batches (file_name, rows_parsed, rows_invalid, imported_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (file_name) DO NOTHING
            "#,
        )
        .bind(file_name)
        .bind(parsed.rows_parsed as i32)
        .bind(parsed.rows_invalid as i32)
        .bind(imported_by)
        .execute(&self.pool)
        .await
        .context("recording import batch")?;

        if claimed.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "A file named '{}' has already been imported",
                file_name
            )));
        }

        let mut report = ImportReport {
            file_name: file_name.to_string(),
            rows_parsed: parsed.rows_parsed,
            rows_invalid: parsed.rows_invalid,
            rows_attempted: parsed.records.len(),
            errors: parsed.errors,
            ..ImportReport::default()
        };

        for record in &parsed.records {
            match insert_record(&self.pool, record).await {
                Ok(true) => report.rows_inserted += 1,
                Ok(false) => report.rows_duplicate += 1,
                Err(e) => {
                    tracing::warn!("Failed to insert row for {}: {}", record.cin, e);
                    report.errors.push(format!("{}: insert failed", record.cin));
                }
            }
        }

        sqlx::query(
            "UPDATE import_batches SET rows_inserted = $2, rows_duplicate = $3 WHERE file_name = $1",
        )
        .bind(file_name)
        .bind(report.rows_inserted as i32)
        .bind(report.rows_duplicate as i32)
        .execute(&self.pool)
        .await
        .context("updating import batch counts")?;

        tracing::info!(
            "Imported {}: {} attempted, {} inserted, {} duplicate",
            file_name,
            report.rows_attempted,
            report.rows_inserted,
            report.rows_duplicate
        );

        Ok(report)
    }

    pub async fn recent_imports(&self, limit: i64) -> Result<Vec<ImportBatch>, AppError> {
        sqlx::query_as::<_, ImportBatch>(
            "SELECT * FROM import_batches ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("listing imports")
    }
}

/// Inserts one record. Returns false when it collides with an existing row.
pub async fn insert_record(pool: &PgPool, record: &CompanyDirectorRecord) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO company_directors (
            id, cin, company_name, company_type, company_category, company_sub_category,
            company_class, company_status, company_origin, roc, date_of_incorporation,
            authorized_capital, paid_up_capital, registered_address, company_state,
            company_pincode, company_email, din, director_first_name, director_middle_name,
            director_last_name, director_email, director_mobile, designation, appointment_date,
            permanent_address, permanent_city, permanent_state, permanent_pincode,
            present_address, present_city, present_state, present_pincode,
            source_file, created_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35
        )
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&record.cin)
    .bind(&record.company_name)
    .bind(&record.company_type)
    .bind(&record.company_category)
    .bind(&record.company_sub_category)
    .bind(&record.company_class)
    .bind(&record.company_status)
    .bind(&record.company_origin)
    .bind(&record.roc)
    .bind(&record.date_of_incorporation)
    .bind(&record.authorized_capital)
    .bind(&record.paid_up_capital)
    .bind(&record.registered_address)
    .bind(&record.company_state)
    .bind(&record.company_pincode)
    .bind(&record.company_email)
    .bind(&record.din)
    .bind(&record.director_first_name)
    .bind(&record.director_middle_name)
    .bind(&record.director_last_name)
    .bind(&record.director_email)
    .bind(&record.director_mobile)
    .bind(&record.designation)
    .bind(&record.appointment_date)
    .bind(&record.permanent_address)
    .bind(&record.permanent_city)
    .bind(&record.permanent_state)
    .bind(&record.permanent_pincode)
    .bind(&record.present_address)
    .bind(&record.present_city)
    .bind(&record.present_state)
    .bind(&record.present_pincode)
    .bind(&record.source_file)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

// ============ Unlock orders and payments ============

/// Postgres-backed [`UnlockStore`].
#[derive(Clone)]
pub struct PgUnlockStore {
    pool: PgPool,
}

impl PgUnlockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Unlock history for a user, newest first.
    pub async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<UnlockPaymentRecord>, AppError> {
        sqlx::query_as::<_, UnlockPaymentRecord>(
            "SELECT * FROM unlock_payments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("listing unlock history")
    }
}

impl UnlockStore for PgUnlockStore {
    async fn director_rows(&self, din: &str) -> Result<Vec<CompanyDirectorRecord>, AppError> {
        director_rows(&self.pool, din).await
    }

    async fn insert_order(&self, order: &UnlockOrder) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO unlock_orders (
                order_id, user_id, din, amount, currency, receipt,
                payer_name, payer_email, payer_phone, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(&order.din)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.receipt)
        .bind(&order.payer_name)
        .bind(&order.payer_email)
        .bind(&order.payer_phone)
        .bind(&order.status)
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .context("storing unlock order")?;
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<UnlockOrder>, AppError> {
        sqlx::query_as::<_, UnlockOrder>("SELECT * FROM unlock_orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching unlock order")
    }

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE unlock_orders
            SET status = $2, failure_reason = $3, updated_at = now()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("updating unlock order status")?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                "No unlock order found to mark as {}: {}",
                status.as_str(),
                order_id
            );
        }
        Ok(result.rows_affected() > 0)
    }

    async fn find_payment(&self, payment_id: &str) -> Result<Option<UnlockPaymentRecord>, AppError> {
        sqlx::query_as::<_, UnlockPaymentRecord>(
            "SELECT * FROM unlock_payments WHERE payment_id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching unlock payment")
    }

    async fn insert_payment(&self, record: &UnlockPaymentRecord) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO unlock_payments (
                id, user_id, payer_name, payer_email, payer_phone, order_id, payment_id,
                signature, amount, currency, status, din, source, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.payer_name)
        .bind(&record.payer_email)
        .bind(&record.payer_phone)
        .bind(&record.order_id)
        .bind(&record.payment_id)
        .bind(&record.signature)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.status)
        .bind(&record.din)
        .bind(&record.source)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("storing unlock payment")?;

        Ok(result.rows_affected() == 1)
    }

    async fn pending_orders(
        &self,
        before: DateTime<Utc>,
        after: Option<&UnlockOrder>,
        limit: i64,
    ) -> Result<Vec<UnlockOrder>, AppError> {
        sqlx::query_as::<_, UnlockOrder>(
            r#"
            SELECT * FROM unlock_orders
            WHERE status = 'created' AND created_at < $1
              AND ($2::timestamptz IS NULL OR (created_at, order_id) > ($2, $3))
            ORDER BY created_at, order_id
            LIMIT $4
            "#,
        )
        .bind(before)
        .bind(after.map(|o| o.created_at))
        .bind(after.map(|o| o.order_id.clone()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("listing pending unlock orders")
    }
}
