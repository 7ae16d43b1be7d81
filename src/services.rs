use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::validation::{escape_like, name_tokens, normalize_din, parse_cin};
use moka::future::Cache;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Maximum rows returned by a name search.
pub const NAME_SEARCH_LIMIT: i64 = 20;

/// Cache of appointment rows keyed by canonical CIN.
pub type CompanyCache = Cache<String, Arc<Vec<CompanyDirectorRecord>>>;

/// Read side of the registry: company and director lookups.
///
/// Director contact fields leave this service masked unless the viewer has a
/// recorded unlock for that DIN.
pub struct RegistryService {
    pool: PgPool,
    company_cache: CompanyCache,
}

impl RegistryService {
    pub fn new(pool: PgPool, company_cache: CompanyCache) -> Self {
        Self {
            pool,
            company_cache,
        }
    }

    /// Company by CIN, matched case-insensitively.
    ///
    /// The first row (oldest) is the canonical company record; every row is
    /// returned as an appointment.
    pub async fn company_by_cin(&self, raw_cin: &str) -> Result<CompanyProfile, AppError> {
        let cin = parse_cin(raw_cin)?;
        let rows = self.company_rows(&cin).await?;

        let company = rows
            .first()
            .map(CompanyDirectorRecord::masked)
            .ok_or_else(|| AppError::NotFound(format!("No company found for CIN {}", cin)))?;

        Ok(CompanyProfile {
            cin,
            company,
            appointments: rows.iter().map(CompanyDirectorRecord::masked).collect(),
        })
    }

    async fn company_rows(&self, cin: &str) -> Result<Arc<Vec<CompanyDirectorRecord>>, AppError> {
        if let Some(cached) = self.company_cache.get(cin).await {
            tracing::debug!("Company cache hit for {}", cin);
            return Ok(cached);
        }

        let rows = sqlx::query_as::<_, CompanyDirectorRecord>(
            "SELECT * FROM company_directors WHERE UPPER(cin) = $1 ORDER BY created_at, id",
        )
        .bind(cin)
        .fetch_all(&self.pool)
        .await
        .context("looking up company by CIN")?;

        let rows = Arc::new(rows);
        if !rows.is_empty() {
            self.company_cache
                .insert(cin.to_string(), rows.clone())
                .await;
        }
        Ok(rows)
    }

    /// Companies whose name contains the query, one entry per CIN.
    ///
    /// Queries shorter than three characters return an empty list without
    /// touching the database.
    pub async fn companies_by_name(&self, raw: &str) -> Result<Vec<CompanySummary>, AppError> {
        let Some(tokens) = name_tokens(raw) else {
            return Ok(Vec::new());
        };
        let pattern = format!("%{}%", escape_like(&tokens.join(" ")));

        let companies = sqlx::query_as::<_, CompanySummary>(
            r#"
            SELECT UPPER(cin) AS cin,
                   MIN(company_name) AS company_name,
                   MIN(company_status) AS company_status,
                   MIN(company_state) AS company_state,
                   COUNT(*) AS appointments
            FROM company_directors
            WHERE company_name ILIKE $1
            GROUP BY UPPER(cin)
            ORDER BY MIN(company_name), UPPER(cin)
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(NAME_SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .context("searching companies by name")?;

        Ok(companies)
    }

    /// Director by DIN. The DIN may arrive padded or not; it is normalized
    /// before the lookup.
    pub async fn director_by_din(
        &self,
        raw_din: &str,
        viewer: Option<Uuid>,
    ) -> Result<DirectorProfile, AppError> {
        let din = normalize_din(raw_din)?;
        let rows = director_rows(&self.pool, &din).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!("No director found for DIN {}", din)));
        }

        let unlocked = match viewer {
            Some(user_id) => has_unlock(&self.pool, user_id, &din).await?,
            None => false,
        };

        Ok(director_profile(din, rows, unlocked))
    }

    /// Directors matching a name query, one entry per DIN.
    ///
    /// One token matches the start of the first name. Several tokens must
    /// each appear in the first or the last name.
    pub async fn directors_by_name(&self, raw: &str) -> Result<Vec<DirectorSummary>, AppError> {
        let Some(tokens) = name_tokens(raw) else {
            return Ok(Vec::new());
        };

        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT din,
                   MIN(director_first_name) AS director_first_name,
                   MIN(director_middle_name) AS director_middle_name,
                   MIN(director_last_name) AS director_last_name,
                   COUNT(DISTINCT UPPER(cin)) AS companies
            FROM company_directors
            WHERE din IS NOT NULL
            "#,
        );

        if let [single] = tokens.as_slice() {
            qb.push(" AND director_first_name ILIKE ")
                .push_bind(format!("{}%", escape_like(single)));
        } else {
            for token in &tokens {
                let pattern = format!("%{}%", escape_like(token));
                qb.push(" AND (director_first_name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR director_last_name ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        qb.push(" GROUP BY din ORDER BY MIN(director_first_name), din LIMIT ")
            .push_bind(NAME_SEARCH_LIMIT);

        let directors = qb
            .build_query_as::<DirectorSummary>()
            .fetch_all(&self.pool)
            .await
            .context("searching directors by name")?;

        Ok(directors)
    }

    /// Drops a company from the cache after an admin write.
    pub async fn invalidate_company(&self, cin: &str) {
        self.company_cache.invalidate(&cin.to_ascii_uppercase()).await;
    }

    pub fn invalidate_all(&self) {
        self.company_cache.invalidate_all();
    }
}

/// Every appointment row for a canonical DIN, oldest first.
pub async fn director_rows(pool: &PgPool, din: &str) -> Result<Vec<CompanyDirectorRecord>, AppError> {
    sqlx::query_as::<_, CompanyDirectorRecord>(
        "SELECT * FROM company_directors WHERE din = $1 ORDER BY created_at, id",
    )
    .bind(din)
    .fetch_all(pool)
    .await
    .context("looking up director by DIN")
}

/// Whether the user has a recorded unlock for the DIN.
pub async fn has_unlock(pool: &PgPool, user_id: Uuid, din: &str) -> Result<bool, AppError> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM unlock_payments WHERE user_id = $1 AND din = $2)",
    )
    .bind(user_id)
    .bind(din)
    .fetch_one(pool)
    .await
    .context("checking unlock status")
}

/// Builds a director profile, masking contacts unless `unlocked`.
///
/// The first row is the primary record.
pub fn director_profile(
    din: String,
    rows: Vec<CompanyDirectorRecord>,
    unlocked: bool,
) -> DirectorProfile {
    let appointments: Vec<CompanyDirectorRecord> = if unlocked {
        rows
    } else {
        rows.iter().map(CompanyDirectorRecord::masked).collect()
    };

    let primary = appointments
        .first()
        .cloned()
        .unwrap_or_else(|| empty_record(&din));

    DirectorProfile {
        din,
        contacts_unlocked: unlocked,
        primary,
        appointments,
    }
}

fn empty_record(din: &str) -> CompanyDirectorRecord {
    CompanyDirectorRecord {
        id: Uuid::nil(),
        cin: String::new(),
        company_name: None,
        company_type: None,
        company_category: None,
        company_sub_category: None,
        company_class: None,
        company_status: None,
        company_origin: None,
        roc: None,
        date_of_incorporation: None,
        authorized_capital: None,
        paid_up_capital: None,
        registered_address: None,
        company_state: None,
        company_pincode: None,
        company_email: None,
        din: Some(din.to_string()),
        director_first_name: None,
        director_middle_name: None,
        director_last_name: None,
        director_email: None,
        director_mobile: None,
        designation: None,
        appointment_date: None,
        permanent_address: None,
        permanent_city: None,
        permanent_state: None,
        permanent_pincode: None,
        present_address: None,
        present_city: None,
        present_state: None,
        present_pincode: None,
        source_file: None,
        created_at: chrono::Utc::now(),
        updated_at: None,
    }
}
