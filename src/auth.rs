use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::models::{LoginRequest, RegisterRequest, SessionResponse, User};
use crate::validation::{is_valid_email, validate_in_phone};

pub const SESSION_COOKIE: &str = "session_token";
pub const SESSION_TTL_DAYS: i64 = 7;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, sqlx::FromRow)]
struct DbUserAuth {
    id: Uuid,
    password_hash: String,
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hash checked when the email is unknown, so both login failures cost one
/// argon2 verification.
fn dummy_password_hash() -> Option<&'static str> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| hash_password("no account has this password").ok())
        .as_deref()
}

/// User id when `password` matches the stored credentials.
fn check_credentials(password: &str, credentials: Option<&DbUserAuth>) -> Option<Uuid> {
    match credentials {
        Some(credentials) => {
            verify_password(password, &credentials.password_hash).then_some(credentials.id)
        }
        None => {
            if let Some(hash) = dummy_password_hash() {
                verify_password(password, hash);
            }
            None
        }
    }
}

/// Session token from the `session_token` cookie, or from an
/// `Authorization: Bearer` header for API clients.
pub fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    let jar = CookieJar::from_headers(headers);
    if let Some(token) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
    {
        return Some(token);
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|t| Uuid::parse_str(t.trim()).ok())
}

pub async fn fetch_user_by_session(pool: &PgPool, token: Uuid) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT users.id, users.email, users.name, users.phone, users.is_admin, users.created_at
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.id = $1 AND sessions.expires_at > NOW()
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("validating session")
}

/// Signed-in user. Rejects with 401 when there is no valid session.
pub struct CurrentUser(pub User);

/// Signed-in user if there is one. Anonymous requests pass through.
pub struct MaybeUser(pub Option<User>);

/// Signed-in administrator. 401 without a session, 403 for non-admins.
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };
        Ok(MaybeUser(fetch_user_by_session(&state.db, token).await?))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden(format!(
                "User {} is not an administrator",
                user.id
            )));
        }
        Ok(AdminUser(user))
    }
}

/// Registration fields after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

pub fn validate_registration(request: &RegisterRequest) -> Result<NewAccount, AppError> {
    let email = request.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest(format!("Invalid email '{}'", email)));
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let phone = match request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => {
            let (valid, normalized) = validate_in_phone(raw);
            if !valid {
                return Err(AppError::BadRequest(format!("Invalid phone '{}'", raw)));
            }
            Some(normalized)
        }
        None => None,
    };

    Ok(NewAccount {
        email,
        name: name.to_string(),
        phone,
    })
}

fn session_cookie(token: Uuid, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));
    cookie
}

async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let token = Uuid::new_v4();
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(token)
        .bind(user.id)
        .bind(expires_at)
        .execute(&state.db)
        .await
        .context("creating session")?;

    let jar = jar.add(session_cookie(token, state.config.cookie_secure));
    Ok((
        jar,
        Json(SessionResponse {
            user,
            token,
            expires_at,
        }),
    ))
}

/// Inserts a regular (non-admin) account. 409 when the email is taken.
pub async fn create_account(
    pool: &PgPool,
    account: &NewAccount,
    password_hash: &str,
) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, name, phone, password_hash, is_admin)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        ON CONFLICT (email) DO NOTHING
        RETURNING id, email, name, phone, is_admin, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&account.email)
    .bind(&account.name)
    .bind(&account.phone)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
    .context("creating user")?
    .ok_or_else(|| AppError::Conflict(format!("An account for {} already exists", account.email)))
}

/// Grants admin to an existing account. Only the `create_admin` binary
/// calls this; no HTTP route can.
pub async fn promote_to_admin(pool: &PgPool, email: &str) -> Result<User, AppError> {
    let email = email.trim().to_lowercase();
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET is_admin = TRUE
        WHERE email = $1
        RETURNING id, email, name, phone, is_admin, created_at
        "#,
    )
    .bind(&email)
    .fetch_optional(pool)
    .await
    .context("promoting user to admin")?
    .ok_or_else(|| AppError::NotFound(format!("No account registered for {}", email)))
}

/// POST /api/v1/auth/register
///
/// Always creates a regular account. Administrators are promoted out of band
/// with the `create_admin` binary.
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), AppError> {
    let account = validate_registration(&request)?;

    let password_hash = hash_password(&request.password)
        .map_err(|e| AppError::InternalError(format!("Failed to hash password: {}", e)))?;

    let user = create_account(&state.db, &account, &password_hash).await?;
    tracing::info!("Registered user {}", user.id);

    let (jar, body) = start_session(&state, jar, user).await?;
    Ok((StatusCode::CREATED, jar, body))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let email = request.email.trim().to_lowercase();

    let credentials = sqlx::query_as::<_, DbUserAuth>(
        "SELECT id, password_hash FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .context("fetching user for login")?;

    let Some(user_id) = check_credentials(&request.password, credentials.as_ref()) else {
        if let Some(credentials) = &credentials {
            tracing::warn!("Failed login for user {}", credentials.id);
        }
        return Err(invalid_credentials());
    };

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, name, phone, is_admin, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_one(&state.db)
    .await
    .context("loading user")?;

    start_session(&state, jar, user).await
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    if let Some(token) = session_token(&headers) {
        if let Err(err) = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token)
            .execute(&state.db)
            .await
        {
            tracing::error!(?err, "failed to remove session during logout");
        }
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));

    (jar.remove(removal), Json(json!({ "status": "signed_out" })))
}

/// GET /api/v1/auth/me
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request() -> RegisterRequest {
        RegisterRequest {
            email: " Ravi@Example.com ".to_string(),
            name: " Ravi Kumar ".to_string(),
            phone: Some("98765 43210".to_string()),
            password: "correct horse".to_string(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong-pass", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-hash"));
    }

    #[test]
    fn unknown_email_still_runs_a_verification() {
        let hash = dummy_password_hash().expect("dummy hash");
        assert!(PasswordHash::new(hash).is_ok());
        assert!(!verify_password("correct horse", hash));
        assert_eq!(check_credentials("correct horse", None), None);
    }

    #[test]
    fn credentials_checked_against_stored_hash() {
        let stored = DbUserAuth {
            id: Uuid::new_v4(),
            password_hash: hash_password("correct horse").unwrap(),
        };
        assert_eq!(check_credentials("correct horse", Some(&stored)), Some(stored.id));
        assert_eq!(check_credentials("wrong horse", Some(&stored)), None);
    }

    #[test]
    fn token_read_from_cookie_or_bearer() {
        let token = Uuid::new_v4();

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, token)).unwrap(),
        );
        assert_eq!(session_token(&headers), Some(token));

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(session_token(&headers), Some(token));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn registration_is_normalized() {
        let account = validate_registration(&request()).unwrap();
        assert_eq!(account.email, "ravi@example.com");
        assert_eq!(account.name, "Ravi Kumar");
        assert_eq!(account.phone.as_deref(), Some("+919876543210"));
    }

    #[test]
    fn registration_rejects_bad_input() {
        let mut req = request();
        req.password = "short".to_string();
        assert!(validate_registration(&req).is_err());

        let mut req = request();
        req.email = "ravi-at-example".to_string();
        assert!(validate_registration(&req).is_err());

        let mut req = request();
        req.name = "   ".to_string();
        assert!(validate_registration(&req).is_err());

        let mut req = request();
        req.phone = Some("12345".to_string());
        assert!(validate_registration(&req).is_err());
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(Uuid::nil(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
