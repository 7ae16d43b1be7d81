/// Input validation and canonicalization shared by the search, unlock and
/// admin paths.
///
/// Everything here runs before any database or gateway call, so a malformed
/// identifier is rejected without touching an external service.
use crate::errors::AppError;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const CIN_LEN: usize = 21;
pub const DIN_LEN: usize = 8;
/// Name searches shorter than this return nothing without querying.
pub const MIN_NAME_QUERY_LEN: usize = 3;
const MAX_NAME_TOKENS: usize = 5;

fn cin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[LU][0-9]{5}[A-Z]{2}[0-9]{4}[A-Z]{3}[0-9]{6}$").expect("valid CIN regex")
    })
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("valid email regex")
    })
}

/// Canonical (upper-case) CIN, or `None` when the format is wrong.
pub fn canonical_cin(raw: &str) -> Option<String> {
    let cin = raw.trim().to_ascii_uppercase();
    if cin.len() == CIN_LEN && cin_regex().is_match(&cin) {
        Some(cin)
    } else {
        None
    }
}

/// Like [`canonical_cin`] but with a user-facing validation error.
pub fn parse_cin(raw: &str) -> Result<String, AppError> {
    canonical_cin(raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid CIN '{}': expected {} characters like U12345DL2020PTC123456",
            raw.trim(),
            CIN_LEN
        ))
    })
}

/// Normalizes a DIN to its canonical 8-digit, zero-padded string.
///
/// Spreadsheet exports turn DINs into numbers, which drops leading zeros and
/// sometimes appends `.0`; both are repaired here.
pub fn normalize_din(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > DIN_LEN || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid DIN '{}': expected up to {} digits",
            trimmed, DIN_LEN
        )));
    }

    if digits.chars().all(|c| c == '0') {
        return Err(AppError::BadRequest("DIN cannot be zero".to_string()));
    }

    Ok(format!("{:0>width$}", digits, width = DIN_LEN))
}

/// Normalizes a DIN that arrived as either a JSON string or a JSON number.
pub fn normalize_din_value(value: &Value) -> Result<String, AppError> {
    match value {
        Value::String(s) => normalize_din(s),
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                normalize_din(&v.to_string())
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && *f > 0.0) {
                normalize_din(&format!("{:.0}", f))
            } else {
                Err(AppError::BadRequest(format!("Invalid DIN {}", n)))
            }
        }
        _ => Err(AppError::BadRequest(
            "DIN must be a string or a number".to_string(),
        )),
    }
}

/// Splits a name query into search tokens.
///
/// Returns `None` when the query is too short to search (fewer than
/// [`MIN_NAME_QUERY_LEN`] non-space characters).
pub fn name_tokens(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.chars().filter(|c| !c.is_whitespace()).count() < MIN_NAME_QUERY_LEN {
        return None;
    }
    let tokens: Vec<String> = trimmed
        .split_whitespace()
        .take(MAX_NAME_TOKENS)
        .map(str::to_string)
        .collect();
    Some(tokens)
}

/// Escapes `LIKE` wildcards so user input matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Basic email format check used for payer and account emails.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() < 5 || email.len() > 254 {
        return false;
    }
    email_regex().is_match(email)
}

/// Validate and normalize an Indian phone number to E.164 (`+919876543210`).
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_in_phone(raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::IN), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid IN phone: {} -> {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::debug!("Invalid IN phone number: {}", raw);
                (false, "Invalid Indian phone number".to_string())
            }
        }
        Err(e) => {
            tracing::debug!("Failed to parse IN phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

/// Sanitized import file name; only `.csv` files are accepted.
pub fn import_file_name(raw: &str) -> Result<String, AppError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let sanitized = sanitize_filename::sanitize(base);
    if sanitized.is_empty() || sanitized.starts_with('.') {
        return Err(AppError::BadRequest("Missing file name".to_string()));
    }
    if !sanitized.to_ascii_lowercase().ends_with(".csv") {
        return Err(AppError::BadRequest(format!(
            "Only .csv files can be imported, got '{}'",
            sanitized
        )));
    }
    Ok(sanitized)
}
