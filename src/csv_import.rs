use crate::errors::AppError;
use crate::models::CompanyDirectorRecord;
use crate::validation::{canonical_cin, normalize_din};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

/// Raw CSV row. Every column is optional text; coercion happens in
/// [`CsvRow::into_record`].
///
/// Headers are matched after lower-casing and replacing spaces/dashes with
/// underscores, so `Company Name` and `company-name` both land in
/// `company_name`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CsvRow {
    #[serde(alias = "corporate_identification_number", alias = "company_cin")]
    pub cin: Option<String>,
    #[serde(alias = "name_of_company")]
    pub company_name: Option<String>,
    pub company_type: Option<String>,
    pub company_category: Option<String>,
    #[serde(alias = "company_subcategory")]
    pub company_sub_category: Option<String>,
    pub company_class: Option<String>,
    pub company_status: Option<String>,
    pub company_origin: Option<String>,
    #[serde(alias = "registrar_of_companies")]
    pub roc: Option<String>,
    #[serde(alias = "incorporation_date")]
    pub date_of_incorporation: Option<String>,
    #[serde(alias = "authorised_capital")]
    pub authorized_capital: Option<String>,
    #[serde(alias = "paidup_capital")]
    pub paid_up_capital: Option<String>,
    pub registered_address: Option<String>,
    pub company_state: Option<String>,
    pub company_pincode: Option<String>,
    pub company_email: Option<String>,
    #[serde(alias = "director_din")]
    pub din: Option<String>,
    #[serde(alias = "first_name")]
    pub director_first_name: Option<String>,
    #[serde(alias = "middle_name")]
    pub director_middle_name: Option<String>,
    #[serde(alias = "last_name")]
    pub director_last_name: Option<String>,
    pub director_email: Option<String>,
    #[serde(alias = "director_phone")]
    pub director_mobile: Option<String>,
    pub designation: Option<String>,
    #[serde(alias = "date_of_appointment")]
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

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && v != "-")
}

/// Parses a rupee amount such as `"1,00,000"`, `"₹ 5000.50"` or `"1e5"`.
/// Returns `None` when the value is not numeric.
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('₹')
        .trim_start_matches("Rs.")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

impl CsvRow {
    /// Converts the row into a record tagged with `source_file`.
    ///
    /// Fails when the CIN is missing or malformed. A DIN that cannot be
    /// normalized is dropped and reported as a warning.
    pub fn into_record(
        self,
        source_file: &str,
    ) -> Result<(CompanyDirectorRecord, Option<String>), String> {
        let raw_cin = text(self.cin).ok_or_else(|| "missing CIN".to_string())?;
        let cin = canonical_cin(&raw_cin).ok_or_else(|| format!("invalid CIN '{}'", raw_cin))?;

        let mut warning = None;
        let din = match text(self.din) {
            Some(raw) => match normalize_din(&raw) {
                Ok(din) => Some(din),
                Err(_) => {
                    warning = Some(format!("invalid DIN '{}' dropped", raw));
                    None
                }
            },
            None => None,
        };

        let authorized_capital = text(self.authorized_capital)
            .as_deref()
            .and_then(parse_amount);
        let paid_up_capital = text(self.paid_up_capital)
            .as_deref()
            .and_then(parse_amount);

        let record = CompanyDirectorRecord {
            id: Uuid::new_v4(),
            cin,
            company_name: text(self.company_name),
            company_type: text(self.company_type),
            company_category: text(self.company_category),
            company_sub_category: text(self.company_sub_category),
            company_class: text(self.company_class),
            company_status: text(self.company_status),
            company_origin: text(self.company_origin),
            roc: text(self.roc),
            date_of_incorporation: text(self.date_of_incorporation),
            authorized_capital,
            paid_up_capital,
            registered_address: text(self.registered_address),
            company_state: text(self.company_state),
            company_pincode: text(self.company_pincode),
            company_email: text(self.company_email),
            din,
            director_first_name: text(self.director_first_name),
            director_middle_name: text(self.director_middle_name),
            director_last_name: text(self.director_last_name),
            director_email: text(self.director_email),
            director_mobile: text(self.director_mobile),
            designation: text(self.designation),
            appointment_date: text(self.appointment_date),
            permanent_address: text(self.permanent_address),
            permanent_city: text(self.permanent_city),
            permanent_state: text(self.permanent_state),
            permanent_pincode: text(self.permanent_pincode),
            present_address: text(self.present_address),
            present_city: text(self.present_city),
            present_state: text(self.present_state),
            present_pincode: text(self.present_pincode),
            source_file: Some(source_file.to_string()),
            created_at: Utc::now(),
            updated_at: None,
        };

        Ok((record, warning))
    }
}

/// Rows parsed out of one CSV file.
#[derive(Debug, Default)]
pub struct ParsedCsv {
    pub records: Vec<CompanyDirectorRecord>,
    pub rows_parsed: usize,
    pub rows_invalid: usize,
    /// Per-row problems, prefixed with the 1-based data line number.
    pub errors: Vec<String>,
}

/// Keep the error list bounded for very broken files.
const MAX_REPORTED_ERRORS: usize = 50;

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_ascii_lowercase()
        .replace([' ', '-', '.'], "_")
}

/// Parses a CSV document into records tagged with `source_file`.
///
/// Only an unreadable header row fails the whole file; bad rows are counted
/// and skipped.
pub fn parse_csv(bytes: &[u8], source_file: &str) -> Result<ParsedCsv, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: csv::StringRecord = reader
        .headers()
        .map_err(|e| AppError::BadRequest(format!("Unreadable CSV header: {}", e)))?
        .iter()
        .map(normalize_header)
        .collect();

    if !headers
        .iter()
        .any(|h| matches!(h, "cin" | "corporate_identification_number" | "company_cin"))
    {
        return Err(AppError::BadRequest(
            "CSV header must include a CIN column".to_string(),
        ));
    }

    let mut parsed = ParsedCsv::default();
    for (index, result) in reader.records().enumerate() {
        let line = index + 1;
        parsed.rows_parsed += 1;

        let row: CsvRow = match result.and_then(|record| record.deserialize(Some(&headers))) {
            Ok(row) => row,
            Err(e) => {
                parsed.rows_invalid += 1;
                push_error(&mut parsed.errors, format!("row {}: {}", line, e));
                continue;
            }
        };

        match row.into_record(source_file) {
            Ok((record, warning)) => {
                if let Some(warning) = warning {
                    push_error(&mut parsed.errors, format!("row {}: {}", line, warning));
                }
                parsed.records.push(record);
            }
            Err(reason) => {
                parsed.rows_invalid += 1;
                push_error(&mut parsed.errors, format!("row {}: {}", line, reason));
            }
        }
    }

    tracing::info!(
        "Parsed {}: {} rows, {} valid, {} invalid",
        source_file,
        parsed.rows_parsed,
        parsed.records.len(),
        parsed.rows_invalid
    );

    Ok(parsed)
}

fn push_error(errors: &mut Vec<String>, message: String) {
    if errors.len() < MAX_REPORTED_ERRORS {
        errors.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
CIN,Company Name,Authorized Capital,Paid-up Capital,DIN,First Name,Last Name,Director Email,Director Mobile
u12345dl2020ptc123456,Acme Widgets Private Limited,\"1,00,000\",50000,1234567,Asha,Verma,asha@example.com,9876543210
U12345DL2020PTC123456,Acme Widgets Private Limited,\"1,00,000\",n/a,07654321,Vikram,Rao,,
BAD-CIN,Nowhere Ltd,,,,,,,
";

    #[test]
    fn parses_and_coerces_rows() {
        let parsed = parse_csv(SAMPLE.as_bytes(), "batch-01.csv").unwrap();
        assert_eq!(parsed.rows_parsed, 3);
        assert_eq!(parsed.rows_invalid, 1);
        assert_eq!(parsed.records.len(), 2);

        let first = &parsed.records[0];
        assert_eq!(first.cin, "U12345DL2020PTC123456");
        assert_eq!(first.din.as_deref(), Some("01234567"));
        assert_eq!(first.authorized_capital, Some(BigDecimal::from(100_000)));
        assert_eq!(first.paid_up_capital, Some(BigDecimal::from(50_000)));
        assert_eq!(first.source_file.as_deref(), Some("batch-01.csv"));

        let second = &parsed.records[1];
        assert_eq!(second.paid_up_capital, None);
        assert_eq!(second.director_email, None);

        assert!(parsed.errors[0].contains("invalid CIN"));
    }

    #[test]
    fn missing_cin_column_rejects_file() {
        let err = parse_csv(b"name,din\nAcme,1234567\n", "x.csv").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn bad_din_is_dropped_not_fatal() {
        let csv = "cin,din\nU12345DL2020PTC123456,12AB\n";
        let parsed = parse_csv(csv.as_bytes(), "x.csv").unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].din, None);
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn amounts() {
        assert_eq!(parse_amount("1,00,000"), Some(BigDecimal::from(100_000)));
        assert_eq!(
            parse_amount("₹ 5000.50"),
            Some(BigDecimal::from_str("5000.50").unwrap())
        );
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("\u{feff}Company Name"), "company_name");
        assert_eq!(normalize_header("Paid-up Capital"), "paid_up_capital");
    }
}
