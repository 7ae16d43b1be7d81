/// Unit tests for input handling
/// Tests CSV imports, admin edits, upload names and masking through the public API
use cin_lookup_api::csv_import::parse_csv;
use cin_lookup_api::db_storage::{PatchValue, RecordPatch};
use cin_lookup_api::errors::AppError;
use cin_lookup_api::masking::{mask_email, mask_phone};
use cin_lookup_api::validation::import_file_name;

#[cfg(test)]
mod csv_import_tests {
    use super::*;

    #[test]
    fn test_registry_export_headers() {
        let csv = "\
Corporate Identification Number,Name of Company,Authorised Capital,Paid-up Capital,Director DIN,First Name,Middle Name,Last Name,Designation,Date of Appointment
U72900KA2019PTC123456,Bangalore Analytics Private Limited,\"10,00,000\",\"1,00,000.00\",9876543.0,Kiran,,Shetty,Managing Director,2019-06-01
";
        let parsed = parse_csv(csv.as_bytes(), "ka-2019.csv").unwrap();
        assert_eq!(parsed.rows_parsed, 1);
        assert_eq!(parsed.rows_invalid, 0);

        let record = &parsed.records[0];
        assert_eq!(record.cin, "U72900KA2019PTC123456");
        assert_eq!(
            record.company_name.as_deref(),
            Some("Bangalore Analytics Private Limited")
        );
        assert_eq!(record.din.as_deref(), Some("09876543"));
        assert_eq!(record.director_middle_name, None);
        assert_eq!(record.designation.as_deref(), Some("Managing Director"));
        assert_eq!(record.appointment_date.as_deref(), Some("2019-06-01"));
        assert_eq!(
            record.authorized_capital.as_ref().map(|v| v.to_string()),
            Some("1000000".to_string())
        );
        assert!(record.paid_up_capital.is_some());
    }

    #[test]
    fn test_rows_without_cin_counted_invalid() {
        let csv = "cin,company_name\n,Missing Ltd\nU72900KA2019PTC123456,Present Ltd\n";
        let parsed = parse_csv(csv.as_bytes(), "x.csv").unwrap();
        assert_eq!(parsed.rows_parsed, 2);
        assert_eq!(parsed.rows_invalid, 1);
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.errors[0].starts_with("row 1"));
    }

    #[test]
    fn test_every_record_tagged_with_source_file() {
        let csv = "cin,din\nU72900KA2019PTC123456,1\nL72900KA2019PLC123456,2\n";
        let parsed = parse_csv(csv.as_bytes(), "batch-07.csv").unwrap();
        assert!(parsed
            .records
            .iter()
            .all(|r| r.source_file.as_deref() == Some("batch-07.csv")));
        assert_eq!(parsed.records[0].din.as_deref(), Some("00000001"));
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(matches!(
            parse_csv(b"", "empty.csv"),
            Err(AppError::BadRequest(_))
        ));
    }
}

#[cfg(test)]
mod record_patch_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whitelisted_fields_accepted() {
        let patch = RecordPatch::from_json(json!({
            "company_status": "Strike Off",
            "director_mobile": "9876543210"
        }))
        .unwrap();
        let assignments = patch.assignments();
        assert_eq!(assignments.len(), 2);
        assert!(assignments.contains(&(
            "company_status",
            PatchValue::Text(Some("Strike Off".to_string()))
        )));
    }

    #[test]
    fn test_canonical_identifiers_rejected() {
        for body in [
            json!({ "cin": "U72900KA2019PTC654321" }),
            json!({ "din": "01234567", "company_status": "Active" }),
            json!({ "created_at": "2024-01-01T00:00:00Z" }),
        ] {
            match RecordPatch::from_json(body) {
                Err(AppError::BadRequest(msg)) => {
                    assert!(msg.contains("canonical identifier cannot be changed"))
                }
                other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_non_numeric_capital_rejected() {
        assert!(RecordPatch::from_json(json!({ "paid_up_capital": "lots" })).is_err());
    }
}

#[cfg(test)]
mod upload_name_tests {
    use super::*;

    #[test]
    fn test_path_components_stripped() {
        assert_eq!(import_file_name("../../etc/batch.csv").unwrap(), "batch.csv");
        assert_eq!(
            import_file_name("C:\\exports\\mca-2024.CSV").unwrap(),
            "mca-2024.CSV"
        );
    }

    #[test]
    fn test_non_csv_rejected() {
        assert!(import_file_name("registry.xlsx").is_err());
        assert!(import_file_name("").is_err());
        assert!(import_file_name(".csv").is_err());
    }
}

#[cfg(test)]
mod masking_tests {
    use super::*;

    #[test]
    fn test_email_masking() {
        assert_eq!(mask_email("asha.verma@example.com"), "as********@example.com");
        assert_eq!(mask_email("ab@example.com"), "a*@example.com");
    }

    #[test]
    fn test_phone_masking() {
        assert_eq!(mask_phone("9876543210"), "98******10");
        assert_eq!(mask_phone("12345"), "*****");
    }
}
