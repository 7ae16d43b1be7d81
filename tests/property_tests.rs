/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use cin_lookup_api::masking::{mask_email, mask_phone};
use cin_lookup_api::signature::{
    hmac_sha256_hex, payment_signature, verify_payment_signature, verify_webhook_signature,
};
use cin_lookup_api::validation::{
    canonical_cin, name_tokens, normalize_din, normalize_din_value, validate_in_phone,
};
use proptest::prelude::*;
use serde_json::json;

// Property: a signature verifies, and any single-character change breaks it
proptest! {
    #[test]
    fn signature_single_char_mutation_fails(
        order_id in "order_[A-Za-z0-9]{14}",
        payment_id in "pay_[A-Za-z0-9]{14}",
        secret in "[A-Za-z0-9]{8,32}",
        index in 0usize..64,
        replacement in "[0-9a-f]"
    ) {
        let signature = payment_signature(&secret, &order_id, &payment_id);
        prop_assert_eq!(signature.len(), 64);
        prop_assert!(verify_payment_signature(&secret, &order_id, &payment_id, &signature));

        let replacement = replacement.chars().next().unwrap();
        let original = signature.as_bytes()[index] as char;
        prop_assume!(original != replacement);

        let mut mutated: Vec<char> = signature.chars().collect();
        mutated[index] = replacement;
        let mutated: String = mutated.into_iter().collect();
        prop_assert!(!verify_payment_signature(&secret, &order_id, &payment_id, &mutated));
    }

    #[test]
    fn order_id_single_char_mutation_fails(
        order_id in "order_[A-Za-z0-9]{14}",
        payment_id in "pay_[A-Za-z0-9]{14}",
        index in 6usize..20,
        replacement in "[A-Za-z0-9]"
    ) {
        let signature = payment_signature("secret", &order_id, &payment_id);
        let replacement = replacement.chars().next().unwrap();
        prop_assume!(order_id.as_bytes()[index] as char != replacement);

        let mut mutated: Vec<char> = order_id.chars().collect();
        mutated[index] = replacement;
        let mutated: String = mutated.into_iter().collect();
        prop_assert!(!verify_payment_signature("secret", &mutated, &payment_id, &signature));
    }

    #[test]
    fn signature_bound_to_order_and_payment(
        order_id in "order_[A-Za-z0-9]{6}",
        payment_id in "pay_[A-Za-z0-9]{6}",
        other in "pay_[A-Za-z0-9]{6}"
    ) {
        prop_assume!(payment_id != other);
        let signature = payment_signature("secret", &order_id, &payment_id);
        prop_assert!(!verify_payment_signature("secret", &order_id, &other, &signature));
    }

    #[test]
    fn webhook_signature_covers_whole_body(
        body in proptest::collection::vec(any::<u8>(), 1..256),
        flip in any::<usize>()
    ) {
        let signature = hmac_sha256_hex("whsec", &body);
        prop_assert!(verify_webhook_signature("whsec", &body, &signature));

        let mut tampered = body.clone();
        let i = flip % tampered.len();
        tampered[i] ^= 0x01;
        prop_assert!(!verify_webhook_signature("whsec", &tampered, &signature));
    }
}

// Property: masking never panics and never leaks the full value
proptest! {
    #[test]
    fn mask_email_never_panics(email in "\\PC*") {
        let _ = mask_email(&email);
    }

    #[test]
    fn mask_phone_never_panics(phone in "\\PC*") {
        let _ = mask_phone(&phone);
    }

    #[test]
    fn masked_email_hides_local_part(
        local in "[a-z]{3,20}",
        domain in "[a-z]{2,10}\\.(com|in|org)"
    ) {
        let email = format!("{}@{}", local, domain);
        let masked = mask_email(&email);
        prop_assert_ne!(&masked, &email);
        let suffix = format!("@{}", domain);
        prop_assert!(masked.ends_with(&suffix));
        prop_assert!(masked.contains('*'));
    }

    #[test]
    fn masked_phone_keeps_length_and_hides_middle(number in "[6-9][0-9]{9}") {
        let masked = mask_phone(&number);
        prop_assert_eq!(masked.chars().count(), number.chars().count());
        prop_assert_eq!(&masked[..2], &number[..2]);
        prop_assert_eq!(&masked[8..], &number[8..]);
        prop_assert_eq!(&masked[2..8], "******");
    }
}

// Property: DIN normalization agrees for strings and numbers
proptest! {
    #[test]
    fn din_number_and_string_agree(value in 1u32..=99_999_999u32) {
        let from_number = normalize_din_value(&json!(value)).unwrap();
        let from_string = normalize_din_value(&json!(value.to_string())).unwrap();
        let from_padded = normalize_din(&format!("{:08}", value)).unwrap();

        prop_assert_eq!(&from_number, &from_string);
        prop_assert_eq!(&from_number, &from_padded);
        prop_assert_eq!(from_number.len(), 8);
    }

    #[test]
    fn din_normalization_never_panics(raw in "\\PC*") {
        let _ = normalize_din(&raw);
    }

    #[test]
    fn cin_canonicalization_is_case_insensitive(
        kind in "[LU]",
        industry in "[0-9]{5}",
        state in "[A-Z]{2}",
        year in "[0-9]{4}",
        class in "[A-Z]{3}",
        serial in "[0-9]{6}"
    ) {
        let cin = format!("{}{}{}{}{}{}", kind, industry, state, year, class, serial);
        prop_assert_eq!(canonical_cin(&cin.to_lowercase()), Some(cin.clone()));
        prop_assert_eq!(canonical_cin(&cin), Some(cin));
    }

    #[test]
    fn short_name_queries_are_rejected(raw in "\\s*[a-z]{0,2}\\s*") {
        prop_assert!(name_tokens(&raw).is_none());
    }
}

// Property: Phone validation should never panic
proptest! {
    #[test]
    fn phone_validation_never_panics(phone in "\\PC*") {
        let _ = validate_in_phone(&phone);
    }

    #[test]
    fn valid_in_mobiles_normalize_to_e164(
        first in 6u8..=9u8,
        rest in 100_000_000u32..=999_999_999u32
    ) {
        let phone = format!("{}{}", first, rest);
        let (valid, normalized) = validate_in_phone(&phone);
        if valid {
            prop_assert!(normalized.starts_with("+91"));
            prop_assert_eq!(normalized.len(), 13);
        }
    }
}
