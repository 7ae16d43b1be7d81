use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Gateway signatures are hex-encoded HMAC-SHA256 digests.
///
/// Two payloads are signed:
///
/// - checkout completion: `"{order_id}|{payment_id}"` keyed with the API key secret
/// - webhooks: the raw request body keyed with the webhook secret
///
/// Comparison is exact (lower-case hex) and constant time. A mismatch is final
/// for that attempt.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never fails in practice.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature the gateway attaches to a completed checkout.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(secret, format!("{}|{}", order_id, payment_id).as_bytes())
}

pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let expected = payment_signature(secret, order_id, payment_id);
    constant_time_eq(&expected, signature.trim())
}

pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = hmac_sha256_hex(secret, body);
    constant_time_eq(&expected, signature.trim())
}

fn constant_time_eq(expected: &str, provided: &str) -> bool {
    if expected.is_empty() || expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    #[test]
    fn matches_reference_vector() {
        assert_eq!(
            hmac_sha256_hex("Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn payment_signature_round_trip() {
        let sig = payment_signature("key_secret", "order_123", "pay_456");
        assert!(verify_payment_signature("key_secret", "order_123", "pay_456", &sig));
        assert!(!verify_payment_signature("other_secret", "order_123", "pay_456", &sig));
        assert!(!verify_payment_signature("key_secret", "order_124", "pay_456", &sig));
        assert!(!verify_payment_signature("key_secret", "order_123", "pay_457", &sig));
    }

    #[test]
    fn separator_is_part_of_the_payload() {
        let sig = payment_signature("key_secret", "order_1", "23");
        assert!(!verify_payment_signature("key_secret", "order_12", "3", &sig));
    }

    #[test]
    fn empty_or_truncated_signature_rejected() {
        let sig = payment_signature("key_secret", "order_123", "pay_456");
        assert!(!verify_payment_signature("key_secret", "order_123", "pay_456", ""));
        assert!(!verify_payment_signature(
            "key_secret",
            "order_123",
            "pay_456",
            &sig[..sig.len() - 1]
        ));
    }

    #[test]
    fn upper_case_hex_is_not_accepted() {
        let sig = payment_signature("key_secret", "order_123", "pay_456").to_uppercase();
        assert!(!verify_payment_signature("key_secret", "order_123", "pay_456", &sig));
    }

    #[test]
    fn webhook_signature_covers_body() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = hmac_sha256_hex("whsec", body);
        assert!(verify_webhook_signature("whsec", body, &sig));
        assert!(!verify_webhook_signature("whsec", br#"{"event":"payment.failed"}"#, &sig));
    }
}
