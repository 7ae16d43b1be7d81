//! Cosmetic masking of director contact details.
//!
//! Masking keeps a few characters so a user can recognise the value they are
//! paying for. It is not encryption: the server decides per request whether
//! the caller gets the masked or the raw value.

pub const MASK_CHAR: char = '*';

/// Masks the local part of an email, keeping at most its first two characters
/// and the whole domain: `asha.verma@example.com` → `as********@example.com`.
pub fn mask_email(email: &str) -> String {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return mask_keeping(email, 1, 0);
    };
    let local_len = local.chars().count();
    let keep = (local_len / 2).min(2);
    format!("{}@{}", mask_keeping(local, keep, 0), domain)
}

/// Masks the digits of a phone number, keeping the first two and last two
/// when there are more than six digits. Separators such as `+`, spaces and
/// dashes are left in place.
pub fn mask_phone(phone: &str) -> String {
    let phone = phone.trim();
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let (head, tail) = if digits > 6 { (2, 2) } else { (0, 0) };

    let mut seen = 0;
    phone
        .chars()
        .map(|c| {
            if !c.is_ascii_digit() {
                return c;
            }
            seen += 1;
            if seen <= head || seen > digits - tail {
                c
            } else {
                MASK_CHAR
            }
        })
        .collect()
}

fn mask_keeping(value: &str, head: usize, tail: usize) -> String {
    let len = value.chars().count();
    value
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i < head || i + tail >= len {
                c
            } else {
                MASK_CHAR
            }
        })
        .collect()
}
