// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number normalisation for send targets and explicit phone lists.

use crate::error::DripcastError;

/// Normalise a user-supplied phone or address into bare international digits.
///
/// A leading `+` is dropped, a leading `0` is replaced with `country_code`,
/// and any `@server`, `:device` or `.session` suffix is cut off.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<String, DripcastError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let end = trimmed.find(['@', ':', '.']).unwrap_or(trimmed.len());
    let user = &trimmed[..end];

    let phone = match user.strip_prefix('0') {
        Some(rest) => format!("{country_code}{rest}"),
        None => user.to_string(),
    };

    if phone.is_empty() || !phone.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DripcastError::Validation(format!(
            "invalid phone number `{raw}`"
        )));
    }
    Ok(phone)
}

/// Normalise a list of phones, dropping duplicates while keeping first-seen order.
pub fn normalize_phone_list(
    raw: &[String],
    country_code: &str,
) -> Result<Vec<String>, DripcastError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let phone = normalize_phone(entry, country_code)?;
        if !out.contains(&phone) {
            out.push(phone);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_plus_and_suffixes() {
        assert_eq!(normalize_phone("+6281111", "62").unwrap(), "6281111");
        assert_eq!(
            normalize_phone("6281111@s.whatsapp.net", "62").unwrap(),
            "6281111"
        );
        assert_eq!(normalize_phone("6281111:12@server", "62").unwrap(), "6281111");
        assert_eq!(normalize_phone(" 6281111.0 ", "62").unwrap(), "6281111");
    }

    #[test]
    fn leading_zero_becomes_country_code() {
        assert_eq!(normalize_phone("081111", "62").unwrap(), "6281111");
        assert_eq!(normalize_phone("081111", "44").unwrap(), "4481111");
    }

    #[test]
    fn rejects_non_digits() {
        assert!(normalize_phone("", "62").is_err());
        assert!(normalize_phone("+", "62").is_err());
        assert!(normalize_phone("62-811", "62").is_err());
        assert!(normalize_phone("abc", "62").is_err());
    }

    #[test]
    fn list_dedupes_after_normalising() {
        let raw = vec![
            "081111".to_string(),
            "+6281111".to_string(),
            "6282222".to_string(),
        ];
        assert_eq!(
            normalize_phone_list(&raw, "62").unwrap(),
            vec!["6281111".to_string(), "6282222".to_string()]
        );
    }

    proptest! {
        #[test]
        fn normalised_phones_are_digits_and_stable(digits in "[1-9][0-9]{5,13}") {
            let once = normalize_phone(&format!("+{digits}"), "62").unwrap();
            prop_assert!(once.bytes().all(|b| b.is_ascii_digit()));
            prop_assert_eq!(normalize_phone(&once, "62").unwrap(), once.clone());
            prop_assert_eq!(once, digits);
        }
    }
}
