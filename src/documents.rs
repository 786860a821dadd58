// 🪪 Document Validators - CPF / CNPJ check digits and date-of-birth rules
//
// All validators are total: they answer true/false for any input and never
// panic. Punctuation is stripped before checking, so masked and raw values
// are treated the same.

use crate::masks::{strip_non_digits, CNPJ_DIGITS, CPF_DIGITS};
use chrono::{Datelike, Local, NaiveDate};

// ============================================================================
// CHECK DIGITS
// ============================================================================

pub const CNPJ_FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
pub const CNPJ_SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Parse a stripped identifier into digits, rejecting wrong lengths and
/// repeated-digit sequences such as "00000000000".
fn identifier_digits(raw: &str, expected_len: usize) -> Option<Vec<u32>> {
    let digits: Vec<u32> = strip_non_digits(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != expected_len {
        return None;
    }

    if digits.iter().all(|d| *d == digits[0]) {
        return None;
    }

    Some(digits)
}

/// Modulo-11 check digit where a remainder of 10 or 11 becomes 0.
fn mod11_digit(sum: u32) -> u32 {
    match (sum * 10) % 11 {
        10 | 11 => 0,
        r => r,
    }
}

/// CPF check digit over the first `len` digits, weights `len+1` down to 2.
pub fn cpf_check_digit(digits: &[u32]) -> u32 {
    let top = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();
    mod11_digit(sum)
}

/// CNPJ check digit using one of the fixed weight tables.
pub fn cnpj_check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    mod11_digit(sum)
}

/// Validate a CPF (individual taxpayer number).
///
/// Example: "111.444.777-35" → true, "111.444.777-36" → false
pub fn validate_cpf(raw: &str) -> bool {
    let Some(digits) = identifier_digits(raw, CPF_DIGITS) else {
        return false;
    };

    if cpf_check_digit(&digits[..9]) != digits[9] {
        return false;
    }

    cpf_check_digit(&digits[..10]) == digits[10]
}

/// Validate a CNPJ (entity taxpayer number).
///
/// Example: "11.222.333/0001-81" → true
pub fn validate_cnpj(raw: &str) -> bool {
    let Some(digits) = identifier_digits(raw, CNPJ_DIGITS) else {
        return false;
    };

    if cnpj_check_digit(&digits[..12], &CNPJ_FIRST_WEIGHTS) != digits[12] {
        return false;
    }

    cnpj_check_digit(&digits[..13], &CNPJ_SECOND_WEIGHTS) == digits[13]
}

// ============================================================================
// DATES (DD/MM/YYYY, as typed through the date mask)
// ============================================================================

/// Parse a `DD/MM/YYYY` string. Returns None for anything else, including
/// impossible calendar dates like 31/02/2020.
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    let bytes = date.as_bytes();
    if bytes.len() != 10 || bytes[2] != b'/' || bytes[5] != b'/' {
        return None;
    }

    let all_digits = date
        .char_indices()
        .filter(|(i, _)| *i != 2 && *i != 5)
        .all(|(_, c)| c.is_ascii_digit());
    if !all_digits {
        return None;
    }

    NaiveDate::parse_from_str(date, "%d/%m/%Y").ok()
}

/// A date is valid when it parses and does not lie after `today`.
pub fn validate_date_on(date: &str, today: NaiveDate) -> bool {
    match parse_date(date) {
        Some(d) => d <= today,
        None => false,
    }
}

/// [`validate_date_on`] against the local calendar date.
pub fn validate_date(date: &str) -> bool {
    validate_date_on(date, Local::now().date_naive())
}

/// Age in whole years on `today`, or None if the date does not parse.
pub fn age_on(date_of_birth: &str, today: NaiveDate) -> Option<i32> {
    let birth = parse_date(date_of_birth)?;
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    Some(age)
}

/// True when the person is at least 18 on `today`.
pub fn is_adult_on(date_of_birth: &str, today: NaiveDate) -> bool {
    age_on(date_of_birth, today).is_some_and(|age| age >= 18)
}

pub fn is_adult(date_of_birth: &str) -> bool {
    is_adult_on(date_of_birth, Local::now().date_naive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_cpf_reference_number() {
        assert!(validate_cpf("11144477735"));
        assert!(validate_cpf("111.444.777-35"));
        assert!(!validate_cpf("11144477736"));
        assert!(!validate_cpf("11144477725"));
    }

    #[test]
    fn test_validate_cpf_rejects_repeated_digits() {
        for d in 0..=9 {
            let cpf = d.to_string().repeat(11);
            assert!(!validate_cpf(&cpf), "{} should be rejected", cpf);
        }
    }

    #[test]
    fn test_validate_cpf_rejects_malformed_input() {
        assert!(!validate_cpf(""));
        assert!(!validate_cpf("abc"));
        assert!(!validate_cpf("1114447773"));
        assert!(!validate_cpf("111444777350"));
        assert!(!validate_cpf("１１１４４４７７７３５"));
    }

    #[test]
    fn test_cpf_check_digit_remainder_ten_becomes_zero() {
        // 000000001 → sum = 2, (2*10) % 11 = 9
        assert_eq!(cpf_check_digit(&[0, 0, 0, 0, 0, 0, 0, 0, 1]), 9);
        // 100000000 → sum = 10, (10*10) % 11 = 1
        assert_eq!(cpf_check_digit(&[1, 0, 0, 0, 0, 0, 0, 0, 0]), 1);
        // 000000010 → sum = 3, (3*10) % 11 = 8
        assert_eq!(cpf_check_digit(&[0, 0, 0, 0, 0, 0, 0, 1, 0]), 8);
        // 100000001 → sum = 12, (12*10) % 11 = 10 → 0
        assert_eq!(cpf_check_digit(&[1, 0, 0, 0, 0, 0, 0, 0, 1]), 0);
    }

    #[test]
    fn test_validate_cnpj() {
        assert!(validate_cnpj("11222333000181"));
        assert!(validate_cnpj("11.222.333/0001-81"));
        assert!(!validate_cnpj("11.222.333/0001-82"));
        assert!(!validate_cnpj("11111111111111"));
        assert!(!validate_cnpj("1122233300018"));
        assert!(!validate_cnpj(""));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("15/01/2024"), Some(day(2024, 1, 15)));
        assert_eq!(parse_date("29/02/2024"), Some(day(2024, 2, 29)));
        assert_eq!(parse_date("29/02/2023"), None);
        assert_eq!(parse_date("32/01/2024"), None);
        assert_eq!(parse_date("01/13/2024"), None);
        assert_eq!(parse_date("1/1/2024"), None);
        assert_eq!(parse_date("2024-01-15"), None);
    }

    #[test]
    fn test_validate_date_rejects_future() {
        let today = day(2024, 6, 1);
        assert!(validate_date_on("01/06/2024", today));
        assert!(!validate_date_on("02/06/2024", today));
    }

    #[test]
    fn test_is_adult_boundary() {
        let today = day(2024, 6, 1);
        assert!(is_adult_on("01/06/2006", today));
        assert!(!is_adult_on("02/06/2006", today));
        assert!(!is_adult_on("not a date", today));
        assert_eq!(age_on("15/03/1990", today), Some(34));
    }
}
