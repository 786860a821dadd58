// 🎭 Digit Masks - Keystroke formatting for document numbers, phones and dates
//
// Every mask follows the same recipe:
//   1. strip everything that is not an ASCII digit
//   2. cap the digits at what the mask can hold
//   3. re-insert separators with ordered substitution passes (first match only)
//   4. truncate to the mask's display length
//
// Because step 1 throws away any previous formatting, applying a mask to its
// own output returns the same string.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// PATTERNS
// ============================================================================

static THREE_THEN_ONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{3})(\d)").unwrap());
static CPF_TAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{3})(\d{1,2})$").unwrap());

static CNPJ_ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{2})(\d)").unwrap());
static CNPJ_SECOND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})\.(\d{3})(\d)").unwrap());
static CNPJ_BRANCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(\d{3})(\d)").unwrap());
static FOUR_THEN_ONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})(\d)").unwrap());

static TWO_THEN_ONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2})(\d)").unwrap());
static AREA_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{2})(\d)").unwrap());
static FIVE_THEN_ONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{5})(\d)").unwrap());

// ============================================================================
// LIMITS
// ============================================================================

pub const CPF_DIGITS: usize = 11;
pub const CPF_MASK_LEN: usize = 14;
pub const CNPJ_DIGITS: usize = 14;
pub const CNPJ_MASK_LEN: usize = 18;
pub const PHONE_DIGITS: usize = 11;
pub const PHONE_MASK_LEN: usize = 15;
pub const DATE_DIGITS: usize = 8;
pub const DATE_MASK_LEN: usize = 10;
pub const CEP_DIGITS: usize = 8;
pub const CEP_MASK_LEN: usize = 9;

// ============================================================================
// HELPERS
// ============================================================================

/// Keep only ASCII digits.
///
/// Example: "111.444.777-35" → "11144477735"
pub fn strip_non_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn capped_digits(value: &str, max: usize) -> String {
    strip_non_digits(value).chars().take(max).collect()
}

fn truncate(value: String, max: usize) -> String {
    // Masked output is ASCII, so byte and char lengths agree
    if value.len() > max {
        value[..max].to_string()
    } else {
        value
    }
}

// ============================================================================
// MASKS
// ============================================================================

/// CPF mask: `000.000.000-00`
pub fn cpf_mask(value: &str) -> String {
    let digits = capped_digits(value, CPF_DIGITS);
    let masked = THREE_THEN_ONE.replace(&digits, "${1}.${2}").into_owned();
    let masked = THREE_THEN_ONE.replace(&masked, "${1}.${2}").into_owned();
    let masked = CPF_TAIL.replace(&masked, "${1}-${2}").into_owned();
    truncate(masked, CPF_MASK_LEN)
}

/// CNPJ mask: `00.000.000/0000-00`
pub fn cnpj_mask(value: &str) -> String {
    let digits = capped_digits(value, CNPJ_DIGITS);
    let masked = CNPJ_ROOT.replace(&digits, "${1}.${2}").into_owned();
    let masked = CNPJ_SECOND.replace(&masked, "${1}.${2}.${3}").into_owned();
    let masked = CNPJ_BRANCH.replace(&masked, ".${1}/${2}").into_owned();
    let masked = FOUR_THEN_ONE.replace(&masked, "${1}-${2}").into_owned();
    truncate(masked, CNPJ_MASK_LEN)
}

/// Phone mask: `(00) 0000-0000` for landlines, `(00) 00000-0000` once an
/// eleventh digit is typed.
pub fn phone_mask(value: &str) -> String {
    let digits = capped_digits(value, PHONE_DIGITS);
    let is_cell = digits.len() == PHONE_DIGITS;

    let masked = AREA_CODE.replace(&digits, "(${1}) ${2}").into_owned();
    let masked = if is_cell {
        FIVE_THEN_ONE.replace(&masked, "${1}-${2}").into_owned()
    } else {
        FOUR_THEN_ONE.replace(&masked, "${1}-${2}").into_owned()
    };
    truncate(masked, PHONE_MASK_LEN)
}

/// Date mask: `DD/MM/YYYY`
pub fn date_mask(value: &str) -> String {
    let digits = capped_digits(value, DATE_DIGITS);
    let masked = TWO_THEN_ONE.replace(&digits, "${1}/${2}").into_owned();
    let masked = TWO_THEN_ONE.replace(&masked, "${1}/${2}").into_owned();
    truncate(masked, DATE_MASK_LEN)
}

/// Postal code (CEP) mask: `00000-000`
pub fn cep_mask(value: &str) -> String {
    let digits = capped_digits(value, CEP_DIGITS);
    let masked = FIVE_THEN_ONE.replace(&digits, "${1}-${2}").into_owned();
    truncate(masked, CEP_MASK_LEN)
}

/// Format a stored CPF for display. Values that are not 11 digits are
/// returned stripped but otherwise untouched.
pub fn format_cpf(value: &str) -> String {
    let digits = strip_non_digits(value);
    if digits.len() == CPF_DIGITS {
        cpf_mask(&digits)
    } else {
        digits
    }
}

/// Format a stored CNPJ for display. Same contract as [`format_cpf`].
pub fn format_cnpj(value: &str) -> String {
    let digits = strip_non_digits(value);
    if digits.len() == CNPJ_DIGITS {
        cnpj_mask(&digits)
    } else {
        digits
    }
}

// ============================================================================
// MASK KIND (for callers that pick the mask at runtime)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    Cpf,
    Cnpj,
    Phone,
    Date,
    Cep,
}

impl MaskKind {
    pub fn parse(name: &str) -> Option<MaskKind> {
        match name.to_lowercase().as_str() {
            "cpf" => Some(MaskKind::Cpf),
            "cnpj" => Some(MaskKind::Cnpj),
            "phone" | "telefone" | "celular" => Some(MaskKind::Phone),
            "date" | "data" => Some(MaskKind::Date),
            "cep" => Some(MaskKind::Cep),
            _ => None,
        }
    }

    pub fn apply(&self, value: &str) -> String {
        match self {
            MaskKind::Cpf => cpf_mask(value),
            MaskKind::Cnpj => cnpj_mask(value),
            MaskKind::Phone => phone_mask(value),
            MaskKind::Date => date_mask(value),
            MaskKind::Cep => cep_mask(value),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
