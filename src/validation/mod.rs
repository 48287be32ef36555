use sqlx::types::BigDecimal;
use std::fmt;

pub const EMAIL_MAX_LEN: usize = 254;
pub const NAME_MAX_LEN: usize = 120;
pub const ADDRESS_MAX_LEN: usize = 500;
pub const NOTE_MAX_LEN: usize = 1000;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const PHONE_MIN_DIGITS: usize = 9;
pub const PHONE_MAX_DIGITS: usize = 11;
pub const MAX_CART_QUANTITY: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_whitespace() || !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

/// Trims and lowercases, then checks the basic `local@domain.tld` shape.
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    validate_required("email", &email)?;
    validate_max_len("email", &email, EMAIL_MAX_LEN)?;

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("email", "must be a valid email address"));
    };

    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("email", "must be a valid email address"));
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> ValidationResult {
    if password.len() < PASSWORD_MIN_LEN {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {} characters", PASSWORD_MIN_LEN),
        ));
    }
    validate_max_len("password", password, PASSWORD_MAX_LEN)?;

    let has_letter = password.chars().any(|ch| ch.is_alphabetic());
    let has_digit = password.chars().any(|ch| ch.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ValidationError::new(
            "password",
            "must contain at least one letter and one digit",
        ));
    }

    Ok(())
}

/// Vietnamese phone numbers: optional leading `+84`, otherwise a leading 0,
/// 9 to 11 digits in total. Spaces, dots and dashes are ignored.
pub fn normalize_phone(phone: &str) -> Result<String, ValidationError> {
    let compact: String = phone
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '.' | '-'))
        .collect();
    validate_required("phone", &compact)?;

    let national = match compact.strip_prefix("+84") {
        Some(rest) => format!("0{}", rest),
        None => compact,
    };

    let digits_ok = national.chars().all(|ch| ch.is_ascii_digit());
    let len_ok = (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&national.len());
    if !digits_ok || !len_ok || !national.starts_with('0') {
        return Err(ValidationError::new("phone", "must be a valid phone number"));
    }

    Ok(national)
}

pub fn validate_text(field: &'static str, value: &str, max_len: usize) -> Result<String, ValidationError> {
    let value = sanitize_string(value);
    validate_required(field, &value)?;
    validate_max_len(field, &value, max_len)?;
    Ok(value)
}

pub fn validate_non_negative_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount < &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

pub fn validate_positive_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_quantity(quantity: i32) -> ValidationResult {
    if quantity <= 0 {
        return Err(ValidationError::new("quantity", "must be greater than zero"));
    }
    if quantity > MAX_CART_QUANTITY {
        return Err(ValidationError::new(
            "quantity",
            format!("must be at most {}", MAX_CART_QUANTITY),
        ));
    }

    Ok(())
}

pub fn validate_rating(rating: i16) -> ValidationResult {
    if !(1..=5).contains(&rating) {
        return Err(ValidationError::new("rating", "must be between 1 and 5"));
    }

    Ok(())
}

/// Lowercase ASCII slug built from a product name. Vietnamese diacritics are
/// folded to their base letter.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.chars().flat_map(char::to_lowercase) {
        let folded = fold_vietnamese(ch);
        if folded.is_ascii_alphanumeric() {
            slug.push(folded);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn fold_vietnamese(ch: char) -> char {
    match ch {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ' | 'ở'
        | 'ỡ' | 'ợ' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'đ' => 'd',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn validates_enum_values() {
        assert!(validate_enum("method", "COD", &["COD", "VNPAY"]).is_ok());
        assert!(validate_enum("method", "PAYPAL", &["COD", "VNPAY"]).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
        assert_eq!(sanitize_string("Nguyen\nVan A"), "Nguyen Van A");
        assert_eq!(sanitize_string("12 Hang Bong,\r\nHoan Kiem"), "12 Hang Bong, Hoan Kiem");
    }

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  Buyer@Example.COM ").unwrap(), "buyer@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@nodot").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@example..com").is_err());
    }

    #[test]
    fn validates_password_strength() {
        assert!(validate_password("abc12345").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn normalizes_phone_numbers() {
        assert_eq!(normalize_phone("0912 345 678").unwrap(), "0912345678");
        assert_eq!(normalize_phone("+84912345678").unwrap(), "0912345678");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("0912abc678").is_err());
    }

    #[test]
    fn validates_amounts() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);

        assert!(validate_positive_amount("price", &positive).is_ok());
        assert!(validate_positive_amount("price", &zero).is_err());
        assert!(validate_non_negative_amount("price", &zero).is_ok());
        assert!(validate_non_negative_amount("price", &negative).is_err());
    }

    #[test]
    fn validates_quantity_and_rating() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(MAX_CART_QUANTITY + 1).is_err());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn slugifies_vietnamese_names() {
        assert_eq!(slugify("Thịt Bò Úc - Thăn Ngoại"), "thit-bo-uc-than-ngoai");
        assert_eq!(slugify("  Sườn heo  "), "suon-heo");
        assert_eq!(slugify("Đùi gà!!"), "dui-ga");
    }
}
