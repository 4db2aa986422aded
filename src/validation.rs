use crate::models::NewApplication;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    // Cyrillic and Latin letters, whitespace and hyphens
    static ref NAME_PATTERN: Regex = Regex::new(r"^[а-яёА-ЯЁa-zA-Z\s\-]+$").unwrap();
    static ref PHONE_SEPARATORS: Regex = Regex::new(r"[\s\-\(\)]").unwrap();
    // Single market: +7 or 8 followed by exactly ten digits
    static ref PHONE_PATTERN: Regex = Regex::new(r"^(\+7|8)[0-9]{10}$").unwrap();
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[<>"']"#).unwrap();
}

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 100;
const EMAIL_MAX_CHARS: usize = 120;
const SERVICE_TYPE_MAX_CHARS: usize = 50;

/// Fields exactly as they arrive from the contact form or the JSON API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubmission {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub service_type: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every rule a submission violated, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: &str) {
        self.0.push(FieldError {
            field,
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn by_field(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut grouped: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for error in &self.0 {
            grouped
                .entry(error.field)
                .or_default()
                .push(error.message.clone());
        }
        grouped
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Strip characters that could open HTML tags or attributes, then trim.
pub fn sanitize_input(text: &str) -> String {
    UNSAFE_CHARS.replace_all(text, "").trim().to_string()
}

/// Remove the separators people type into phone numbers: spaces, hyphens, parentheses.
pub fn normalize_phone(phone: &str) -> String {
    PHONE_SEPARATORS.replace_all(phone.trim(), "").to_string()
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(&normalize_phone(phone))
}

pub fn is_valid_name(name: &str) -> bool {
    let name = name.trim();
    let chars = name.chars().count();
    (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&chars) && NAME_PATTERN.is_match(name)
}

/// Email is optional, so an empty value is valid.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    email.is_empty()
        || (email.chars().count() <= EMAIL_MAX_CHARS && EMAIL_PATTERN.is_match(email))
}

#[derive(Debug, Clone)]
pub struct Validator {
    max_message_length: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Validator {
    pub fn new(max_message_length: usize) -> Self {
        Self { max_message_length }
    }

    /// Check every field and either return a normalized, sanitized record or all
    /// violated rules at once.
    pub fn validate(
        &self,
        raw: &RawSubmission,
        ip_address: &str,
    ) -> Result<NewApplication, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = raw.name.as_deref().unwrap_or("").trim();
        if name.is_empty() {
            errors.push("name", "Имя обязательно для заполнения");
        } else {
            let chars = name.chars().count();
            if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&chars) {
                errors.push("name", "Имя должно содержать от 2 до 100 символов");
            }
            if !NAME_PATTERN.is_match(name) {
                errors.push(
                    "name",
                    "Имя может содержать только буквы, пробелы и дефисы",
                );
            }
        }

        let phone = normalize_phone(raw.phone.as_deref().unwrap_or(""));
        if phone.is_empty() {
            errors.push("phone", "Телефон обязателен для заполнения");
        } else if !PHONE_PATTERN.is_match(&phone) {
            errors.push(
                "phone",
                "Неверный формат номера телефона. Используйте формат: +7XXXXXXXXXX или 8XXXXXXXXXX",
            );
        }

        let email = raw.email.as_deref().unwrap_or("").trim();
        if !is_valid_email(email) {
            errors.push("email", "Неверный формат email");
        }

        let service_type = sanitize_input(raw.service_type.as_deref().unwrap_or(""));
        if service_type.chars().count() > SERVICE_TYPE_MAX_CHARS {
            errors.push("service_type", "Недопустимое значение услуги");
        }

        let message = raw.message.as_deref().unwrap_or("").trim();
        if message.chars().count() > self.max_message_length {
            errors.push(
                "message",
                &format!(
                    "Сообщение не должно превышать {} символов",
                    self.max_message_length
                ),
            );
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewApplication {
            name: sanitize_input(name),
            phone,
            email: non_empty(sanitize_input(email)),
            service_type: non_empty(service_type),
            message: non_empty(sanitize_input(message)),
            ip_address: sanitize_input(ip_address),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(name: &str, phone: &str) -> RawSubmission {
        RawSubmission {
            name: Some(name.to_string()),
            phone: Some(phone.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+79001234567"));
        assert!(is_valid_phone("89001234567"));
        assert!(is_valid_phone("+7 (900) 123-45-67"));
        assert!(is_valid_phone("8 900 123 45 67"));

        assert!(!is_valid_phone("123"));
        assert!(!is_valid_phone("+1234567890"));
        assert!(!is_valid_phone("abc"));
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("+790012345678"));
        assert!(!is_valid_phone("79001234567"));
        assert!(!is_valid_phone("+44 20 7946 0958"));
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("Иван Иванов"));
        assert!(is_valid_name("Jane Doe-Smith"));
        assert!(is_valid_name("Пётр Ёлкин"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("   "));
        assert!(!is_valid_name("Я"));
        assert!(!is_valid_name("Agent 007"));
        assert!(!is_valid_name("Jane!"));
        assert!(!is_valid_name("Doe, Jane"));
        assert!(!is_valid_name(&"a".repeat(101)));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email(""));
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.ru"));

        assert!(!is_valid_email("invalid-email"));
        assert!(!is_valid_email("test@"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_sanitize_input() {
        assert_eq!(
            sanitize_input("  <script>alert('x')</script> "),
            "scriptalert(x)/script"
        );
        assert_eq!(sanitize_input("\"quoted\""), "quoted");
        assert_eq!(sanitize_input(""), "");
    }

    #[test]
    fn test_valid_submission_is_normalized() {
        let raw = RawSubmission {
            name: Some("  Иван Иванов ".to_string()),
            phone: Some("+7 (900) 123-45-67".to_string()),
            email: Some(" ivan@example.com ".to_string()),
            service_type: Some("bankruptcy".to_string()),
            message: Some("Нужна <b>консультация</b>".to_string()),
        };

        let application = Validator::default().validate(&raw, "10.0.0.1").unwrap();
        assert_eq!(application.name, "Иван Иванов");
        assert_eq!(application.phone, "+79001234567");
        assert_eq!(application.email.as_deref(), Some("ivan@example.com"));
        assert_eq!(application.service_type.as_deref(), Some("bankruptcy"));
        assert_eq!(application.message.as_deref(), Some("Нужна bконсультация/b"));
        assert_eq!(application.ip_address, "10.0.0.1");
    }

    #[test]
    fn test_optional_fields_become_none() {
        let mut raw = submission("Jane Doe-Smith", "89001234567");
        raw.email = Some("   ".to_string());
        raw.message = Some(String::new());

        let application = Validator::default().validate(&raw, "127.0.0.1").unwrap();
        assert_eq!(application.email, None);
        assert_eq!(application.service_type, None);
        assert_eq!(application.message, None);
    }

    #[test]
    fn test_all_errors_are_collected() {
        let raw = RawSubmission {
            name: Some("R2-D2".to_string()),
            phone: Some("123".to_string()),
            email: Some("test@".to_string()),
            service_type: None,
            message: Some("x".repeat(1001)),
        };

        let errors = Validator::default().validate(&raw, "127.0.0.1").unwrap_err();
        assert!(errors.has_field("name"));
        assert!(errors.has_field("phone"));
        assert!(errors.has_field("email"));
        assert!(errors.has_field("message"));
        assert_eq!(errors.by_field().len(), 4);
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = Validator::default()
            .validate(&RawSubmission::default(), "127.0.0.1")
            .unwrap_err();

        assert_eq!(errors.errors().len(), 2);
        assert!(errors.has_field("name"));
        assert!(errors.has_field("phone"));
    }

    #[test]
    fn test_message_length_is_configurable() {
        let mut raw = submission("Иван Иванов", "+79001234567");
        raw.message = Some("x".repeat(20));

        assert!(Validator::new(20).validate(&raw, "127.0.0.1").is_ok());
        let errors = Validator::new(10).validate(&raw, "127.0.0.1").unwrap_err();
        assert!(errors.has_field("message"));
    }
}
