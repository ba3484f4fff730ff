pub mod health;
pub use self::health::health;

pub mod register;
pub use self::register::register;

pub mod verify;
pub use self::verify::verify;

pub mod login;
pub use self::login::login;

pub mod logout;
pub use self::logout::logout;

pub mod recover;
pub use self::recover::recover;

pub mod reset;
pub use self::reset::reset;

pub(crate) mod storage;
pub(crate) mod types;
pub(crate) mod utils;

// common validation for the handlers: explicit predicates evaluated before any
// side effect, returning a field -> message map for the error envelope
use std::collections::BTreeMap;

use self::utils::valid_email;

const MAX_FIELD_LENGTH: usize = 255;

pub(crate) fn validate_register(
    name: &str,
    email_normalized: &str,
    password: &str,
) -> BTreeMap<&'static str, String> {
    let mut errors = BTreeMap::new();

    if name.trim().is_empty() {
        errors.insert("name", "The name field is required.".to_string());
    } else if name.chars().count() > MAX_FIELD_LENGTH {
        errors.insert(
            "name",
            "The name may not be greater than 255 characters.".to_string(),
        );
    }

    if email_normalized.is_empty() {
        errors.insert("email", "The email field is required.".to_string());
    } else if email_normalized.chars().count() > MAX_FIELD_LENGTH {
        errors.insert(
            "email",
            "The email may not be greater than 255 characters.".to_string(),
        );
    } else if !valid_email(email_normalized) {
        errors.insert(
            "email",
            "The email must be a valid email address.".to_string(),
        );
    }

    if password.is_empty() {
        errors.insert("password", "The password field is required.".to_string());
    }

    errors
}

pub(crate) fn validate_login(
    email_normalized: &str,
    password: &str,
) -> BTreeMap<&'static str, String> {
    let mut errors = BTreeMap::new();

    if email_normalized.is_empty() {
        errors.insert("email", "The email field is required.".to_string());
    } else if !valid_email(email_normalized) {
        errors.insert(
            "email",
            "The email must be a valid email address.".to_string(),
        );
    }

    if password.is_empty() {
        errors.insert("password", "The password field is required.".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_register_accepts_good_input() {
        let errors = validate_register("Ana", "ana@x.com", "secret123");
        assert!(errors.is_empty());
    }

    #[test]
    fn validate_register_requires_every_field() {
        let errors = validate_register("", "", "");
        assert_eq!(
            errors.get("name").map(String::as_str),
            Some("The name field is required.")
        );
        assert_eq!(
            errors.get("email").map(String::as_str),
            Some("The email field is required.")
        );
        assert_eq!(
            errors.get("password").map(String::as_str),
            Some("The password field is required.")
        );
    }

    #[test]
    fn validate_register_caps_field_lengths() {
        let long = "a".repeat(256);
        let long_email = format!("{}@example.com", "a".repeat(250));
        let errors = validate_register(&long, &long_email, "secret123");
        assert_eq!(
            errors.get("name").map(String::as_str),
            Some("The name may not be greater than 255 characters.")
        );
        assert_eq!(
            errors.get("email").map(String::as_str),
            Some("The email may not be greater than 255 characters.")
        );
    }

    #[test]
    fn validate_register_caps_count_characters_not_bytes() {
        // 200 two-byte characters: 400 bytes, well within the 255-char cap.
        let name = "ñ".repeat(200);
        assert!(validate_register(&name, "ana@x.com", "secret123").is_empty());

        let name = "ñ".repeat(256);
        let errors = validate_register(&name, "ana@x.com", "secret123");
        assert_eq!(
            errors.get("name").map(String::as_str),
            Some("The name may not be greater than 255 characters.")
        );
    }

    #[test]
    fn validate_register_rejects_malformed_email() {
        let errors = validate_register("Ana", "not-an-email", "secret123");
        assert_eq!(
            errors.get("email").map(String::as_str),
            Some("The email must be a valid email address.")
        );
    }

    #[test]
    fn validate_login_rejects_malformed_email_and_empty_password() {
        let errors = validate_login("not-an-email", "");
        assert_eq!(
            errors.get("email").map(String::as_str),
            Some("The email must be a valid email address.")
        );
        assert_eq!(
            errors.get("password").map(String::as_str),
            Some("The password field is required.")
        );
    }

    #[test]
    fn validate_login_accepts_good_input() {
        assert!(validate_login("ana@x.com", "secret123").is_empty());
    }
}
