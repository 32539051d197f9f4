use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone pattern"));

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// Collects field-level messages so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.errors.push(message.into());
        }
        self
    }

    pub fn non_blank(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), format!("{} is required", field))
    }

    pub fn phone(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            return self.non_blank(field, value);
        }
        self.check(
            is_valid_phone(value),
            format!("{} is not a valid phone number!", value),
        )
    }

    pub fn finish(&mut self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationDetails(
                "Validation Error".to_string(),
                std::mem::take(&mut self.errors),
            ))
        }
    }
}
