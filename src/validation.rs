use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_NAME_LENGTH: usize = 255;

/// Field-level validation messages, keyed by request field name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// The first message, used as the summary line of a 422 response.
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flatten().next().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn require(&mut self, field: &str, value: Option<&str>) -> bool {
        match value {
            Some(v) if !v.trim().is_empty() => true,
            _ => {
                self.add(field, format!("The {} field is required.", humanize(field)));
                false
            }
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) {
        if self.require(field, value) && !is_valid_email(value.unwrap_or_default()) {
            self.add(
                field,
                format!("The {} field must be a valid email address.", humanize(field)),
            );
        }
    }

    /// Minimum length plus a matching `<field>_confirmation` value.
    pub fn confirmed_password(
        &mut self,
        field: &str,
        value: Option<&str>,
        confirmation: Option<&str>,
    ) {
        if !self.require(field, value) {
            return;
        }
        let value = value.unwrap_or_default();
        if value.chars().count() < MIN_PASSWORD_LENGTH {
            self.add(
                field,
                format!(
                    "The {} field must be at least {} characters.",
                    humanize(field),
                    MIN_PASSWORD_LENGTH
                ),
            );
        }
        if confirmation != Some(value) {
            self.add(
                field,
                format!("The {} field confirmation does not match.", humanize(field)),
            );
        }
    }

    pub fn max_length(&mut self, field: &str, value: Option<&str>, max: usize) {
        if value.is_some_and(|v| v.chars().count() > max) {
            self.add(
                field,
                format!(
                    "The {} field must not be greater than {} characters.",
                    humanize(field),
                    max
                ),
            );
        }
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

fn humanize(field: &str) -> String {
    field.replace('_', " ")
}
