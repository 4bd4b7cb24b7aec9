//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use super::error::DomainError;

/// Width of the unique `key` column.
pub const MAX_KEY_CHARS: usize = 191;
/// Width of the `description` column.
pub const MAX_DESCRIPTION_CHARS: usize = 255;

/// One row of a settings table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingRecord {
    pub key: String,
    pub value: Value,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Input for an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSetting {
    pub key: String,
    pub value: Value,
    pub description: Option<String>,
}

impl NewSetting {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = description.map(Into::into);
        self
    }

    /// Checks the column constraints every backing store enforces.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_key(&self.key)?;
        let description_chars = self
            .description
            .as_deref()
            .map_or(0, |description| description.chars().count());
        if description_chars > MAX_DESCRIPTION_CHARS {
            return Err(DomainError::validation(format!(
                "description for `{}` exceeds {MAX_DESCRIPTION_CHARS} characters",
                self.key
            )));
        }
        if contains_nul(&self.value) {
            return Err(DomainError::validation(format!(
                "value for `{}` contains a NUL character",
                self.key
            )));
        }
        Ok(())
    }
}

pub fn validate_key(key: &str) -> Result<(), DomainError> {
    if key.is_empty() {
        return Err(DomainError::validation("setting key must not be empty"));
    }
    if key.chars().count() > MAX_KEY_CHARS {
        return Err(DomainError::validation(format!(
            "setting key exceeds {MAX_KEY_CHARS} characters"
        )));
    }
    Ok(())
}

// jsonb rejects \u0000 anywhere in a document, object keys included.
fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(text) => text.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(name, item)| name.contains('\0') || contains_nul(item)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_limits_follow_column_width() {
        assert!(validate_key("app.name").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_CHARS)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_CHARS + 1)).is_err());
    }

    #[test]
    fn nul_is_rejected_at_any_depth() {
        let nested = NewSetting::new("a", json!({"list": ["ok", "bad\u{0}"]}));
        assert!(nested.validate().is_err());

        let in_object_key = NewSetting::new("a", json!({"bad\u{0}": 1}));
        assert!(in_object_key.validate().is_err());

        let clean = NewSetting::new("a", json!({"list": ["ok"], "n": 3}));
        assert!(clean.validate().is_ok());
    }

    #[test]
    fn long_description_is_rejected() {
        let entry = NewSetting::new("a", json!(1)).with_description(Some("d".repeat(256)));
        assert!(entry.validate().is_err());
    }
}
