//! The value held by the memo and shared tiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of resolving a key against the backing store.
///
/// `Absent` is the "confirmed no record" sentinel. It is distinct from a cache miss,
/// which is modelled as `Option::<CachedValue>::None` by every tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Present(Value),
    Absent,
}

impl CachedValue {
    pub fn from_record_value(value: Option<Value>) -> Self {
        match value {
            Some(value) => Self::Present(value),
            None => Self::Absent,
        }
    }

    /// `true` when a row exists, even one holding `null`.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// The usable value: `None` for the sentinel and for a stored `null`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Present(Value::Null) | Self::Absent => None,
            Self::Present(value) => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stored_null_is_present_without_a_value() {
        let cached = CachedValue::Present(Value::Null);
        assert!(cached.is_present());
        assert!(cached.into_value().is_none());
    }

    #[test]
    fn wire_format_is_tagged() {
        let encoded = serde_json::to_string(&CachedValue::Present(json!("dark"))).expect("encode");
        assert_eq!(encoded, r#"{"state":"present","value":"dark"}"#);

        let absent = serde_json::to_string(&CachedValue::Absent).expect("encode");
        assert_eq!(absent, r#"{"state":"absent"}"#);

        let decoded: CachedValue = serde_json::from_str(&absent).expect("decode");
        assert_eq!(decoded, CachedValue::Absent);
    }
}
