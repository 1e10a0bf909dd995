use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Text,
    Numeric,
}

/// Identifier type an entity is keyed by.
///
/// The engine is generic over the entity, and the entity fixes its identifier
/// through `Entity::Id`, so a controller can never be wired to an identifier
/// type it does not know how to parse.
pub trait EntityId:
    Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: IdKind;

    /// Parse a raw, already trimmed, non-blank request value.
    fn parse_id(raw: &str) -> Result<Self, EngineError>;

    /// Values that count as "no identifier yet".
    fn is_unset(&self) -> bool;

    /// Allocate a fresh identifier. Numeric ids take the store sequence value.
    fn generate(sequence: i64) -> Self;
}

impl EntityId for String {
    const KIND: IdKind = IdKind::Text;

    fn parse_id(raw: &str) -> Result<Self, EngineError> {
        Ok(raw.to_string())
    }

    fn is_unset(&self) -> bool {
        self.trim().is_empty()
    }

    fn generate(_sequence: i64) -> Self {
        generate_id()
    }
}

impl EntityId for i64 {
    const KIND: IdKind = IdKind::Numeric;

    fn parse_id(raw: &str) -> Result<Self, EngineError> {
        raw.parse::<i64>()
            .map_err(|e| EngineError::InvalidIdentifier {
                raw: raw.to_string(),
                reason: e.to_string(),
            })
    }

    fn is_unset(&self) -> bool {
        *self <= 0
    }

    fn generate(sequence: i64) -> Self {
        sequence
    }
}

pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_round_trip() {
        for n in [1_i64, 42, 9_007_199_254_740_993] {
            assert_eq!(i64::parse_id(&n.to_string()).unwrap(), n);
        }
    }

    #[test]
    fn malformed_numeric_id_is_invalid_identifier() {
        let err = i64::parse_id("12ab").unwrap_err();
        assert!(matches!(err, EngineError::InvalidIdentifier { .. }));
    }

    #[test]
    fn generated_text_ids_are_distinct() {
        let a = String::generate(0);
        let b = String::generate(0);
        assert_ne!(a, b);
        assert!(!a.is_unset());
    }
}
