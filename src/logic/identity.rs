use itertools::Itertools;

use crate::error::EngineError;
use crate::model::EntityId;

/// Converts raw request identifiers into an entity's identifier type.
pub struct IdentityResolver;

impl IdentityResolver {
    /// Blank input and anything starting with `-` mean "no identifier"
    /// (the create path); everything else must parse as `I`.
    pub fn resolve<I: EntityId>(raw: Option<&str>) -> Result<Option<I>, EngineError> {
        let Some(raw) = raw.map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() || raw.starts_with('-') {
            return Ok(None);
        }
        let id = I::parse_id(raw)?;
        if id.is_unset() {
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Split comma-joined and repeated values, drop blanks and duplicates,
    /// keep first-seen order.
    pub fn split_ids<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        raw.into_iter()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .unique()
            .map(str::to_string)
            .collect()
    }

    /// `split_ids` followed by typed parsing of every token.
    pub fn parse_ids<'a, I: EntityId>(
        raw: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<I>, EngineError> {
        let mut ids: Vec<I> = Vec::new();
        for token in Self::split_ids(raw) {
            let id = I::parse_id(&token)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_negative_inputs_are_absent() {
        for raw in [None, Some(""), Some("   "), Some("-"), Some("-12"), Some("-abc")] {
            assert_eq!(IdentityResolver::resolve::<i64>(raw).unwrap(), None);
            assert_eq!(IdentityResolver::resolve::<String>(raw).unwrap(), None);
        }
    }

    #[test]
    fn numeric_ids_resolve_to_equal_values() {
        assert_eq!(IdentityResolver::resolve::<i64>(Some(" 17 ")).unwrap(), Some(17));
        assert_eq!(
            IdentityResolver::resolve::<String>(Some("D10")).unwrap(),
            Some("D10".to_string())
        );
    }

    #[test]
    fn malformed_numeric_id_always_fails_the_same_way() {
        for _ in 0..3 {
            let err = IdentityResolver::resolve::<i64>(Some("x1")).unwrap_err();
            assert!(matches!(err, EngineError::InvalidIdentifier { ref raw, .. } if raw == "x1"));
        }
    }

    #[test]
    fn id_lists_are_split_deduplicated_and_ordered() {
        let ids = IdentityResolver::split_ids(vec!["b, a,,b", " c ", "a"]);
        assert_eq!(ids, vec!["b", "a", "c"]);

        let parsed = IdentityResolver::parse_ids::<i64>(vec!["3,1", "03"]).unwrap();
        assert_eq!(parsed, vec![3, 1]);
    }
}
