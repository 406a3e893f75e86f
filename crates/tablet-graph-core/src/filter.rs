//! Property predicates and element filters.
//!
//! Filters appear in two places: schema property validators (a single
//! [`Predicate`] per property) and view filter layers (an [`ElementFilter`]
//! conjunction per group). Both are plain data so they can be shipped to
//! server-side iterators inside serialised configuration.

use serde::{Deserialize, Serialize};

use crate::types::{Properties, PropertyValue};

/// A predicate over one optional property value.
///
/// Comparisons between mismatched value types evaluate to `false` rather
/// than erroring; a filter must never abort a scan.
///
/// # Example
/// ```rust
/// use tablet_graph_core::filter::{ElementFilter, Predicate};
/// use tablet_graph_core::types::Properties;
///
/// let filter = ElementFilter::new().select("count", Predicate::IsMoreThan(5i64.into()));
///
/// let mut properties = Properties::new();
/// properties.insert("count".to_string(), 7i64.into());
/// assert!(filter.test(&properties));
///
/// properties.insert("count".to_string(), 3i64.into());
/// assert!(!filter.test(&properties));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    /// The property is present.
    Exists,
    IsEqual(PropertyValue),
    IsMoreThan(PropertyValue),
    IsLessThan(PropertyValue),
    IsIn(Vec<PropertyValue>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn test(&self, value: Option<&PropertyValue>) -> bool {
        match self {
            Predicate::Exists => value.is_some(),
            Predicate::IsEqual(expected) => value == Some(expected),
            Predicate::IsMoreThan(bound) => matches!(
                value.and_then(|v| v.compare(bound)),
                Some(std::cmp::Ordering::Greater)
            ),
            Predicate::IsLessThan(bound) => matches!(
                value.and_then(|v| v.compare(bound)),
                Some(std::cmp::Ordering::Less)
            ),
            Predicate::IsIn(set) => value.is_some_and(|v| set.contains(v)),
            Predicate::Not(inner) => !inner.test(value),
        }
    }
}

/// One selected property and the predicate applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub selection: String,
    pub predicate: Predicate,
}

/// Conjunction of clauses over an element's properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementFilter {
    pub clauses: Vec<FilterClause>,
}

impl ElementFilter {
    pub fn new() -> Self {
        ElementFilter::default()
    }

    pub fn select(
        mut self,
        property: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        self.clauses.push(FilterClause {
            selection: property.into(),
            predicate,
        });
        self
    }

    pub fn test(&self, properties: &Properties) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.predicate.test(properties.get(&clause.selection)))
    }

    /// Property names this filter reads.
    pub fn selections(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|c| c.selection.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, i64)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::Int(*v)))
            .collect()
    }

    #[test]
    fn is_more_than() {
        let filter = ElementFilter::new().select("count", Predicate::IsMoreThan(5i64.into()));
        assert!(filter.test(&props(&[("count", 7)])));
        assert!(!filter.test(&props(&[("count", 5)])));
        assert!(!filter.test(&props(&[("count", 3)])));
    }

    #[test]
    fn missing_property_fails_comparisons_but_not_negations() {
        let empty = Properties::new();
        assert!(!Predicate::IsMoreThan(0i64.into()).test(empty.get("count")));
        assert!(!Predicate::Exists.test(empty.get("count")));
        assert!(Predicate::Not(Box::new(Predicate::Exists)).test(empty.get("count")));
    }

    #[test]
    fn type_mismatch_is_false() {
        let filter = ElementFilter::new().select("name", Predicate::IsMoreThan(5i64.into()));
        let mut properties = Properties::new();
        properties.insert("name".into(), PropertyValue::Str("x".into()));
        assert!(!filter.test(&properties));
    }

    #[test]
    fn clauses_are_a_conjunction() {
        let filter = ElementFilter::new()
            .select("count", Predicate::IsMoreThan(0i64.into()))
            .select("count", Predicate::IsLessThan(10i64.into()));
        assert!(filter.test(&props(&[("count", 5)])));
        assert!(!filter.test(&props(&[("count", 12)])));
    }
}
