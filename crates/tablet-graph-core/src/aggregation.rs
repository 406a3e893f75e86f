//! Property aggregators.
//!
//! When two stored entries share an aggregation key, each non-group-by
//! property is folded pairwise with the aggregator its schema declares.
//! Folding is commutative for every variant here except `First`/`StrConcat`,
//! which depend on the store returning entries newest-first (the tablet key
//! ordering sorts timestamps descending within an aggregation key).

use serde::{Deserialize, Serialize};

use crate::error::AggregationError;
use crate::types::PropertyValue;

/// Pairwise fold over two values of the same declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregator {
    /// Numeric addition; string concatenation is `StrConcat`.
    Sum,
    Min,
    Max,
    /// Keep the first value seen (the newest entry, given key ordering).
    First,
    /// Join string values with a separator, newest first.
    StrConcat { separator: String },
}

impl Aggregator {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregator::Sum => "sum",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::First => "first",
            Aggregator::StrConcat { .. } => "str-concat",
        }
    }

    /// Folds `b` into `a`, where `a` is the accumulated (newer) value.
    pub fn fold(
        &self,
        a: &PropertyValue,
        b: &PropertyValue,
    ) -> Result<PropertyValue, AggregationError> {
        match (self, a, b) {
            (Aggregator::Sum, PropertyValue::Int(x), PropertyValue::Int(y)) => {
                Ok(PropertyValue::Int(x.wrapping_add(*y)))
            }
            (Aggregator::Sum, PropertyValue::Float(x), PropertyValue::Float(y)) => {
                Ok(PropertyValue::Float(x + y))
            }
            (Aggregator::Min, x, y) => match x.compare(y) {
                Some(std::cmp::Ordering::Greater) => Ok(y.clone()),
                Some(_) => Ok(x.clone()),
                None => Err(self.incompatible(x, y)),
            },
            (Aggregator::Max, x, y) => match x.compare(y) {
                Some(std::cmp::Ordering::Less) => Ok(y.clone()),
                Some(_) => Ok(x.clone()),
                None => Err(self.incompatible(x, y)),
            },
            (Aggregator::First, x, _) => Ok(x.clone()),
            (
                Aggregator::StrConcat { separator },
                PropertyValue::Str(x),
                PropertyValue::Str(y),
            ) => Ok(PropertyValue::Str(format!("{x}{separator}{y}"))),
            (_, x, y) => Err(self.incompatible(x, y)),
        }
    }

    fn incompatible(&self, a: &PropertyValue, b: &PropertyValue) -> AggregationError {
        AggregationError::IncompatibleValues {
            aggregator: self.name(),
            left: a.type_name(),
            right: b.type_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_adds_ints() {
        let folded = Aggregator::Sum
            .fold(&PropertyValue::Int(3), &PropertyValue::Int(4))
            .unwrap();
        assert_eq!(folded, PropertyValue::Int(7));
    }

    #[test]
    fn max_is_idempotent() {
        let v = PropertyValue::Int(5);
        assert_eq!(Aggregator::Max.fold(&v, &v).unwrap(), v);
    }

    #[test]
    fn min_max_pick_the_extreme() {
        let lo = PropertyValue::Int(2);
        let hi = PropertyValue::Int(5);
        assert_eq!(Aggregator::Min.fold(&hi, &lo).unwrap(), lo);
        assert_eq!(Aggregator::Max.fold(&lo, &hi).unwrap(), hi);
    }

    #[test]
    fn first_keeps_the_accumulated_value() {
        let newest = PropertyValue::Str("new".into());
        let older = PropertyValue::Str("old".into());
        assert_eq!(Aggregator::First.fold(&newest, &older).unwrap(), newest);
    }

    #[test]
    fn str_concat_joins_with_separator() {
        let agg = Aggregator::StrConcat {
            separator: ",".into(),
        };
        assert_eq!(
            agg.fold(&"a".into(), &"b".into()).unwrap(),
            PropertyValue::Str("a,b".into())
        );
    }

    #[test]
    fn mismatched_types_fail() {
        let err = Aggregator::Sum
            .fold(&PropertyValue::Int(1), &PropertyValue::Str("x".into()))
            .unwrap_err();
        assert!(matches!(err, AggregationError::IncompatibleValues { .. }));
    }
}
