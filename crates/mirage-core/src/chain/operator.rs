use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operator of a leaf predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOperator {
    #[serde(rename = "GE")]
    Ge,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "LE")]
    Le,
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "NE")]
    Ne,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT_LIKE")]
    NotLike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT_IN")]
    NotIn,
    #[serde(rename = "ISNULL")]
    IsNull,
    #[serde(rename = "IS_NOT_NULL")]
    IsNotNull,
}

impl CompareOperator {
    /// Equality family: placed as point buckets rather than thresholds.
    pub fn is_equal(self) -> bool {
        matches!(
            self,
            CompareOperator::Eq
                | CompareOperator::Ne
                | CompareOperator::Like
                | CompareOperator::NotLike
                | CompareOperator::In
                | CompareOperator::NotIn
        )
    }

    pub fn is_null_check(self) -> bool {
        matches!(self, CompareOperator::IsNull | CompareOperator::IsNotNull)
    }

    /// Inequality thresholds.
    pub fn is_range(self) -> bool {
        matches!(
            self,
            CompareOperator::Ge | CompareOperator::Gt | CompareOperator::Le | CompareOperator::Lt
        )
    }

    /// Operators whose selected rows are the complement of a positive
    /// operator within the non-null rows.
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            CompareOperator::Ne | CompareOperator::NotLike | CompareOperator::NotIn
        )
    }

    /// The positive counterpart of an equality-family operator.
    pub fn positive(self) -> CompareOperator {
        match self {
            CompareOperator::Ne => CompareOperator::Eq,
            CompareOperator::NotLike => CompareOperator::Like,
            CompareOperator::NotIn => CompareOperator::In,
            other => other,
        }
    }

    /// Logical negation under two-valued evaluation of the row domain.
    pub fn negate(self) -> CompareOperator {
        match self {
            CompareOperator::Ge => CompareOperator::Lt,
            CompareOperator::Gt => CompareOperator::Le,
            CompareOperator::Le => CompareOperator::Gt,
            CompareOperator::Lt => CompareOperator::Ge,
            CompareOperator::Eq => CompareOperator::Ne,
            CompareOperator::Ne => CompareOperator::Eq,
            CompareOperator::Like => CompareOperator::NotLike,
            CompareOperator::NotLike => CompareOperator::Like,
            CompareOperator::In => CompareOperator::NotIn,
            CompareOperator::NotIn => CompareOperator::In,
            CompareOperator::IsNull => CompareOperator::IsNotNull,
            CompareOperator::IsNotNull => CompareOperator::IsNull,
        }
    }

    /// Compare a generated value against a threshold. NULL never matches.
    pub fn compare_f64(self, value: Option<f64>, threshold: f64) -> bool {
        match (self, value) {
            (CompareOperator::IsNull, v) => v.is_none(),
            (CompareOperator::IsNotNull, v) => v.is_some(),
            (_, None) => false,
            (CompareOperator::Ge, Some(v)) => v >= threshold,
            (CompareOperator::Gt, Some(v)) => v > threshold,
            (CompareOperator::Le, Some(v)) => v <= threshold,
            (CompareOperator::Lt, Some(v)) => v < threshold,
            (CompareOperator::Eq | CompareOperator::Like | CompareOperator::In, Some(v)) => {
                v == threshold
            }
            (CompareOperator::Ne | CompareOperator::NotLike | CompareOperator::NotIn, Some(v)) => {
                v != threshold
            }
        }
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOperator::Ge => ">=",
            CompareOperator::Gt => ">",
            CompareOperator::Le => "<=",
            CompareOperator::Lt => "<",
            CompareOperator::Eq => "=",
            CompareOperator::Ne => "<>",
            CompareOperator::Like => "LIKE",
            CompareOperator::NotLike => "NOT LIKE",
            CompareOperator::In => "IN",
            CompareOperator::NotIn => "NOT IN",
            CompareOperator::IsNull => "IS NULL",
            CompareOperator::IsNotNull => "IS NOT NULL",
        };
        write!(f, "{}", s)
    }
}
