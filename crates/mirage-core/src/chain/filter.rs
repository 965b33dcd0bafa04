//! Boolean filter trees: leaf predicates (`FilterOperation`) composed with
//! AND/OR (`LogicNode`), and their evaluation against a generated batch.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::arithmetic::ArithmeticNode;
use crate::chain::operator::CompareOperator;
use crate::chain::parameter::{Parameter, NULL_INDEX};
use crate::error::{MirageError, Result};

/// Read access to the attribute values of one batch.
pub trait BatchView {
    /// Internal bucket index of `column` at `row` (`NULL_INDEX` for NULL).
    fn column_index(&self, column: &str, row: usize) -> Result<i64>;

    /// Numeric value of `column` at `row`, for multivariate expressions.
    fn column_numeric(&self, column: &str, row: usize) -> Result<Option<f64>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterTarget {
    Column { column: String },
    Expression { expression: ArithmeticNode },
}

/// A leaf predicate.
///
/// `probability` is the fraction of all rows (NULLs included) for which the
/// operator evaluates to TRUE. It is assigned by push-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOperation {
    pub operator: CompareOperator,
    #[serde(default)]
    pub probability: Decimal,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub target: FilterTarget,
    /// Instantiated threshold of a multivariate comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl FilterOperation {
    pub fn univariate(column: &str, operator: CompareOperator, parameters: Vec<Parameter>) -> Self {
        Self {
            operator,
            probability: Decimal::ZERO,
            parameters,
            target: FilterTarget::Column {
                column: column.to_string(),
            },
            threshold: None,
        }
    }

    pub fn multivariate(
        expression: ArithmeticNode,
        operator: CompareOperator,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            operator,
            probability: Decimal::ZERO,
            parameters,
            target: FilterTarget::Expression { expression },
            threshold: None,
        }
    }

    /// The column of a univariate predicate.
    pub fn column(&self) -> Option<&str> {
        match &self.target {
            FilterTarget::Column { column } => Some(column),
            FilterTarget::Expression { .. } => None,
        }
    }

    pub fn is_multivariate(&self) -> bool {
        matches!(self.target, FilterTarget::Expression { .. })
    }

    pub fn columns(&self) -> Vec<&str> {
        match &self.target {
            FilterTarget::Column { column } => vec![column.as_str()],
            FilterTarget::Expression { expression } => expression.columns(),
        }
    }

    pub fn parameter_ids(&self) -> Vec<u32> {
        self.parameters.iter().map(|p| p.id).collect()
    }

    pub fn set_probability(&mut self, probability: Decimal) {
        self.probability = probability.normalize();
    }

    pub fn evaluate(&self, view: &dyn BatchView, row: usize) -> Result<bool> {
        match &self.target {
            FilterTarget::Column { column } => {
                let index = view.column_index(column, row)?;
                self.evaluate_index(index)
            }
            FilterTarget::Expression { expression } => {
                let threshold = self.threshold.ok_or_else(|| {
                    MirageError::Other(format!(
                        "multivariate filter with parameters {:?} has no threshold",
                        self.parameter_ids()
                    ))
                })?;
                let value = expression.evaluate_with(&mut |c| view.column_numeric(c, row))?;
                Ok(self.operator.compare_f64(value, threshold))
            }
        }
    }

    /// Two-valued evaluation on a bucket index: NULL satisfies only IS NULL.
    pub fn evaluate_index(&self, index: i64) -> Result<bool> {
        let is_null = index == NULL_INDEX;
        if is_null && !self.operator.is_null_check() {
            return Ok(false);
        }
        Ok(match self.operator {
            CompareOperator::IsNull => is_null,
            CompareOperator::IsNotNull => !is_null,
            CompareOperator::In => self.contains(index)?,
            CompareOperator::NotIn => !self.contains(index)?,
            CompareOperator::Lt => index < self.first_data()?,
            CompareOperator::Le => index <= self.first_data()?,
            CompareOperator::Gt => index > self.first_data()?,
            CompareOperator::Ge => index >= self.first_data()?,
            CompareOperator::Eq | CompareOperator::Like => index == self.first_data()?,
            CompareOperator::Ne | CompareOperator::NotLike => index != self.first_data()?,
        })
    }

    fn contains(&self, index: i64) -> Result<bool> {
        let mut found = false;
        for p in &self.parameters {
            found |= self.data_of(p)? == index;
        }
        Ok(found)
    }

    fn first_data(&self) -> Result<i64> {
        let param = self.parameters.first().ok_or_else(|| {
            MirageError::Other(format!("{} filter without a parameter", self.operator))
        })?;
        self.data_of(param)
    }

    fn data_of(&self, p: &Parameter) -> Result<i64> {
        if p.is_set() {
            Ok(p.data)
        } else {
            Err(MirageError::Other(format!(
                "parameter {} of {} filter has no data assigned",
                p.id, self.operator
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicNode {
    pub operator: LogicOperator,
    pub children: Vec<BoolExpr>,
    /// Set while push-down treats this node as the negated AND of its
    /// negated children.
    #[serde(skip)]
    pub reversed: bool,
}

impl LogicNode {
    pub fn and(children: Vec<BoolExpr>) -> Self {
        Self {
            operator: LogicOperator::And,
            children,
            reversed: false,
        }
    }

    pub fn or(children: Vec<BoolExpr>) -> Self {
        Self {
            operator: LogicOperator::Or,
            children,
            reversed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoolExpr {
    Logic(LogicNode),
    Filter(FilterOperation),
}

impl BoolExpr {
    pub fn evaluate(&self, view: &dyn BatchView, row: usize) -> Result<bool> {
        match self {
            BoolExpr::Filter(op) => op.evaluate(view, row),
            BoolExpr::Logic(node) => {
                let mut acc = node.operator == LogicOperator::And;
                for child in &node.children {
                    let value = child.evaluate(view, row)?;
                    match node.operator {
                        LogicOperator::And => acc &= value,
                        LogicOperator::Or => acc |= value,
                    }
                }
                Ok(acc)
            }
        }
    }

    /// All leaves, depth first.
    pub fn leaves(&self) -> Vec<&FilterOperation> {
        let mut out = Vec::new();
        self.walk(&mut |op| out.push(op));
        out
    }

    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a FilterOperation)) {
        match self {
            BoolExpr::Filter(op) => f(op),
            BoolExpr::Logic(node) => {
                for child in &node.children {
                    child.walk(f);
                }
            }
        }
    }

    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut FilterOperation)) {
        match self {
            BoolExpr::Filter(op) => f(op),
            BoolExpr::Logic(node) => {
                for child in &mut node.children {
                    child.walk_mut(f);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Rows(HashMap<&'static str, Vec<i64>>);

    impl BatchView for Rows {
        fn column_index(&self, column: &str, row: usize) -> Result<i64> {
            self.0
                .get(column)
                .map(|v| v[row])
                .ok_or_else(|| MirageError::UnknownColumn {
                    column: column.to_string(),
                })
        }

        fn column_numeric(&self, column: &str, row: usize) -> Result<Option<f64>> {
            let idx = self.column_index(column, row)?;
            Ok((idx != NULL_INDEX).then_some(idx as f64))
        }
    }

    fn param(id: u32, data: i64) -> Parameter {
        Parameter {
            data,
            ..Parameter::new(id)
        }
    }

    #[test]
    fn test_threshold_operators() {
        let lt = FilterOperation::univariate("a", CompareOperator::Lt, vec![param(1, 5)]);
        assert!(lt.evaluate_index(4).unwrap());
        assert!(!lt.evaluate_index(5).unwrap());
        assert!(!lt.evaluate_index(NULL_INDEX).unwrap());

        let ge = FilterOperation::univariate("a", CompareOperator::Ge, vec![param(1, 5)]);
        assert!(ge.evaluate_index(5).unwrap());
        assert!(!ge.evaluate_index(NULL_INDEX).unwrap());
    }

    #[test]
    fn test_negative_operators_reject_null() {
        let ne = FilterOperation::univariate("a", CompareOperator::Ne, vec![param(1, 3)]);
        assert!(ne.evaluate_index(2).unwrap());
        assert!(!ne.evaluate_index(3).unwrap());
        assert!(!ne.evaluate_index(NULL_INDEX).unwrap());

        let not_in = FilterOperation::univariate(
            "a",
            CompareOperator::NotIn,
            vec![param(1, 3), param(2, 4)],
        );
        assert!(!not_in.evaluate_index(4).unwrap());
        assert!(not_in.evaluate_index(7).unwrap());
        assert!(!not_in.evaluate_index(NULL_INDEX).unwrap());
    }

    #[test]
    fn test_unset_parameter_is_error() {
        let eq = FilterOperation::univariate("a", CompareOperator::Eq, vec![Parameter::new(9)]);
        assert!(eq.evaluate_index(1).is_err());
    }

    #[test]
    fn test_logic_evaluation() {
        let rows = Rows(HashMap::from([("a", vec![1, 9]), ("b", vec![9, 9])]));
        let expr = BoolExpr::Logic(LogicNode::or(vec![
            BoolExpr::Filter(FilterOperation::univariate(
                "a",
                CompareOperator::Lt,
                vec![param(1, 2)],
            )),
            BoolExpr::Filter(FilterOperation::univariate(
                "b",
                CompareOperator::Lt,
                vec![param(2, 2)],
            )),
        ]));
        assert!(expr.evaluate(&rows, 0).unwrap());
        assert!(!expr.evaluate(&rows, 1).unwrap());
        assert_eq!(expr.leaves().len(), 2);
    }

    #[test]
    fn test_multivariate_needs_threshold() {
        let rows = Rows(HashMap::from([("a", vec![3]), ("b", vec![4])]));
        let expr = ArithmeticNode::Binary {
            operator: crate::chain::arithmetic::ArithmeticOperator::Plus,
            left: Box::new(ArithmeticNode::Column {
                column: "a".to_string(),
            }),
            right: Box::new(ArithmeticNode::Column {
                column: "b".to_string(),
            }),
        };
        let mut op = FilterOperation::multivariate(expr, CompareOperator::Gt, vec![Parameter::new(1)]);
        assert!(op.evaluate(&rows, 0).is_err());
        op.threshold = Some(6.5);
        assert!(op.evaluate(&rows, 0).unwrap());
    }

    #[test]
    fn test_deserialize_tree() {
        let json = r#"{"type": "logic", "operator": "and", "children": [
            {"type": "filter", "operator": "GE", "probability": "0.40",
             "parameters": [{"id": 3}], "target": {"kind": "column", "column": "age"}}
        ]}"#;
        let expr: BoolExpr = serde_json::from_str(json).unwrap();
        let leaves = expr.leaves();
        assert_eq!(leaves[0].column(), Some("age"));
        assert_eq!(leaves[0].probability, Decimal::new(4, 1));
    }
}
