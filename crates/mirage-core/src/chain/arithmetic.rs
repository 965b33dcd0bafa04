//! Arithmetic expressions over numeric columns, used by multivariate filters
//! such as `price * (1 - discount) > ?`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOperator {
    Plus,
    Minus,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArithmeticNode {
    Column {
        column: String,
    },
    Constant {
        value: f64,
    },
    Binary {
        operator: ArithmeticOperator,
        left: Box<ArithmeticNode>,
        right: Box<ArithmeticNode>,
    },
}

impl ArithmeticNode {
    /// Columns referenced by the expression, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ArithmeticNode::Column { column } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            ArithmeticNode::Constant { .. } => {}
            ArithmeticNode::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
        }
    }

    /// Evaluate the expression, resolving column references through `lookup`.
    ///
    /// NULL propagates; division by zero also yields NULL.
    pub fn evaluate_with<F>(&self, lookup: &mut F) -> Result<Option<f64>>
    where
        F: FnMut(&str) -> Result<Option<f64>>,
    {
        match self {
            ArithmeticNode::Column { column } => lookup(column),
            ArithmeticNode::Constant { value } => Ok(Some(*value)),
            ArithmeticNode::Binary {
                operator,
                left,
                right,
            } => {
                let (Some(l), Some(r)) = (left.evaluate_with(lookup)?, right.evaluate_with(lookup)?)
                else {
                    return Ok(None);
                };
                Ok(match operator {
                    ArithmeticOperator::Plus => Some(l + r),
                    ArithmeticOperator::Minus => Some(l - r),
                    ArithmeticOperator::Mul => Some(l * r),
                    ArithmeticOperator::Div if r == 0.0 => None,
                    ArithmeticOperator::Div => Some(l / r),
                })
            }
        }
    }
}
