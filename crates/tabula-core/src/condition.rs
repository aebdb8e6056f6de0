//! Condition trees.
//!
//! A [`Condition`] is an immutable tree of comparisons on dotted field paths
//! combined with AND/OR groups. Searches compile it into a backend predicate;
//! validation rules evaluate it in memory against a hydrated instance.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    In,
    NotIn,
}

impl ComparisonOp {
    pub const fn as_sql(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::Less => "<",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::In => "IN",
            ComparisonOp::NotIn => "NOT IN",
        }
    }

    /// Whether this operator expects a list on the right.
    pub const fn is_membership(self) -> bool {
        matches!(self, ComparisonOp::In | ComparisonOp::NotIn)
    }

    /// Apply to an ordering; `None` (incomparable) never matches.
    pub fn matches(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (_, None) => false,
            (ComparisonOp::Equal | ComparisonOp::In, Some(o)) => o == Ordering::Equal,
            (ComparisonOp::NotEqual | ComparisonOp::NotIn, Some(o)) => o != Ordering::Equal,
            (ComparisonOp::Greater, Some(o)) => o == Ordering::Greater,
            (ComparisonOp::GreaterEqual, Some(o)) => o != Ordering::Less,
            (ComparisonOp::Less, Some(o)) => o == Ordering::Less,
            (ComparisonOp::LessEqual, Some(o)) => o != Ordering::Greater,
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionOperand {
    Literal(Value),
    List(Vec<Value>),
    /// Another dotted path on the same root.
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    And,
    Or,
}

/// A condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Compare {
        path: String,
        op: ComparisonOp,
        operand: ConditionOperand,
    },
    Group {
        kind: GroupKind,
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn compare(path: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            path: path.into(),
            op,
            operand: ConditionOperand::Literal(value.into()),
        }
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, ComparisonOp::Equal, value)
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, ComparisonOp::NotEqual, value)
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, ComparisonOp::Greater, value)
    }

    pub fn ge(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, ComparisonOp::GreaterEqual, value)
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, ComparisonOp::Less, value)
    }

    pub fn le(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, ComparisonOp::LessEqual, value)
    }

    pub fn in_list<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::Compare {
            path: path.into(),
            op: ComparisonOp::In,
            operand: ConditionOperand::List(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn not_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::Compare {
            path: path.into(),
            op: ComparisonOp::NotIn,
            operand: ConditionOperand::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Compare two paths of the same root.
    pub fn fields(path: impl Into<String>, op: ComparisonOp, other: impl Into<String>) -> Self {
        Condition::Compare {
            path: path.into(),
            op,
            operand: ConditionOperand::Field(other.into()),
        }
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Group {
            kind: GroupKind::And,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Group {
            kind: GroupKind::Or,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Self::all([self, other])
    }

    pub fn or(self, other: Condition) -> Self {
        Self::any([self, other])
    }

    /// Every dotted path referenced anywhere in the tree.
    pub fn field_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths(&self, paths: &mut BTreeSet<String>) {
        match self {
            Condition::Compare { path, operand, .. } => {
                paths.insert(path.clone());
                if let ConditionOperand::Field(other) = operand {
                    paths.insert(other.clone());
                }
            }
            Condition::Group { conditions, .. } => {
                for condition in conditions {
                    condition.collect_paths(paths);
                }
            }
        }
    }

    /// Evaluate in memory, reading path values through `resolve`.
    ///
    /// NULL equals NULL here, unlike in SQL; ordering against NULL never
    /// matches. An empty AND is true and an empty OR is false.
    pub fn evaluate<F>(&self, resolve: &mut F) -> Result<bool>
    where
        F: FnMut(&str) -> Result<Value>,
    {
        match self {
            Condition::Compare { path, op, operand } => {
                let left = resolve(path)?;
                let right = match operand {
                    ConditionOperand::Literal(value) => vec![value.clone()],
                    ConditionOperand::List(values) => values.clone(),
                    ConditionOperand::Field(other) => vec![resolve(other)?],
                };
                if right.len() != 1 && !op.is_membership() {
                    return Err(Error::TypeMismatch {
                        expected: "single operand".to_string(),
                        found: format!("list of {}", right.len()),
                    });
                }
                let hit = right
                    .iter()
                    .any(|value| left.compare(value) == Some(Ordering::Equal));
                Ok(match op {
                    ComparisonOp::In => hit,
                    ComparisonOp::NotIn => !hit,
                    ComparisonOp::NotEqual => !hit,
                    _ => op.matches(left.compare(&right[0])),
                })
            }
            Condition::Group { kind, conditions } => {
                for condition in conditions {
                    let result = condition.evaluate(resolve)?;
                    match (kind, result) {
                        (GroupKind::And, false) => return Ok(false),
                        (GroupKind::Or, true) => return Ok(true),
                        _ => {}
                    }
                }
                Ok(*kind == GroupKind::And)
            }
        }
    }
}
