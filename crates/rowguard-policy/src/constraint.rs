//! Partial authorization decisions
//!
//! A [`Constraint`] is what a policy engine returns when asked "which rows of
//! this resource may the actor act on": a boolean expression over the
//! resource's fields, possibly reaching through relationships. It can be
//! translated to a query filter or evaluated against a concrete record.

use std::cmp::Ordering;
use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rowguard_common::RowguardError;

use crate::engine::DataFetcher;

/// Comparison operator between a field and a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[default]
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    /// Whether this operator orders values rather than testing equality
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Comparison::Lt | Comparison::Le | Comparison::Gt | Comparison::Ge
        )
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Constraint over a resource's fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Every row is permitted
    Always,
    /// No row is permitted
    Never,
    /// `field <op> value`; comparing to null means `IS NULL` / `IS NOT NULL`
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    NotIn {
        field: String,
        values: Vec<Value>,
    },
    /// Some row reachable through `relation` satisfies the inner constraint
    Related {
        relation: String,
        constraint: Box<Constraint>,
    },
    All(Vec<Constraint>),
    Any(Vec<Constraint>),
    Not(Box<Constraint>),
}

impl Constraint {
    pub fn compare(field: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Constraint::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Comparison::Eq, value)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::compare(field, Comparison::Eq, Value::Null)
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Constraint::In {
            field: field.into(),
            values,
        }
    }

    pub fn related(relation: impl Into<String>, constraint: Constraint) -> Self {
        Constraint::Related {
            relation: relation.into(),
            constraint: Box::new(constraint),
        }
    }

    pub fn negate(constraint: Constraint) -> Self {
        Constraint::Not(Box::new(constraint))
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Constraint::Always)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Constraint::Never)
    }

    /// Fold constant branches and flatten nested groups
    ///
    /// After simplification `Always` and `Never` only appear at the root.
    pub fn simplify(self) -> Constraint {
        match self {
            Constraint::Compare { op, value, .. } if op.is_ordering() && value.is_null() => {
                Constraint::Never
            }
            Constraint::In { values, .. } if values.is_empty() => Constraint::Never,
            Constraint::NotIn { values, .. } if values.is_empty() => Constraint::Always,
            Constraint::Related {
                relation,
                constraint,
            } => match constraint.simplify() {
                Constraint::Never => Constraint::Never,
                inner => Constraint::Related {
                    relation,
                    constraint: Box::new(inner),
                },
            },
            Constraint::All(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.simplify() {
                        Constraint::Always => {}
                        Constraint::Never => return Constraint::Never,
                        Constraint::All(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                collapse(out, Constraint::Always, Constraint::All)
            }
            Constraint::Any(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.simplify() {
                        Constraint::Never => {}
                        Constraint::Always => return Constraint::Always,
                        Constraint::Any(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                collapse(out, Constraint::Never, Constraint::Any)
            }
            Constraint::Not(inner) => match inner.simplify() {
                Constraint::Always => Constraint::Never,
                Constraint::Never => Constraint::Always,
                Constraint::Not(double) => *double,
                other => Constraint::Not(Box::new(other)),
            },
            other => other,
        }
    }

    /// Evaluate against a concrete record with SQL three-valued logic
    ///
    /// Returns `None` when the result is unknown (a comparison touched a null
    /// field), matching what the database does with the translated filter.
    /// `Related` constraints are resolved through `fetcher`.
    pub fn evaluate<'a>(
        &'a self,
        resource: &'a str,
        record: &'a Value,
        fetcher: Option<&'a dyn DataFetcher>,
    ) -> BoxFuture<'a, anyhow::Result<Option<bool>>> {
        Box::pin(async move {
            let result = match self {
                Constraint::Always => Some(true),
                Constraint::Never => Some(false),
                Constraint::Compare { field, op, value } => {
                    compare_field(field_value(record, field), *op, value)
                }
                Constraint::In { field, values } => contains(field_value(record, field), values),
                Constraint::NotIn { field, values } => {
                    contains(field_value(record, field), values).map(|found| !found)
                }
                Constraint::Related {
                    relation,
                    constraint,
                } => {
                    let fetcher = fetcher.ok_or(RowguardError::NoSessionProvider)?;
                    Some(
                        fetcher
                            .related_exists(resource, record, relation, constraint)
                            .await?,
                    )
                }
                Constraint::All(items) => {
                    let mut unknown = false;
                    for item in items {
                        match item.evaluate(resource, record, fetcher).await? {
                            Some(false) => return Ok(Some(false)),
                            None => unknown = true,
                            Some(true) => {}
                        }
                    }
                    if unknown { None } else { Some(true) }
                }
                Constraint::Any(items) => {
                    let mut unknown = false;
                    for item in items {
                        match item.evaluate(resource, record, fetcher).await? {
                            Some(true) => return Ok(Some(true)),
                            None => unknown = true,
                            Some(false) => {}
                        }
                    }
                    if unknown { None } else { Some(false) }
                }
                Constraint::Not(inner) => inner
                    .evaluate(resource, record, fetcher)
                    .await?
                    .map(|value| !value),
            };
            Ok(result)
        })
    }
}

fn collapse(
    mut items: Vec<Constraint>,
    empty: Constraint,
    group: fn(Vec<Constraint>) -> Constraint,
) -> Constraint {
    match items.len() {
        0 => empty,
        1 => items.swap_remove(0),
        _ => group(items),
    }
}

fn field_value<'a>(record: &'a Value, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

fn compare_field(actual: &Value, op: Comparison, expected: &Value) -> Option<bool> {
    if expected.is_null() {
        return match op {
            Comparison::Eq => Some(actual.is_null()),
            Comparison::Ne => Some(!actual.is_null()),
            _ => Some(false),
        };
    }
    if actual.is_null() {
        return None;
    }
    match compare_values(actual, expected) {
        Some(ordering) => Some(op.holds(ordering)),
        // Mismatched types are never equal
        None => Some(op == Comparison::Ne),
    }
}

fn contains(actual: &Value, values: &[Value]) -> Option<bool> {
    if values.is_empty() {
        return Some(false);
    }
    if actual.is_null() {
        return None;
    }
    if values
        .iter()
        .any(|v| compare_values(actual, v) == Some(Ordering::Equal))
    {
        return Some(true);
    }
    if values.iter().any(Value::is_null) {
        None
    } else {
        Some(false)
    }
}

/// Order two JSON scalars of the same kind
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Always => write!(f, "true"),
            Constraint::Never => write!(f, "false"),
            Constraint::Compare { field, op, value } if value.is_null() => match op {
                Comparison::Eq => write!(f, "{} is null", field),
                Comparison::Ne => write!(f, "{} is not null", field),
                _ => write!(f, "{} {} null", field, op),
            },
            Constraint::Compare { field, op, value } => write!(f, "{} {} {}", field, op, value),
            Constraint::In { field, values } => {
                write!(f, "{} in {}", field, Value::Array(values.clone()))
            }
            Constraint::NotIn { field, values } => {
                write!(f, "{} not in {}", field, Value::Array(values.clone()))
            }
            Constraint::Related {
                relation,
                constraint,
            } => write!(f, "{}({})", relation, constraint),
            Constraint::All(items) => write_group(f, items, " and "),
            Constraint::Any(items) => write_group(f, items, " or "),
            Constraint::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, items: &[Constraint], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}
