//! Constraint to query filter translation
//!
//! Turns a partial decision into a sea-orm [`Condition`] over a registered
//! model's table. Relationship constraints become correlated `EXISTS`
//! subqueries against the related table.

use sea_orm::Condition;
use sea_orm::sea_query::{Alias, Expr, Query, SimpleExpr};
use serde_json::Value;

use rowguard_common::RowguardError;
use rowguard_policy::{Comparison, Constraint};

use crate::registry::{ModelInfo, ModelRegistry};

/// Translate `constraint` into a filter over `model`'s rows
///
/// The constraint is simplified first, so an unconditional grant yields an
/// empty condition and a blanket denial yields `1 = 0`.
pub fn constraint_to_condition(
    constraint: &Constraint,
    model: &ModelInfo,
    registry: &ModelRegistry,
) -> anyhow::Result<Condition> {
    match constraint.clone().simplify() {
        Constraint::Always => Ok(Condition::all()),
        Constraint::Never => Ok(Condition::all().add(never())),
        simplified => translate(&simplified, model, &model.table, registry),
    }
}

fn never() -> SimpleExpr {
    Expr::val(1).eq(0)
}

/// `scope` is the name `model`'s columns are qualified with: its table, or
/// an alias inside a self-referencing subquery
fn translate(
    constraint: &Constraint,
    model: &ModelInfo,
    scope: &str,
    registry: &ModelRegistry,
) -> anyhow::Result<Condition> {
    let condition = match constraint {
        // Only reachable inside an unsimplified tree
        Constraint::Always => Condition::all().add(Expr::val(1).eq(1)),
        Constraint::Never => Condition::all().add(never()),
        Constraint::Compare { field, op, value } => {
            let column = column(model, scope, field)?;
            Condition::all().add(compare(column, *op, field, value)?)
        }
        Constraint::In { field, values } => {
            let column = column(model, scope, field)?;
            Condition::all().add(column.is_in(list_values(field, values)?))
        }
        Constraint::NotIn { field, values } => {
            let column = column(model, scope, field)?;
            Condition::all().add(column.is_not_in(list_values(field, values)?))
        }
        Constraint::Related {
            relation,
            constraint,
        } => Condition::all().add(related(model, scope, relation, constraint, registry)?),
        Constraint::All(items) => {
            let mut condition = Condition::all();
            for item in items {
                condition = condition.add(translate(item, model, scope, registry)?);
            }
            condition
        }
        Constraint::Any(items) => {
            let mut condition = Condition::any();
            for item in items {
                condition = condition.add(translate(item, model, scope, registry)?);
            }
            condition
        }
        Constraint::Not(inner) => translate(inner, model, scope, registry)?.not(),
    };
    Ok(condition)
}

/// Qualified column, rejecting fields the model does not have
fn column(model: &ModelInfo, scope: &str, field: &str) -> anyhow::Result<Expr> {
    let field = column_name(model, field)?;
    Ok(Expr::col((Alias::new(scope), Alias::new(field))))
}

fn compare(column: Expr, op: Comparison, field: &str, value: &Value) -> anyhow::Result<SimpleExpr> {
    if value.is_null() {
        return Ok(match op {
            Comparison::Eq => column.is_null(),
            Comparison::Ne => column.is_not_null(),
            _ => never(),
        });
    }
    let value = json_to_value(field, value)?;
    Ok(match op {
        Comparison::Eq => column.eq(value),
        Comparison::Ne => column.ne(value),
        Comparison::Lt => column.lt(value),
        Comparison::Le => column.lte(value),
        Comparison::Gt => column.gt(value),
        Comparison::Ge => column.gte(value),
    })
}

/// `EXISTS (SELECT 1 FROM target WHERE target.to = scope.from AND <inner>)`
///
/// EXISTS is never unknown, so a null foreign key or a null key in the
/// target makes the relationship false, also under `NOT`.
fn related(
    model: &ModelInfo,
    scope: &str,
    relation: &str,
    inner: &Constraint,
    registry: &ModelRegistry,
) -> anyhow::Result<SimpleExpr> {
    let rel = model
        .relationships
        .get(relation)
        .ok_or_else(|| RowguardError::UnknownRelationship {
            model: model.resource.clone(),
            relation: relation.to_string(),
        })?;
    let target = registry
        .get_by_table(&rel.target_table)
        .ok_or_else(|| RowguardError::ModelNotRegistered(rel.target_table.clone()))?;

    // a self-reference needs its own name to correlate against the outer row
    let target_scope = if target.table == scope {
        format!("{}_related", target.table)
    } else {
        target.table.clone()
    };
    let from = (Alias::new(scope), Alias::new(column_name(model, &rel.from_column)?));
    let to = column(&target, &target_scope, &rel.to_column)?;

    let mut subquery = Query::select();
    subquery.expr(Expr::val(1));
    if target_scope == target.table {
        subquery.from(Alias::new(&target.table));
    } else {
        subquery.from_as(Alias::new(&target.table), Alias::new(&target_scope));
    }
    subquery.and_where(to.equals(from));
    match inner.clone().simplify() {
        Constraint::Always => {}
        Constraint::Never => return Ok(never()),
        simplified => {
            subquery.cond_where(translate(&simplified, &target, &target_scope, registry)?);
        }
    }

    Ok(Expr::exists(subquery.to_owned()))
}

fn column_name<'a>(model: &ModelInfo, field: &'a str) -> anyhow::Result<&'a str> {
    if model.has_field(field) {
        Ok(field)
    } else {
        Err(RowguardError::UnknownField {
            model: model.resource.clone(),
            field: field.to_string(),
        }
        .into())
    }
}

fn list_values(field: &str, values: &[Value]) -> anyhow::Result<Vec<sea_orm::Value>> {
    values
        .iter()
        .map(|value| {
            if value.is_null() {
                Err(RowguardError::UnsupportedValue {
                    field: field.to_string(),
                    reason: "null inside a value list".to_string(),
                }
                .into())
            } else {
                json_to_value(field, value)
            }
        })
        .collect()
}

/// Bind a JSON scalar as a database value
pub fn json_to_value(field: &str, value: &Value) -> anyhow::Result<sea_orm::Value> {
    let unsupported = |reason: &str| RowguardError::UnsupportedValue {
        field: field.to_string(),
        reason: reason.to_string(),
    };
    let converted = match value {
        Value::Bool(b) => sea_orm::Value::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                sea_orm::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                sea_orm::Value::from(u)
            } else if let Some(f) = n.as_f64() {
                sea_orm::Value::from(f)
            } else {
                return Err(unsupported("number out of range").into());
            }
        }
        Value::String(s) => sea_orm::Value::from(s.clone()),
        Value::Null => return Err(unsupported("null cannot be bound").into()),
        Value::Array(_) | Value::Object(_) => {
            return Err(unsupported("only scalar values can be compared").into());
        }
    };
    Ok(converted)
}
