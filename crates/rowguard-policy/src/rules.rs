//! Rule-based policy engine
//!
//! Rules are loaded from YAML documents of the form
//!
//! ```yaml
//! resources:
//!   posts:
//!     read:
//!       - when: { field: published, value: true }
//!       - when: { field: author_id, actor: id }
//!       - roles: [admin]
//!     "*":
//!       - when:
//!           relation: author
//!           when: { field: org_id, actor: org.id }
//! ```
//!
//! Every rule listed under an action (or under `"*"`) grants access on its
//! own, so the rules are OR-ed together.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use rowguard_common::{ACTION_WILDCARD, RowguardError, is_valid_identifier};

use crate::actor::Actor;
use crate::constraint::{Comparison, Constraint};
use crate::engine::{DataFetcher, PolicyEngine, ResourceClass};

/// Operator accepted in rule conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    fn comparison(self) -> Option<Comparison> {
        match self {
            Operator::Eq => Some(Comparison::Eq),
            Operator::Ne => Some(Comparison::Ne),
            Operator::Lt => Some(Comparison::Lt),
            Operator::Le => Some(Comparison::Le),
            Operator::Gt => Some(Comparison::Gt),
            Operator::Ge => Some(Comparison::Ge),
            _ => None,
        }
    }

    fn takes_operand(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    resources: HashMap<String, HashMap<String, Vec<RuleSpec>>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    when: Option<ConditionSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionSpec {
    all: Option<Vec<ConditionSpec>>,
    any: Option<Vec<ConditionSpec>>,
    not: Option<Box<ConditionSpec>>,
    field: Option<String>,
    op: Option<Operator>,
    value: Option<Value>,
    actor: Option<String>,
    relation: Option<String>,
    when: Option<Box<ConditionSpec>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    None,
    Literal(Value),
    Actor(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    Field {
        field: String,
        op: Operator,
        operand: Operand,
    },
    Related {
        relation: String,
        condition: Option<Box<Condition>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Rule {
    roles: Vec<String>,
    condition: Option<Condition>,
}

fn parse_error(message: impl Into<String>) -> anyhow::Error {
    RowguardError::PolicyParse(message.into()).into()
}

impl TryFrom<ConditionSpec> for Condition {
    type Error = anyhow::Error;

    fn try_from(spec: ConditionSpec) -> Result<Self, Self::Error> {
        let shapes = [
            spec.all.is_some(),
            spec.any.is_some(),
            spec.not.is_some(),
            spec.field.is_some(),
            spec.relation.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if shapes != 1 {
            return Err(parse_error(
                "a condition needs exactly one of: all, any, not, field, relation",
            ));
        }

        if let Some(items) = spec.all {
            return Ok(Condition::All(compile_all(items)?));
        }
        if let Some(items) = spec.any {
            return Ok(Condition::Any(compile_all(items)?));
        }
        if let Some(inner) = spec.not {
            return Ok(Condition::Not(Box::new(Condition::try_from(*inner)?)));
        }
        if let Some(relation) = spec.relation {
            if !is_valid_identifier(&relation) {
                return Err(parse_error(format!("invalid relation name '{}'", relation)));
            }
            if spec.op.is_some() || spec.value.is_some() || spec.actor.is_some() {
                return Err(parse_error(format!(
                    "relation '{}' only accepts a nested 'when'",
                    relation
                )));
            }
            let condition = match spec.when {
                Some(inner) => Some(Box::new(Condition::try_from(*inner)?)),
                None => None,
            };
            return Ok(Condition::Related {
                relation,
                condition,
            });
        }

        let field = spec.field.unwrap_or_default();
        if !is_valid_identifier(&field) {
            return Err(parse_error(format!("invalid field name '{}'", field)));
        }
        if spec.when.is_some() {
            return Err(parse_error(format!(
                "'when' is only valid with 'relation' (field '{}')",
                field
            )));
        }
        let op = spec.op.unwrap_or_default();
        let operand = match (spec.value, spec.actor) {
            (Some(_), Some(_)) => {
                return Err(parse_error(format!(
                    "field '{}' has both 'value' and 'actor'",
                    field
                )));
            }
            (Some(value), None) => Operand::Literal(value),
            (None, Some(path)) => Operand::Actor(path),
            (None, None) => Operand::None,
        };
        match (&operand, op.takes_operand()) {
            (Operand::None, true) => {
                return Err(parse_error(format!(
                    "field '{}' needs a 'value' or an 'actor' operand",
                    field
                )));
            }
            (Operand::Literal(_) | Operand::Actor(_), false) => {
                return Err(parse_error(format!(
                    "operator {:?} on field '{}' takes no operand",
                    op, field
                )));
            }
            _ => {}
        }
        if let (Operator::In | Operator::NotIn, Operand::Literal(value)) = (op, &operand) {
            if !value.is_array() {
                return Err(parse_error(format!(
                    "operator {:?} on field '{}' needs a list value",
                    op, field
                )));
            }
        }
        Ok(Condition::Field { field, op, operand })
    }
}

fn compile_all(items: Vec<ConditionSpec>) -> anyhow::Result<Vec<Condition>> {
    items.into_iter().map(Condition::try_from).collect()
}

impl Condition {
    /// Substitute actor attributes, leaving a constraint over resource fields
    fn partial(&self, actor: &Actor) -> Constraint {
        match self {
            Condition::All(items) => {
                Constraint::All(items.iter().map(|c| c.partial(actor)).collect())
            }
            Condition::Any(items) => {
                Constraint::Any(items.iter().map(|c| c.partial(actor)).collect())
            }
            Condition::Not(inner) => Constraint::negate(inner.partial(actor)),
            Condition::Related {
                relation,
                condition,
            } => Constraint::related(
                relation.clone(),
                condition
                    .as_ref()
                    .map(|c| c.partial(actor))
                    .unwrap_or(Constraint::Always),
            ),
            Condition::Field { field, op, operand } => {
                let value = match operand {
                    Operand::None => Value::Null,
                    Operand::Literal(value) => value.clone(),
                    Operand::Actor(path) => match actor.attribute(path) {
                        Some(value) => value.clone(),
                        // the actor cannot satisfy a comparison it has no value for
                        None => return Constraint::Never,
                    },
                };
                field_constraint(field, *op, value)
            }
        }
    }
}

fn field_constraint(field: &str, op: Operator, value: Value) -> Constraint {
    let list = |value: Value| match value {
        Value::Array(values) => values,
        other => vec![other],
    };
    match op {
        Operator::In => Constraint::In {
            field: field.to_string(),
            values: list(value),
        },
        Operator::NotIn => Constraint::NotIn {
            field: field.to_string(),
            values: list(value),
        },
        Operator::IsNull => Constraint::is_null(field),
        Operator::IsNotNull => Constraint::compare(field, Comparison::Ne, Value::Null),
        other => match other.comparison() {
            Some(comparison) => Constraint::compare(field, comparison, value),
            None => Constraint::Never,
        },
    }
}

impl Rule {
    fn partial(&self, actor: &Actor) -> Option<Constraint> {
        if !self.roles.is_empty() && !actor.has_any_role(&self.roles) {
            return None;
        }
        Some(
            self.condition
                .as_ref()
                .map(|c| c.partial(actor))
                .unwrap_or(Constraint::Always),
        )
    }
}

/// Rules indexed by resource, then by action
type RuleSet = HashMap<String, HashMap<String, Vec<Rule>>>;

fn compile_document(document: PolicyDocument) -> anyhow::Result<RuleSet> {
    let mut rules = RuleSet::new();
    for (resource, actions) in document.resources {
        if !is_valid_identifier(&resource) {
            return Err(parse_error(format!("invalid resource name '{}'", resource)));
        }
        for (action, specs) in actions {
            if action != ACTION_WILDCARD && !is_valid_identifier(&action) {
                return Err(parse_error(format!(
                    "invalid action '{}' on resource '{}'",
                    action, resource
                )));
            }
            let compiled = specs
                .into_iter()
                .map(|spec| {
                    Ok(Rule {
                        roles: spec.roles,
                        condition: spec.when.map(Condition::try_from).transpose()?,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("in rules for {}.{}", resource, action))?;
            rules
                .entry(resource.clone())
                .or_default()
                .entry(action)
                .or_default()
                .extend(compiled);
        }
    }
    Ok(rules)
}

#[derive(Default)]
struct PolicyState {
    rules: RuleSet,
    loaded_files: HashSet<PathBuf>,
}

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Policy engine evaluating YAML rules
pub struct RulePolicy {
    id: u64,
    state: RwLock<PolicyState>,
    classes: RwLock<HashMap<String, ResourceClass>>,
    fetcher: RwLock<Option<Arc<dyn DataFetcher>>>,
    revision: AtomicU64,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            state: RwLock::default(),
            classes: RwLock::default(),
            fetcher: RwLock::default(),
            revision: AtomicU64::default(),
        }
    }
}

impl RulePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine from a single YAML document
    pub fn from_yaml(source: &str) -> anyhow::Result<Self> {
        let policy = Self::new();
        policy.load_str(source)?;
        Ok(policy)
    }

    /// Add the rules of a YAML document to the loaded rules
    pub fn load_str(&self, source: &str) -> anyhow::Result<()> {
        let document: PolicyDocument = serde_yaml::from_str(source)
            .map_err(|e| RowguardError::PolicyParse(e.to_string()))?;
        let compiled = compile_document(document)?;

        let mut state = self.state.write();
        let mut count = 0;
        for (resource, actions) in compiled {
            for (action, rules) in actions {
                count += rules.len();
                state
                    .rules
                    .entry(resource.clone())
                    .or_default()
                    .entry(action)
                    .or_default()
                    .extend(rules);
            }
        }
        drop(state);
        self.revision.fetch_add(1, Ordering::SeqCst);
        info!(rules = count, "loaded policy rules");
        Ok(())
    }

    /// Load rules from a `.yaml`/`.yml` file; each file may be loaded once
    pub fn load_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(extension, "yaml" | "yml") {
            return Err(RowguardError::InvalidPolicyFile(path.display().to_string()).into());
        }
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to open policy file '{}'", path.display()))?;
        // reserved before loading, released on failure
        let reserved = self.state.write().loaded_files.insert(canonical.clone());
        if !reserved {
            return Err(RowguardError::DuplicatePolicyFile(path.display().to_string()).into());
        }
        let loaded = std::fs::read_to_string(&canonical)
            .with_context(|| format!("failed to read policy file '{}'", path.display()))
            .and_then(|source| {
                self.load_str(&source)
                    .with_context(|| format!("in policy file '{}'", path.display()))
            });
        if loaded.is_err() {
            self.state.write().loaded_files.remove(&canonical);
        }
        loaded
    }

    /// Drop every loaded rule and forget which files were loaded
    pub fn clear_rules(&self) {
        let mut state = self.state.write();
        state.rules.clear();
        state.loaded_files.clear();
        drop(state);
        self.revision.fetch_add(1, Ordering::SeqCst);
        debug!("cleared policy rules");
    }

    /// Number of rules currently loaded
    pub fn rule_count(&self) -> usize {
        self.state
            .read()
            .rules
            .values()
            .flat_map(|actions| actions.values())
            .map(Vec::len)
            .sum()
    }

    pub fn class(&self, resource: &str) -> Option<ResourceClass> {
        self.classes.read().get(resource).cloned()
    }
}

#[async_trait]
impl PolicyEngine for RulePolicy {
    fn register_class(&self, class: ResourceClass) -> anyhow::Result<()> {
        let mut classes = self.classes.write();
        if classes.contains_key(&class.name) {
            return Err(RowguardError::DuplicateModel(class.name).into());
        }
        debug!(class = %class.name, fields = class.fields.len(), "registered class");
        classes.insert(class.name.clone(), class);
        Ok(())
    }

    fn is_registered(&self, resource: &str) -> bool {
        self.classes.read().contains_key(resource)
    }

    async fn authorized_constraint(
        &self,
        actor: &Actor,
        action: &str,
        resource: &str,
    ) -> anyhow::Result<Constraint> {
        if !self.is_registered(resource) {
            return Err(RowguardError::UnregisteredClass(resource.to_string()).into());
        }

        let grants: Vec<Constraint> = {
            let state = self.state.read();
            match state.rules.get(resource) {
                Some(actions) => [action, ACTION_WILDCARD]
                    .iter()
                    .filter_map(|key| actions.get(*key))
                    .flatten()
                    .filter_map(|rule| rule.partial(actor))
                    .collect(),
                None => Vec::new(),
            }
        };

        let constraint = Constraint::Any(grants).simplify();
        debug!(resource, action, %constraint, "partial decision");
        Ok(constraint)
    }

    fn set_data_fetcher(&self, fetcher: Arc<dyn DataFetcher>) {
        *self.fetcher.write() = Some(fetcher);
    }

    fn data_fetcher(&self) -> Option<Arc<dyn DataFetcher>> {
        self.fetcher.read().clone()
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}
