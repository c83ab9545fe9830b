//! Policy engine abstraction
//!
//! The engine is an external collaborator: anything that can turn
//! `(actor, action, resource type)` into a [`Constraint`] can drive the
//! rewriter and the authorized session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rowguard_common::RowguardError;

use crate::actor::Actor;
use crate::constraint::Constraint;

/// What a policy engine learns about a registered resource type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClass {
    pub name: String,
    pub fields: BTreeSet<String>,
    /// Relation name to target resource name
    pub relations: BTreeMap<String, String>,
}

impl ResourceClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into());
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(relation.into(), target.into());
        self
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(field)
    }
}

/// Resolves relationship constraints against stored data
///
/// Installed on an engine so instance checks can follow relationships the
/// same way the query filter does.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Whether some row related to `record` through `relation` satisfies `constraint`
    async fn related_exists(
        &self,
        resource: &str,
        record: &Value,
        relation: &str,
        constraint: &Constraint,
    ) -> anyhow::Result<bool>;
}

/// Policy decision client
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Make a resource type known to the engine
    fn register_class(&self, class: ResourceClass) -> anyhow::Result<()>;

    fn is_registered(&self, resource: &str) -> bool;

    /// Partially evaluate the policy for every row of `resource`
    async fn authorized_constraint(
        &self,
        actor: &Actor,
        action: &str,
        resource: &str,
    ) -> anyhow::Result<Constraint>;

    fn set_data_fetcher(&self, fetcher: Arc<dyn DataFetcher>);

    fn data_fetcher(&self) -> Option<Arc<dyn DataFetcher>>;

    /// Unique per engine instance, so decisions cached for one engine are
    /// never served for another
    fn instance_id(&self) -> u64;

    /// Changes whenever the loaded policy changes
    fn revision(&self) -> u64 {
        0
    }

    /// Decide for one concrete record
    async fn is_allowed(
        &self,
        actor: &Actor,
        action: &str,
        resource: &str,
        record: &Value,
    ) -> anyhow::Result<bool> {
        let constraint = self
            .authorized_constraint(actor, action, resource)
            .await?
            .simplify();
        let fetcher = self.data_fetcher();
        let decision = constraint
            .evaluate(resource, record, fetcher.as_deref())
            .await?;
        Ok(decision == Some(true))
    }

    /// Like [`PolicyEngine::is_allowed`] but fails with `AccessDenied`
    async fn authorize(
        &self,
        actor: &Actor,
        action: &str,
        resource: &str,
        record: &Value,
    ) -> anyhow::Result<()> {
        if self.is_allowed(actor, action, resource, record).await? {
            Ok(())
        } else {
            tracing::warn!(resource, action, "access denied");
            Err(RowguardError::AccessDenied(format!("{} on {}", action, resource)).into())
        }
    }
}
