//! Authorized session
//!
//! Wraps a database connection and filters every query on a registered
//! entity down to the rows the session's actor may act on.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{
    Condition, DatabaseConnection, DeleteMany, EntityTrait, FromQueryResult,
    PaginatorTrait, PrimaryKeyTrait, QueryFilter, Select, UpdateMany,
};
use serde::Serialize;

use rowguard_auth::{ModelInfo, ModelRegistry, constraint_to_condition};
use rowguard_common::RowguardError;
use rowguard_policy::{Actor, Constraint, PolicyEngine};

use crate::cache::DecisionCache;

/// Session bound to one actor and one action
#[derive(Clone)]
pub struct AuthorizedSession {
    db: Arc<DatabaseConnection>,
    registry: Arc<ModelRegistry>,
    engine: Arc<dyn PolicyEngine>,
    actor: Actor,
    action: String,
    checked_actions: Arc<HashMap<String, String>>,
    cache: Option<DecisionCache>,
    strict: bool,
}

impl AuthorizedSession {
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Arc<ModelRegistry>,
        engine: Arc<dyn PolicyEngine>,
        actor: Actor,
        action: impl Into<String>,
    ) -> Self {
        Self {
            db,
            registry,
            engine,
            actor,
            action: action.into(),
            checked_actions: Arc::new(HashMap::new()),
            cache: None,
            strict: true,
        }
    }

    pub(crate) fn with_checked_actions(mut self, checked: Arc<HashMap<String, String>>) -> Self {
        self.checked_actions = checked;
        self
    }

    pub(crate) fn with_cache(mut self, cache: Option<DecisionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub(crate) fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Same actor and configuration, different action
    pub fn with_action(&self, action: impl Into<String>) -> Self {
        let mut session = self.clone();
        session.action = action.into();
        session
    }

    /// The underlying connection, without any authorization filtering
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn PolicyEngine> {
        &self.engine
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Action checked for `resource`: a per-resource override or the session action
    pub fn action_for(&self, resource: &str) -> &str {
        self.checked_actions
            .get(resource)
            .map(String::as_str)
            .unwrap_or(&self.action)
    }

    /// Registered model for an entity; `None` only outside strict mode
    fn model_for<E: EntityTrait>(&self) -> anyhow::Result<Option<Arc<ModelInfo>>> {
        match self.registry.get_entity::<E>() {
            Some(model) => Ok(Some(model)),
            None => {
                let table = E::default().table_name().to_string();
                if self.strict {
                    Err(RowguardError::ModelNotRegistered(table).into())
                } else {
                    tracing::warn!(table = %table, "entity not registered, query is not filtered");
                    Ok(None)
                }
            }
        }
    }

    /// Simplified partial decision for `resource`, cached when enabled
    pub async fn constraint_for(&self, resource: &str) -> anyhow::Result<Constraint> {
        let action = self.action_for(resource);
        let key = self
            .cache
            .as_ref()
            .map(|_| DecisionCache::key(&self.actor, action, resource, &*self.engine));

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if let Some(constraint) = cache.get(key) {
                tracing::trace!(resource, action, "decision cache hit");
                return Ok(constraint);
            }
        }

        let constraint = self
            .engine
            .authorized_constraint(&self.actor, action, resource)
            .await?
            .simplify();
        tracing::debug!(resource, action, %constraint, "authorized constraint");

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, constraint.clone());
        }
        Ok(constraint)
    }

    /// Filter selecting the rows of `E` this session may act on
    pub async fn filter_for<E: EntityTrait>(&self) -> anyhow::Result<Condition> {
        let Some(model) = self.model_for::<E>()? else {
            return Ok(Condition::all());
        };
        let constraint = self.constraint_for(&model.resource).await?;
        constraint_to_condition(&constraint, &model, &self.registry)
    }

    /// Restrict an existing select to authorized rows
    pub async fn authorize<E: EntityTrait>(&self, select: Select<E>) -> anyhow::Result<Select<E>> {
        Ok(select.filter(self.filter_for::<E>().await?))
    }

    /// `E::find()` restricted to authorized rows
    pub async fn find<E: EntityTrait>(&self) -> anyhow::Result<Select<E>> {
        self.authorize(E::find()).await
    }

    pub async fn all<E: EntityTrait>(&self) -> anyhow::Result<Vec<E::Model>> {
        Ok(self.find::<E>().await?.all(self.connection()).await?)
    }

    /// Fetch by primary key; an unauthorized row is reported as missing
    pub async fn find_by_id<E, T>(&self, id: T) -> anyhow::Result<Option<E::Model>>
    where
        E: EntityTrait,
        T: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        let select = self.authorize(E::find_by_id(id)).await?;
        Ok(select.one(self.connection()).await?)
    }

    pub async fn count<E>(&self) -> anyhow::Result<u64>
    where
        E: EntityTrait,
        E::Model: FromQueryResult + Send + Sync,
    {
        Ok(self.find::<E>().await?.count(self.connection()).await?)
    }

    /// Run a bulk update over authorized rows only, returning rows affected
    pub async fn update_many<E: EntityTrait>(&self, update: UpdateMany<E>) -> anyhow::Result<u64> {
        let condition = self.filter_for::<E>().await?;
        let result = update.filter(condition).exec(self.connection()).await?;
        Ok(result.rows_affected)
    }

    /// Run a bulk delete over authorized rows only, returning rows affected
    pub async fn delete_many<E: EntityTrait>(&self, delete: DeleteMany<E>) -> anyhow::Result<u64> {
        let condition = self.filter_for::<E>().await?;
        let result = delete.filter(condition).exec(self.connection()).await?;
        Ok(result.rows_affected)
    }

    /// Check one loaded model instance against the policy
    ///
    /// Agrees with [`AuthorizedSession::filter_for`]: the instance is allowed
    /// exactly when the query filter would have returned it.
    pub async fn is_allowed<E>(&self, model: &E::Model) -> anyhow::Result<bool>
    where
        E: EntityTrait,
        E::Model: Serialize,
    {
        let Some(info) = self.model_for::<E>()? else {
            return Ok(true);
        };
        let record = serde_json::to_value(model)?;
        let constraint = self.constraint_for(&info.resource).await?;
        let fetcher = self.engine.data_fetcher();
        let decision = constraint
            .evaluate(&info.resource, &record, fetcher.as_deref())
            .await?;
        Ok(decision == Some(true))
    }
}

impl std::fmt::Debug for AuthorizedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedSession")
            .field("actor", &self.actor)
            .field("action", &self.action)
            .field("checked_actions", &self.checked_actions)
            .field("cached", &self.cache.is_some())
            .field("strict", &self.strict)
            .finish()
    }
}
