//! Ambient session provider
//!
//! `set_get_session` installs a process-wide way to obtain an
//! [`AuthorizedSession`], and teaches the policy engine to resolve
//! relationship constraints for instance checks through it.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parking_lot::RwLock;
use sea_orm::sea_query::{Alias, Expr, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde_json::Value;

use rowguard_auth::{ModelRegistry, constraint_to_condition, json_to_value};
use rowguard_common::RowguardError;
use rowguard_policy::{Constraint, DataFetcher, PolicyEngine};

use crate::session::AuthorizedSession;

pub type GetSession = Arc<dyn Fn() -> anyhow::Result<AuthorizedSession> + Send + Sync>;

static SESSION_PROVIDER: LazyLock<RwLock<Option<GetSession>>> =
    LazyLock::new(|| RwLock::new(None));

/// Install `get_session` as the session provider for `engine`
///
/// Replaces any previously installed provider.
pub fn set_get_session<F>(engine: &dyn PolicyEngine, get_session: F)
where
    F: Fn() -> anyhow::Result<AuthorizedSession> + Send + Sync + 'static,
{
    let provider: GetSession = Arc::new(get_session);
    *SESSION_PROVIDER.write() = Some(provider.clone());
    engine.set_data_fetcher(Arc::new(SessionFetcher::new(provider)));
    tracing::info!("installed session provider");
}

/// A session from the installed provider
pub fn get_session() -> anyhow::Result<AuthorizedSession> {
    let provider = SESSION_PROVIDER.read().clone();
    match provider {
        Some(provider) => provider(),
        None => Err(RowguardError::NoSessionProvider.into()),
    }
}

/// Resolves relationship constraints with a query per check
pub struct SessionFetcher {
    get_session: GetSession,
}

impl SessionFetcher {
    pub fn new(get_session: GetSession) -> Self {
        Self { get_session }
    }
}

#[async_trait]
impl DataFetcher for SessionFetcher {
    async fn related_exists(
        &self,
        resource: &str,
        record: &Value,
        relation: &str,
        constraint: &Constraint,
    ) -> anyhow::Result<bool> {
        let session = (self.get_session)()?;
        related_row_exists(
            session.connection(),
            session.registry(),
            resource,
            record,
            relation,
            constraint,
        )
        .await
    }
}

/// `SELECT target.to FROM target WHERE target.to = <record.from> AND <constraint> LIMIT 1`
async fn related_row_exists(
    db: &DatabaseConnection,
    registry: &ModelRegistry,
    resource: &str,
    record: &Value,
    relation: &str,
    constraint: &Constraint,
) -> anyhow::Result<bool> {
    let model = registry.require(resource)?;
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

    let key = record.get(&rel.from_column).unwrap_or(&Value::Null);
    if key.is_null() {
        return Ok(false);
    }
    let key = json_to_value(&rel.from_column, key)?;
    let condition = constraint_to_condition(constraint, &target, registry)?;

    let to_column = (Alias::new(&target.table), Alias::new(&rel.to_column));
    let query = Query::select()
        .column(to_column.clone())
        .from(Alias::new(&target.table))
        .and_where(Expr::col(to_column).eq(key))
        .cond_where(condition)
        .limit(1)
        .to_owned();

    let statement = db.get_database_backend().build(&query);
    tracing::trace!(resource, relation, sql = %statement, "resolving relationship");
    Ok(db.query_one(statement).await?.is_some())
}
