//! Session factory

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use rowguard_auth::ModelRegistry;
use rowguard_common::DEFAULT_ACTION;
use rowguard_policy::{Actor, PolicyEngine};

use crate::cache::DecisionCache;
use crate::config::AuthorizationConfig;
use crate::session::AuthorizedSession;

pub type EngineProvider = Arc<dyn Fn() -> Arc<dyn PolicyEngine> + Send + Sync>;
pub type ActorProvider = Arc<dyn Fn() -> Actor + Send + Sync>;
pub type ActionProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Builds [`AuthorizedSession`]s for whoever the providers report at call time
#[derive(Clone)]
pub struct AuthorizedSessionFactory {
    db: Arc<DatabaseConnection>,
    registry: Arc<ModelRegistry>,
    get_engine: EngineProvider,
    get_actor: ActorProvider,
    get_action: ActionProvider,
    default_action: String,
    checked_actions: Arc<HashMap<String, String>>,
    cache: Option<DecisionCache>,
    strict: bool,
}

/// Create a factory of authorization-enforcing sessions
///
/// The engine, actor and action callbacks run on every
/// [`AuthorizedSessionFactory::session`] call, so they can read per-request
/// state. An empty action falls back to the configured default action.
pub fn authorized_sessionmaker<GE, GA, GC>(
    db: Arc<DatabaseConnection>,
    registry: Arc<ModelRegistry>,
    get_engine: GE,
    get_actor: GA,
    get_action: GC,
) -> AuthorizedSessionFactory
where
    GE: Fn() -> Arc<dyn PolicyEngine> + Send + Sync + 'static,
    GA: Fn() -> Actor + Send + Sync + 'static,
    GC: Fn() -> String + Send + Sync + 'static,
{
    AuthorizedSessionFactory {
        db,
        registry,
        get_engine: Arc::new(get_engine),
        get_actor: Arc::new(get_actor),
        get_action: Arc::new(get_action),
        default_action: DEFAULT_ACTION.to_string(),
        checked_actions: Arc::new(HashMap::new()),
        cache: Some(DecisionCache::default()),
        strict: true,
    }
}

impl AuthorizedSessionFactory {
    /// Apply strictness, default action and cache settings
    pub fn with_config(mut self, config: &AuthorizationConfig) -> Self {
        self.default_action = config.default_action();
        self.strict = config.is_strict();
        self.cache = config
            .cache_enabled()
            .then(|| DecisionCache::from_config(config));
        self
    }

    /// Check `action` instead of the session action for `resource`
    pub fn with_checked_action(
        mut self,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.checked_actions).insert(resource.into(), action.into());
        self
    }

    pub fn session(&self) -> AuthorizedSession {
        let engine = (self.get_engine)();
        let actor = (self.get_actor)();
        let mut action = (self.get_action)();
        if action.is_empty() {
            action = self.default_action.clone();
        }
        tracing::trace!(action = %action, roles = ?actor.roles, "opening authorized session");

        AuthorizedSession::new(
            self.db.clone(),
            self.registry.clone(),
            engine,
            actor,
            action,
        )
        .with_checked_actions(self.checked_actions.clone())
        .with_cache(self.cache.clone())
        .with_strict(self.strict)
    }

    /// Drop every cached decision
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }
}
