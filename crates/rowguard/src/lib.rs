//! Rowguard - row-level authorization for sea-orm
//!
//! Register entity models with a policy engine, then open sessions whose
//! queries only ever return the rows the current actor may act on:
//!
//! ```ignore
//! use rowguard::{authorized_sessionmaker, register_models, set_get_session};
//!
//! register_models(&*engine, &registry, [ModelInfo::of::<post::Entity>().named("Post")])?;
//! let factory = authorized_sessionmaker(db, registry, get_engine, current_actor, || "read".into());
//! let posts = factory.session().all::<post::Entity>().await?;
//! ```

pub use rowguard_auth as auth;
pub use rowguard_common as common;
pub use rowguard_policy as policy;
pub use rowguard_session as session;

pub use rowguard_auth::register_models;
pub use rowguard_session::{authorized_sessionmaker, set_get_session};

/// Package version
pub const VERSION: &str = "0.5.0-alpha";

/// Names this package exports at its root
pub const EXPORTS: [&str; 3] = [
    "register_models",
    "authorized_sessionmaker",
    "set_get_session",
];
