//! Rowguard Session - Authorization-enforcing database sessions
//!
//! This crate provides:
//! - `AuthorizedSession`: query helpers that only ever see authorized rows
//! - `authorized_sessionmaker`: a factory reading actor and action per session
//! - `set_get_session`: the ambient session provider used for instance checks
//! - `AuthorizationConfig` and the decision cache

pub mod cache;
pub mod config;
pub mod factory;
pub mod hook;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::DecisionCache;
pub use config::AuthorizationConfig;
pub use factory::{AuthorizedSessionFactory, authorized_sessionmaker};
pub use hook::{GetSession, SessionFetcher, get_session, set_get_session};
pub use session::AuthorizedSession;
