//! Common test utilities for integration testing
//!
//! This module provides shared test infrastructure including:
//! - Blog entities (users, posts, notes, comments) for sea-orm
//! - TestDatabase: a seeded SQLite database in a temporary directory
//! - Policy fixtures and an engine/registry builder

#![allow(dead_code)]

use std::sync::Arc;

use rowguard::auth::{ModelInfo, ModelRegistry};
use rowguard::policy::{Actor, PolicyEngine, RulePolicy};
use rowguard::session::AuthorizedSessionFactory;
use rowguard::{authorized_sessionmaker, register_models};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, RelationTrait, Schema, Set,
};
use tempfile::TempDir;

pub mod users {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub name: String,
        pub org_id: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::posts::Entity")]
        Posts,
    }

    impl Related<super::posts::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Posts.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod posts {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub title: String,
        pub published: bool,
        pub author_id: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::AuthorId",
            to = "super::users::Column::Id"
        )]
        Author,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Posts whose author may be unknown
pub mod notes {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
    #[sea_orm(table_name = "notes")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub body: String,
        pub author_id: Option<i64>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::AuthorId",
            to = "super::users::Column::Id"
        )]
        Author,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Never registered with the policy engine
pub mod comments {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "comments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub body: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub const BLOG_POLICY: &str = r#"
resources:
  Post:
    read:
      - when: { field: published, value: true }
      - when: { field: author_id, actor: id }
      - roles: [admin]
    update:
      - when: { field: author_id, actor: id }
    delete:
      - roles: [admin]
    "*":
      - roles: [moderator]
        when:
          relation: author
          when: { field: org_id, actor: org_id }
  Note:
    read:
      - when:
          not:
            relation: author
            when: { field: name, value: alice }
  User:
    read:
      - roles: [admin]
      - when:
          relation: posts
          when: { field: published, value: true }
"#;

/// (id, name, org_id)
pub const USERS: [(i64, &str, i64); 3] = [(1, "alice", 1), (2, "bob", 2), (3, "carol", 1)];

/// (id, title, published, author_id)
pub const POSTS: [(i64, &str, bool, i64); 6] = [
    (1, "alice public", true, 1),
    (2, "alice draft", false, 1),
    (3, "bob public", true, 2),
    (4, "bob draft", false, 2),
    (5, "carol draft", false, 3),
    (6, "alice second", true, 1),
];

/// (id, body, author_id)
pub const NOTES: [(i64, &str, Option<i64>); 3] =
    [(1, "orphan", None), (2, "by alice", Some(1)), (3, "by bob", Some(2))];

pub const COMMENTS: [(i64, &str); 2] = [(1, "first"), (2, "second")];

/// Initialise tracing once per test binary, honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Seeded SQLite database living in a temporary directory
pub struct TestDatabase {
    pub connection: Arc<DatabaseConnection>,
    _dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> anyhow::Result<Self> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("rowguard.db").display());
        let db = Database::connect(url).await?;

        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        db.execute(backend.build(&schema.create_table_from_entity(users::Entity)))
            .await?;
        db.execute(backend.build(&schema.create_table_from_entity(posts::Entity)))
            .await?;
        db.execute(backend.build(&schema.create_table_from_entity(notes::Entity)))
            .await?;
        db.execute(backend.build(&schema.create_table_from_entity(comments::Entity)))
            .await?;

        for (id, name, org_id) in USERS {
            users::ActiveModel {
                id: Set(id),
                name: Set(name.to_string()),
                org_id: Set(org_id),
            }
            .insert(&db)
            .await?;
        }
        for (id, title, published, author_id) in POSTS {
            posts::ActiveModel {
                id: Set(id),
                title: Set(title.to_string()),
                published: Set(published),
                author_id: Set(author_id),
            }
            .insert(&db)
            .await?;
        }
        for (id, body, author_id) in NOTES {
            notes::ActiveModel {
                id: Set(id),
                body: Set(body.to_string()),
                author_id: Set(author_id),
            }
            .insert(&db)
            .await?;
        }
        for (id, body) in COMMENTS {
            comments::ActiveModel {
                id: Set(id),
                body: Set(body.to_string()),
            }
            .insert(&db)
            .await?;
        }

        Ok(Self {
            connection: Arc::new(db),
            _dir: dir,
        })
    }
}

pub fn blog_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::of::<users::Entity>()
            .named("User")
            .with_relation("posts", users::Relation::Posts.def())
            .expect("single-column relation"),
        ModelInfo::of::<posts::Entity>()
            .named("Post")
            .with_relation("author", posts::Relation::Author.def())
            .expect("single-column relation"),
        ModelInfo::of::<notes::Entity>()
            .named("Note")
            .with_relation("author", notes::Relation::Author.def())
            .expect("single-column relation"),
    ]
}

/// Engine loaded with [`BLOG_POLICY`] and a registry holding `User`, `Post` and `Note`
pub fn blog_engine() -> (Arc<RulePolicy>, Arc<ModelRegistry>) {
    let engine = Arc::new(RulePolicy::from_yaml(BLOG_POLICY).expect("valid policy"));
    let registry = Arc::new(ModelRegistry::new());
    register_models(&*engine, &registry, blog_models()).expect("fresh registry");
    (engine, registry)
}

/// Factory whose sessions always act as `actor` performing `action`
pub fn factory_for(
    db: &TestDatabase,
    engine: Arc<RulePolicy>,
    registry: Arc<ModelRegistry>,
    actor: Actor,
    action: &str,
) -> AuthorizedSessionFactory {
    let action = action.to_string();
    authorized_sessionmaker(
        db.connection.clone(),
        registry,
        move || engine.clone() as Arc<dyn PolicyEngine>,
        move || actor.clone(),
        move || action.clone(),
    )
}

pub fn ids<M>(models: &[M], id: impl Fn(&M) -> i64) -> Vec<i64> {
    let mut ids: Vec<i64> = models.iter().map(id).collect();
    ids.sort_unstable();
    ids
}
