//! Entities and fixtures shared by the unit tests

use std::sync::Arc;

use rowguard_auth::{ModelInfo, ModelRegistry, RelationshipInfo, register_models};
use rowguard_policy::RulePolicy;

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
    pub enum Relation {}

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
    "*":
      - roles: [moderator]
        when:
          relation: author
          when: { field: org_id, actor: org_id }
"#;

/// Engine loaded with `policy` and a registry holding `User` and `Post`
pub fn setup(policy: &str) -> (Arc<RulePolicy>, Arc<ModelRegistry>) {
    let engine = Arc::new(RulePolicy::from_yaml(policy).expect("valid policy"));
    let registry = Arc::new(ModelRegistry::new());
    register_models(
        &*engine,
        &registry,
        vec![
            ModelInfo::of::<users::Entity>().named("User"),
            ModelInfo::of::<posts::Entity>()
                .named("Post")
                .relationship("author", RelationshipInfo::new("users", "author_id", "id")),
        ],
    )
    .expect("fresh registry");
    (engine, registry)
}
