//! Entities and fixtures shared by the unit tests

use sea_orm::RelationTrait;

use crate::registry::{ModelInfo, ModelRegistry};

pub mod users {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
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

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub title: String,
        pub published: bool,
        pub author_id: i64,
        pub priority: i32,
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

pub const BLOG_POLICY: &str = r#"
resources:
  Post:
    read:
      - when: { field: published, value: true }
      - when: { field: author_id, actor: id }
      - roles: [admin]
    "*":
      - roles: [moderator]
        when:
          relation: author
          when: { field: org_id, actor: org_id }
"#;

/// `User` and `Post` with their relationships declared
pub fn blog_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::of::<users::Entity>()
            .named("User")
            .relationship(
                "posts",
                crate::registry::RelationshipInfo::new("posts", "id", "author_id"),
            ),
        ModelInfo::of::<posts::Entity>()
            .named("Post")
            .with_relation("author", posts::Relation::Author.def())
            .expect("single-column relation"),
    ]
}

pub fn registry_with_blog_models() -> ModelRegistry {
    let registry = ModelRegistry::new();
    for model in blog_models() {
        registry.register(model).expect("fresh registry");
    }
    registry
}
