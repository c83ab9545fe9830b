//! Model registry
//!
//! Maps policy resource names to the tables, columns and relationships the
//! rewriter needs to build query filters.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::sea_query::TableRef;
use sea_orm::{EntityTrait, IdenStatic, Identity, Iterable, RelationDef};
use serde::{Deserialize, Serialize};

use rowguard_common::{RowguardError, is_valid_identifier};
use rowguard_policy::ResourceClass;

/// A single-column link from one model's table to another's
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub target_table: String,
    /// Column on the owning model's table
    pub from_column: String,
    /// Column on the target table
    pub to_column: String,
}

impl RelationshipInfo {
    pub fn new(
        target_table: impl Into<String>,
        from_column: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            target_table: target_table.into(),
            from_column: from_column.into(),
            to_column: to_column.into(),
        }
    }
}

/// Everything the rewriter knows about one registered model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub resource: String,
    pub table: String,
    pub fields: BTreeSet<String>,
    pub relationships: BTreeMap<String, RelationshipInfo>,
}

impl ModelInfo {
    pub fn new(resource: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            table: table.into(),
            fields: BTreeSet::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Describe a sea-orm entity: its table and every column
    ///
    /// The resource name defaults to the table name.
    pub fn of<E: EntityTrait>() -> Self {
        let table = E::default().table_name().to_string();
        let fields = E::Column::iter()
            .map(|column| column.as_str().to_string())
            .collect();
        Self {
            resource: table.clone(),
            table,
            fields,
            relationships: BTreeMap::new(),
        }
    }

    /// Use a resource name other than the table name
    pub fn named(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into());
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, info: RelationshipInfo) -> Self {
        self.relationships.insert(name.into(), info);
        self
    }

    /// Declare a relationship from a sea-orm relation definition
    pub fn with_relation(self, name: impl Into<String>, def: RelationDef) -> anyhow::Result<Self> {
        let name = name.into();
        let unsupported = |reason: &str| RowguardError::UnsupportedRelationship {
            model: self.resource.clone(),
            relation: name.clone(),
            reason: reason.to_string(),
        };

        let target_table = match &def.to_tbl {
            TableRef::Table(table) | TableRef::SchemaTable(_, table) => table.to_string(),
            _ => return Err(unsupported("target is not a plain table").into()),
        };
        let from_column = match &def.from_col {
            Identity::Unary(column) => column.to_string(),
            _ => return Err(unsupported("composite keys are not supported").into()),
        };
        let to_column = match &def.to_col {
            Identity::Unary(column) => column.to_string(),
            _ => return Err(unsupported("composite keys are not supported").into()),
        };

        Ok(self.relationship(
            name,
            RelationshipInfo {
                target_table,
                from_column,
                to_column,
            },
        ))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// What the policy engine is told about this model
    pub fn resource_class(&self, registry: &ModelRegistry) -> ResourceClass {
        let mut class = ResourceClass::new(&self.resource);
        class.fields = self.fields.clone();
        for (name, rel) in &self.relationships {
            let target = registry
                .resource_for_table(&rel.target_table)
                .unwrap_or_else(|| rel.target_table.clone());
            class.relations.insert(name.clone(), target);
        }
        class
    }
}

/// Concurrent registry of models keyed by resource name
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelInfo>>,
    tables: DashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `model` could be registered right now
    pub fn validate(&self, model: &ModelInfo) -> anyhow::Result<()> {
        if !is_valid_identifier(&model.resource) {
            return Err(RowguardError::ConfigError(format!(
                "invalid resource name '{}'",
                model.resource
            ))
            .into());
        }
        if self.tables.contains_key(&model.table) || self.models.contains_key(&model.resource) {
            return Err(RowguardError::DuplicateModel(model.resource.clone()).into());
        }
        Ok(())
    }

    pub fn register(&self, model: ModelInfo) -> anyhow::Result<Arc<ModelInfo>> {
        self.validate(&model)?;

        let model = Arc::new(model);
        self.tables
            .insert(model.table.clone(), model.resource.clone());
        self.models.insert(model.resource.clone(), model.clone());
        Ok(model)
    }

    /// Unregister a model and its table
    pub fn remove(&self, resource: &str) -> Option<Arc<ModelInfo>> {
        let (_, model) = self.models.remove(resource)?;
        self.tables.remove(&model.table);
        Some(model)
    }

    pub fn get(&self, resource: &str) -> Option<Arc<ModelInfo>> {
        self.models.get(resource).map(|entry| entry.value().clone())
    }

    /// Look up a model, failing with `ModelNotRegistered`
    pub fn require(&self, resource: &str) -> anyhow::Result<Arc<ModelInfo>> {
        self.get(resource)
            .ok_or_else(|| RowguardError::ModelNotRegistered(resource.to_string()).into())
    }

    pub fn resource_for_table(&self, table: &str) -> Option<String> {
        self.tables.get(table).map(|entry| entry.value().clone())
    }

    pub fn get_by_table(&self, table: &str) -> Option<Arc<ModelInfo>> {
        let resource = self.resource_for_table(table)?;
        self.get(&resource)
    }

    /// Model registered for a sea-orm entity, found through its table name
    pub fn get_entity<E: EntityTrait>(&self) -> Option<Arc<ModelInfo>> {
        self.get_by_table(E::default().table_name())
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.models.contains_key(resource)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Registered resource names, sorted
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{posts, users};
    use sea_orm::RelationTrait;

    #[test]
    fn test_model_info_of_entity() {
        let info = ModelInfo::of::<posts::Entity>();
        assert_eq!(info.resource, "posts");
        assert_eq!(info.table, "posts");
        for column in ["id", "title", "published", "author_id", "priority"] {
            assert!(info.has_field(column), "missing column {}", column);
        }
        assert!(!info.has_field("secret"));
        assert!(info.relationships.is_empty());
    }

    #[test]
    fn test_with_relation_belongs_to() {
        let info = ModelInfo::of::<posts::Entity>()
            .with_relation("author", posts::Relation::Author.def())
            .unwrap();
        assert_eq!(
            info.relationships.get("author"),
            Some(&RelationshipInfo::new("users", "author_id", "id"))
        );
    }

    #[test]
    fn test_with_relation_has_many() {
        let info = ModelInfo::of::<users::Entity>()
            .named("User")
            .with_relation("posts", users::Relation::Posts.def())
            .unwrap();
        assert_eq!(info.resource, "User");
        assert_eq!(
            info.relationships.get("posts"),
            Some(&RelationshipInfo::new("posts", "id", "author_id"))
        );
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ModelRegistry::new();
        registry.register(ModelInfo::of::<users::Entity>()).unwrap();
        registry
            .register(ModelInfo::of::<posts::Entity>().named("Post"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Post"));
        assert_eq!(registry.resource_for_table("posts"), Some("Post".to_string()));
        assert_eq!(registry.get_by_table("posts").unwrap().resource, "Post");
        assert_eq!(registry.get_entity::<users::Entity>().unwrap().table, "users");
        assert_eq!(registry.resources(), vec!["Post".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_register_duplicate() {
        let registry = ModelRegistry::new();
        registry.register(ModelInfo::of::<posts::Entity>()).unwrap();

        let err = registry
            .register(ModelInfo::of::<posts::Entity>())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<RowguardError>(),
            Some(&RowguardError::DuplicateModel("posts".to_string()))
        );

        // same table under another name is also a duplicate
        assert!(
            registry
                .register(ModelInfo::of::<posts::Entity>().named("Post"))
                .is_err()
        );
    }

    #[test]
    fn test_validate_and_remove() {
        let registry = ModelRegistry::new();
        let invalid = ModelInfo::new("bad name", "drafts");
        assert!(matches!(
            registry.validate(&invalid).unwrap_err().downcast_ref::<RowguardError>(),
            Some(RowguardError::ConfigError(_))
        ));

        let post = ModelInfo::of::<posts::Entity>().named("Post");
        registry.validate(&post).unwrap();
        registry.register(post.clone()).unwrap();
        assert!(registry.validate(&post).is_err());

        assert_eq!(registry.remove("Post").unwrap().table, "posts");
        assert!(registry.remove("Post").is_none());
        assert_eq!(registry.resource_for_table("posts"), None);
        registry.validate(&post).unwrap();
    }

    #[test]
    fn test_require_missing() {
        let registry = ModelRegistry::new();
        let err = registry.require("ghosts").unwrap_err();
        assert_eq!(
            err.downcast_ref::<RowguardError>(),
            Some(&RowguardError::ModelNotRegistered("ghosts".to_string()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resource_class_resolves_targets() {
        let registry = ModelRegistry::new();
        registry
            .register(ModelInfo::of::<users::Entity>().named("User"))
            .unwrap();
        let posts = ModelInfo::of::<posts::Entity>()
            .with_relation("author", posts::Relation::Author.def())
            .unwrap()
            .relationship("editor", RelationshipInfo::new("editors", "editor_id", "id"));

        let class = posts.resource_class(&registry);
        assert_eq!(class.name, "posts");
        assert!(class.has_field("author_id"));
        assert_eq!(class.relations.get("author"), Some(&"User".to_string()));
        // unregistered target falls back to the table name
        assert_eq!(class.relations.get("editor"), Some(&"editors".to_string()));
    }
}
