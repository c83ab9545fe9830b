//! Registration and query authorization entry points

use std::collections::HashSet;

use sea_orm::Condition;

use rowguard_common::RowguardError;
use rowguard_policy::{Actor, PolicyEngine};

use crate::registry::{ModelInfo, ModelRegistry};
use crate::rewriter::constraint_to_condition;

/// Register models with both the registry and the policy engine
///
/// The whole batch is validated before anything is registered, and a failure
/// part way through unregisters the models already added, so a failed batch
/// leaves the registry as it was. Returns how many models were registered.
pub fn register_models(
    engine: &dyn PolicyEngine,
    registry: &ModelRegistry,
    models: impl IntoIterator<Item = ModelInfo>,
) -> anyhow::Result<usize> {
    let models: Vec<ModelInfo> = models.into_iter().collect();

    let mut resources = HashSet::new();
    let mut tables = HashSet::new();
    for model in &models {
        registry.validate(model)?;
        let duplicate = engine.is_registered(&model.resource)
            || !resources.insert(model.resource.as_str())
            || !tables.insert(model.table.as_str());
        if duplicate {
            return Err(RowguardError::DuplicateModel(model.resource.clone()).into());
        }
    }

    let mut registered = Vec::with_capacity(models.len());
    for model in models {
        match registry.register(model) {
            Ok(model) => registered.push(model),
            Err(err) => {
                // a concurrent registration won the race
                for model in &registered {
                    registry.remove(&model.resource);
                }
                return Err(err);
            }
        }
    }

    // Classes go to the engine once every target table is resolvable
    for model in &registered {
        engine.register_class(model.resource_class(registry))?;
        tracing::info!(
            resource = %model.resource,
            table = %model.table,
            fields = model.fields.len(),
            relationships = model.relationships.len(),
            "registered model"
        );
    }

    Ok(registered.len())
}

/// Build the filter selecting the rows of `resource` the actor may act on
pub async fn authorize_model(
    engine: &dyn PolicyEngine,
    registry: &ModelRegistry,
    actor: &Actor,
    action: &str,
    resource: &str,
) -> anyhow::Result<Condition> {
    let model = registry.require(resource)?;
    let constraint = engine
        .authorized_constraint(actor, action, resource)
        .await?
        .simplify();
    tracing::debug!(resource, action, %constraint, "authorized constraint");

    constraint_to_condition(&constraint, &model, registry)
}
