//! Declarative, versioned schema migrations.
//!
//! A migration is a named list of operations against the schema catalog. The
//! `Migrator` applies migrations in the order given, skips those already in
//! the ledger, and refuses to run one whose dependencies are missing. Each
//! migration is applied to a working copy of the catalog and only committed
//! when every operation succeeds. After commit, the permissions each touched
//! model declares are registered on its content type.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::info;

use crate::error::AppError;
use crate::storage::Store;

mod catalog;
mod operations;
pub mod inventory;

pub use catalog::{AppliedMigration, FieldDef, FieldKind, ModelOptions, ModelState, OnDelete, SchemaCatalog};
pub use operations::Operation;

/// Permissions every model gets, as `(codename prefix, verb)`.
const DEFAULT_PERMISSIONS: [(&str, &str); 3] = [("add", "add"), ("change", "change"), ("delete", "delete")];

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration {migration} depends on {dependency}, which has not been applied")]
    MissingDependency { migration: String, dependency: String },
    #[error("unknown model {0}")]
    UnknownModel(String),
    #[error("model {0} already exists")]
    DuplicateModel(String),
    #[error("unknown field {model}.{field}")]
    UnknownField { model: String, field: String },
    #[error("field {model}.{field} already exists")]
    DuplicateField { model: String, field: String },
    #[error("non-nullable field {model}.{field} needs a default for existing rows")]
    MissingDefault { model: String, field: String },
    #[error("in migration {migration}: {source}")]
    Operation { migration: String, #[source] source: Box<MigrationError> },
    #[error("registering permissions: {0}")]
    Store(#[from] AppError),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub app_label: &'static str,
    pub name: &'static str,
    /// `(app_label, name)` pairs that must already be applied.
    pub dependencies: Vec<(&'static str, &'static str)>,
    pub operations: Vec<Operation>,
}

impl Migration {
    pub fn key(&self) -> String { format!("{}.{}", self.app_label, self.name) }
}

pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(migrations: Vec<Migration>) -> Self { Self { migrations } }

    /// Every migration this repository ships, in application order.
    pub fn bundled() -> Self { Self::new(inventory::migrations()) }

    pub fn pending(&self, catalog: &SchemaCatalog) -> Vec<&Migration> {
        self.migrations.iter().filter(|m| !catalog.is_applied(&m.key())).collect()
    }

    /// Apply pending migrations; returns the keys applied by this call.
    pub fn apply(&self, store: &mut Store) -> Result<Vec<String>, MigrationError> {
        let mut applied = Vec::new();
        for m in self.migrations.iter() {
            let key = m.key();
            if store.catalog().is_applied(&key) {
                continue;
            }
            for (app, name) in m.dependencies.iter() {
                let dep = format!("{app}.{name}");
                if !store.catalog().is_applied(&dep) {
                    return Err(MigrationError::MissingDependency { migration: key, dependency: dep });
                }
            }
            let mut working = store.catalog().clone();
            for op in m.operations.iter() {
                op.apply(m.app_label, &mut working)
                    .map_err(|e| MigrationError::Operation { migration: key.clone(), source: Box::new(e) })?;
            }
            working.applied.push(AppliedMigration { key: key.clone(), applied_at: Utc::now() });
            *store.catalog_mut() = working;
            register_permissions(store, m)?;
            info!(target: "lims::migrations", migration = %key, operations = m.operations.len(), "applied");
            applied.push(key);
        }
        Ok(applied)
    }
}

/// Create the content type and permissions of every model a migration touched.
fn register_permissions(store: &mut Store, m: &Migration) -> Result<(), AppError> {
    let touched: BTreeSet<String> = m
        .operations
        .iter()
        .map(|op| match op {
            Operation::CreateModel { name, .. } | Operation::AlterModelOptions { name, .. } => name.to_ascii_lowercase(),
            Operation::AddField { model, .. } | Operation::AlterField { model, .. } => model.to_ascii_lowercase(),
        })
        .collect();
    for model in touched {
        let Some(state) = store.catalog().model(m.app_label, &model).cloned() else { continue; };
        let ct = store.ensure_content_type(m.app_label, &state.name);
        for (prefix, verb) in DEFAULT_PERMISSIONS {
            store.ensure_permission(ct, &format!("{prefix}_{}", state.name), &format!("Can {verb} {}", state.name))?;
        }
        for (codename, name) in state.options.permissions.iter() {
            store.ensure_permission(ct, codename, name)?;
        }
    }
    Ok(())
}
