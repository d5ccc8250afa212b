use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    Protect,
    SetNull,
}

/// Column shape. Relation targets are qualified `app_label.model`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Char { max_length: u32 },
    Text,
    Integer,
    Boolean,
    ForeignKey { to: String, on_delete: OnDelete },
    /// Foreign key into a tree-structured model (parent/child hierarchy).
    TreeForeignKey { to: String, on_delete: OnDelete },
    ManyToMany { to: String },
}

impl FieldKind {
    pub fn relation_target(&self) -> Option<&str> {
        match self {
            FieldKind::ForeignKey { to, .. } | FieldKind::TreeForeignKey { to, .. } | FieldKind::ManyToMany { to } => Some(to),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    #[serde(default)]
    pub db_index: bool,
    #[serde(default)]
    pub null: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self { Self { kind, db_index: false, null: false, default: None } }
    pub fn char(max_length: u32) -> Self { Self::new(FieldKind::Char { max_length }) }
    pub fn text() -> Self { Self::new(FieldKind::Text) }
    pub fn integer() -> Self { Self::new(FieldKind::Integer) }
    pub fn boolean() -> Self { Self::new(FieldKind::Boolean) }
    pub fn foreign_key(to: &str, on_delete: OnDelete) -> Self { Self::new(FieldKind::ForeignKey { to: to.to_string(), on_delete }) }
    pub fn tree_foreign_key(to: &str, on_delete: OnDelete) -> Self { Self::new(FieldKind::TreeForeignKey { to: to.to_string(), on_delete }) }
    pub fn many_to_many(to: &str) -> Self { Self::new(FieldKind::ManyToMany { to: to.to_string() }) }

    pub fn indexed(mut self) -> Self { self.db_index = true; self }
    pub fn nullable(mut self) -> Self { self.null = true; self }
    pub fn with_default(mut self, v: serde_json::Value) -> Self { self.default = Some(v); self }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Field names, `-` prefix for descending.
    #[serde(default)]
    pub ordering: Vec<String>,
    /// Extra `(codename, name)` permissions beyond add/change/delete.
    #[serde(default)]
    pub permissions: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelState {
    pub app_label: String,
    pub name: String,
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    pub options: ModelOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub key: String,
    pub applied_at: DateTime<Utc>,
}

/// Current declared schema plus the ledger of applied migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    pub(crate) models: BTreeMap<String, ModelState>,
    #[serde(default)]
    pub(crate) applied: Vec<AppliedMigration>,
}

pub(crate) fn model_key(app_label: &str, model: &str) -> String {
    format!("{}.{}", app_label, model.to_ascii_lowercase())
}

impl SchemaCatalog {
    pub fn model(&self, app_label: &str, model: &str) -> Option<&ModelState> {
        self.models.get(&model_key(app_label, model))
    }

    pub fn is_applied(&self, key: &str) -> bool { self.applied.iter().any(|m| m.key == key) }

    pub fn applied(&self) -> &[AppliedMigration] { &self.applied }

    /// Names of indexed columns on a model, in field-name order.
    pub fn indexed_fields(&self, app_label: &str, model: &str) -> Vec<&str> {
        self.model(app_label, model)
            .map(|m| m.fields.iter().filter(|(_, f)| f.db_index).map(|(n, _)| n.as_str()).collect())
            .unwrap_or_default()
    }
}
