use std::collections::BTreeMap;

use super::catalog::{model_key, FieldDef, ModelOptions, ModelState, SchemaCatalog};
use super::MigrationError;

/// One declarative schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateModel { name: String, fields: Vec<(String, FieldDef)>, options: ModelOptions },
    AlterModelOptions { name: String, options: ModelOptions },
    AddField { model: String, name: String, field: FieldDef },
    /// Replace a field's definition. With `preserve_default == false` the
    /// default only backfills existing rows and is not kept on the field.
    AlterField { model: String, name: String, field: FieldDef, preserve_default: bool },
}

impl Operation {
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateModel { name, .. } => format!("Create model {name}"),
            Operation::AlterModelOptions { name, .. } => format!("Change Meta options on {name}"),
            Operation::AddField { model, name, .. } => format!("Add field {name} to {model}"),
            Operation::AlterField { model, name, .. } => format!("Alter field {name} on {model}"),
        }
    }

    pub(crate) fn apply(&self, app_label: &str, catalog: &mut SchemaCatalog) -> Result<(), MigrationError> {
        match self {
            Operation::CreateModel { name, fields, options } => {
                let key = model_key(app_label, name);
                if catalog.models.contains_key(&key) {
                    return Err(MigrationError::DuplicateModel(key));
                }
                for (_, f) in fields {
                    check_relation(app_label, catalog, f, Some(&key))?;
                }
                let state = ModelState {
                    app_label: app_label.to_string(),
                    name: name.to_ascii_lowercase(),
                    fields: fields.iter().cloned().collect::<BTreeMap<_, _>>(),
                    options: options.clone(),
                };
                catalog.models.insert(key, state);
            }
            Operation::AlterModelOptions { name, options } => {
                let m = model_mut(app_label, catalog, name)?;
                m.options = options.clone();
            }
            Operation::AddField { model, name, field } => {
                check_relation(app_label, catalog, field, None)?;
                let m = model_mut(app_label, catalog, model)?;
                if m.fields.contains_key(name) {
                    return Err(MigrationError::DuplicateField { model: model_key(app_label, model), field: name.clone() });
                }
                if !field.null && field.default.is_none() {
                    return Err(MigrationError::MissingDefault { model: model_key(app_label, model), field: name.clone() });
                }
                m.fields.insert(name.clone(), field.clone());
            }
            Operation::AlterField { model, name, field, preserve_default } => {
                check_relation(app_label, catalog, field, None)?;
                let m = model_mut(app_label, catalog, model)?;
                let Some(slot) = m.fields.get_mut(name) else {
                    return Err(MigrationError::UnknownField { model: model_key(app_label, model), field: name.clone() });
                };
                let mut next = field.clone();
                if !preserve_default {
                    next.default = None;
                }
                *slot = next;
            }
        }
        Ok(())
    }
}

fn model_mut<'a>(app_label: &str, catalog: &'a mut SchemaCatalog, name: &str) -> Result<&'a mut ModelState, MigrationError> {
    let key = model_key(app_label, name);
    catalog.models.get_mut(&key).ok_or(MigrationError::UnknownModel(key))
}

/// Relations inside the migrating app must point at a known model
/// (or at the model being created). Targets in other apps are external.
fn check_relation(app_label: &str, catalog: &SchemaCatalog, field: &FieldDef, creating: Option<&str>) -> Result<(), MigrationError> {
    let Some(target) = field.kind.relation_target() else { return Ok(()); };
    let Some((app, model)) = target.split_once('.') else {
        return Err(MigrationError::UnknownModel(target.to_string()));
    };
    if app != app_label {
        return Ok(());
    }
    let key = model_key(app, model);
    if catalog.models.contains_key(&key) || creating == Some(key.as_str()) {
        Ok(())
    } else {
        Err(MigrationError::UnknownModel(key))
    }
}
