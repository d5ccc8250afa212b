//! Inventory schema history.

use serde_json::json;

use super::{FieldDef, Migration, ModelOptions, OnDelete, Operation};

pub const APP_LABEL: &str = "inventory";

fn fields(list: Vec<(&str, FieldDef)>) -> Vec<(String, FieldDef)> {
    list.into_iter().map(|(n, f)| (n.to_string(), f)).collect()
}

fn view_options(codename: &str, name: &str) -> ModelOptions {
    ModelOptions { ordering: vec!["-id".to_string()], permissions: vec![(codename.to_string(), name.to_string())] }
}

pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            app_label: APP_LABEL,
            name: "0001_inventory_initial",
            dependencies: vec![],
            operations: vec![
                Operation::CreateModel {
                    name: "location".into(),
                    fields: fields(vec![
                        ("name", FieldDef::char(100)),
                        ("code", FieldDef::char(6).nullable()),
                        ("parent", FieldDef::foreign_key("inventory.location", OnDelete::Cascade).nullable()),
                    ]),
                    options: ModelOptions::default(),
                },
                Operation::CreateModel {
                    name: "amountmeasure".into(),
                    fields: fields(vec![("name", FieldDef::char(100)), ("symbol", FieldDef::char(10))]),
                    options: ModelOptions::default(),
                },
                Operation::CreateModel {
                    name: "item".into(),
                    fields: fields(vec![
                        ("identifier", FieldDef::char(20).nullable()),
                        ("name", FieldDef::char(200)),
                        ("description", FieldDef::text().nullable()),
                        ("location", FieldDef::foreign_key("inventory.location", OnDelete::SetNull).nullable()),
                        ("amount_available", FieldDef::integer()),
                        ("amount_measure", FieldDef::foreign_key("inventory.amountmeasure", OnDelete::Protect)),
                        ("added_by", FieldDef::foreign_key("auth.user", OnDelete::Protect)),
                    ]),
                    options: ModelOptions::default(),
                },
                Operation::CreateModel {
                    name: "itemproperty".into(),
                    fields: fields(vec![
                        ("item", FieldDef::foreign_key("inventory.item", OnDelete::Cascade)),
                        ("name", FieldDef::char(200)),
                        ("value", FieldDef::text()),
                    ]),
                    options: ModelOptions::default(),
                },
                Operation::CreateModel {
                    name: "set".into(),
                    fields: fields(vec![
                        ("name", FieldDef::char(40)),
                        ("is_public", FieldDef::boolean().with_default(json!(false))),
                        ("is_partset", FieldDef::boolean().with_default(json!(false))),
                        ("items", FieldDef::many_to_many("inventory.item")),
                    ]),
                    options: ModelOptions::default(),
                },
            ],
        },
        Migration {
            app_label: APP_LABEL,
            name: "0002_location_tree_and_view_permissions",
            dependencies: vec![(APP_LABEL, "0001_inventory_initial")],
            operations: vec![
                Operation::AlterModelOptions { name: "amountmeasure".into(), options: view_options("view_amountmeasure", "View measure") },
                Operation::AlterModelOptions { name: "item".into(), options: view_options("view_item", "View item") },
                Operation::AlterModelOptions { name: "set".into(), options: view_options("view_set", "View item set") },
                Operation::AlterField {
                    model: "item".into(),
                    name: "location".into(),
                    field: FieldDef::tree_foreign_key("inventory.location", OnDelete::Cascade).with_default(json!(1)),
                    preserve_default: false,
                },
                Operation::AlterField {
                    model: "itemproperty".into(),
                    name: "name".into(),
                    field: FieldDef::char(200).indexed(),
                    preserve_default: true,
                },
                Operation::AlterField {
                    model: "itemproperty".into(),
                    name: "value".into(),
                    field: FieldDef::text().indexed(),
                    preserve_default: true,
                },
            ],
        },
    ]
}
