use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use querysafe_core::SchemaCatalog;
use schemars::schema_for;

fn shop_catalog_json() -> serde_json::Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../querysafe-engine/tests/fixtures/shop.catalog.json");
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("missing catalog fixture at {}", path.display()));
    serde_json::from_str(&content).expect("parse catalog fixture")
}

fn compiled_schema() -> JSONSchema {
    let generated = schema_for!(SchemaCatalog);
    let schema_json = serde_json::to_value(&generated).expect("serialize generated schema");
    JSONSchema::compile(&schema_json).expect("compile catalog schema")
}

#[test]
fn fixture_catalog_matches_generated_schema() {
    let instance = shop_catalog_json();
    assert!(compiled_schema().is_valid(&instance));

    let catalog: SchemaCatalog = serde_json::from_value(instance).expect("decode catalog");
    assert_eq!(catalog.catalog_version, querysafe_core::CATALOG_VERSION);
}

#[test]
fn catalog_without_tables_field_is_rejected() {
    let mut instance = shop_catalog_json();
    instance
        .as_object_mut()
        .expect("catalog object")
        .remove("tables");
    assert!(!compiled_schema().is_valid(&instance));
}
