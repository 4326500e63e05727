use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Immutable snapshot of the tables a database exposes.
///
/// Table order is the declaration order reported by the introspection
/// collaborator and is significant: the schema matcher breaks confidence ties
/// by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaCatalog {
    /// Contract version for this snapshot format.
    pub catalog_version: String,
    /// Database engine identifier (e.g. `postgres`).
    pub engine: String,
    /// Database name when available.
    pub database: Option<String>,
    /// Tables in declaration order.
    pub tables: Vec<TableDescriptor>,
}

/// A table-like object (table, view, materialized view, foreign table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableDescriptor {
    /// Namespace holding the table (e.g. `public`).
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub kind: TableKind,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

/// Kind of relation represented in the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Table,
    PartitionedTable,
    View,
    MaterializedView,
    ForeignTable,
    Other(String),
}

/// Column name and declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Formatted declared type (e.g. `character varying(255)`).
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Foreign key preserving column ordering on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl SchemaCatalog {
    /// Create an empty catalog for the given engine.
    pub fn new(engine: impl Into<String>, database: Option<String>) -> Self {
        Self {
            catalog_version: crate::CATALOG_VERSION.to_string(),
            engine: engine.into(),
            database,
            tables: Vec::new(),
        }
    }

    /// Resolve `table` or `schema.table`, ignoring ASCII case.
    ///
    /// An unqualified name resolves to the first table with that name in
    /// declaration order.
    pub fn find(&self, reference: &str) -> Option<&TableDescriptor> {
        self.position(reference).map(|idx| &self.tables[idx])
    }

    /// Declaration index of a table reference, see [`SchemaCatalog::find`].
    pub fn position(&self, reference: &str) -> Option<usize> {
        let (schema, name) = match reference.rsplit_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, reference),
        };

        self.tables.iter().position(|table| {
            table.name.eq_ignore_ascii_case(name)
                && schema.is_none_or(|schema| table.schema.eq_ignore_ascii_case(schema))
        })
    }

    /// Returns true when the reference resolves to a known table.
    pub fn contains(&self, reference: &str) -> bool {
        self.position(reference).is_some()
    }

    /// Number of tables in the snapshot.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl TableDescriptor {
    /// `schema.name` form used in diagnostics and join hints.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(schema: &str, name: &str) -> TableDescriptor {
        TableDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            kind: TableKind::Table,
            columns: vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                is_nullable: false,
            }],
            foreign_keys: Vec::new(),
        }
    }

    #[test]
    fn finds_tables_case_insensitively() {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables.push(table("public", "customers"));
        catalog.tables.push(table("sales", "Orders"));

        assert_eq!(catalog.position("CUSTOMERS"), Some(0));
        assert_eq!(catalog.position("orders"), Some(1));
        assert_eq!(catalog.position("sales.orders"), Some(1));
        assert!(catalog.find("public.orders").is_none());
        assert!(!catalog.contains("nonexistent_table"));
    }

    #[test]
    fn unqualified_lookup_prefers_declaration_order() {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables.push(table("archive", "events"));
        catalog.tables.push(table("public", "events"));

        let found = catalog.find("events").expect("events table");
        assert_eq!(found.qualified_name(), "archive.events");
    }

    #[test]
    fn column_defaults_to_nullable_when_omitted() {
        let json = r#"{"name":"email","data_type":"text"}"#;
        let column: ColumnDescriptor = serde_json::from_str(json).expect("parse column");
        assert!(column.is_nullable);
        assert!(table("public", "users").column("ID").is_some());
    }
}
