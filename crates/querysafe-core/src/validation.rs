use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::SchemaCatalog;
use crate::error::{Error, Result};

/// Validate internal consistency of a catalog snapshot.
///
/// This checks:
/// - duplicate tables (per schema, case-insensitive) and columns
/// - foreign key columns exist on the owning table
/// - foreign key targets and their columns exist in the snapshot
pub fn validate_catalog(catalog: &SchemaCatalog) -> Result<()> {
    let mut index: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

    for table in &catalog.tables {
        let key = table_key(&table.schema, &table.name);
        if index.contains_key(&key) {
            return Err(Error::InvalidCatalog(format!(
                "duplicate table name: {}",
                table.qualified_name()
            )));
        }

        let mut columns = BTreeSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.to_ascii_lowercase()) {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate column name: {}.{}",
                    table.qualified_name(),
                    column.name
                )));
            }
        }

        index.insert(key, columns);
    }

    for table in &catalog.tables {
        let columns = &index[&table_key(&table.schema, &table.name)];

        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
                return Err(Error::InvalidCatalog(format!(
                    "foreign key column count mismatch on {}",
                    table.qualified_name()
                )));
            }

            for column in &fk.columns {
                if !columns.contains(&column.to_ascii_lowercase()) {
                    return Err(Error::InvalidCatalog(format!(
                        "foreign key column not found: {}.{}",
                        table.qualified_name(),
                        column
                    )));
                }
            }

            let ref_columns = index
                .get(&table_key(&fk.referenced_schema, &fk.referenced_table))
                .ok_or_else(|| {
                    Error::InvalidCatalog(format!(
                        "referenced table not found: {}.{}",
                        fk.referenced_schema, fk.referenced_table
                    ))
                })?;

            for column in &fk.referenced_columns {
                if !ref_columns.contains(&column.to_ascii_lowercase()) {
                    return Err(Error::InvalidCatalog(format!(
                        "referenced column not found: {}.{}.{}",
                        fk.referenced_schema, fk.referenced_table, column
                    )));
                }
            }
        }
    }

    Ok(())
}

fn table_key(schema: &str, name: &str) -> (String, String) {
    (schema.to_ascii_lowercase(), name.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, ForeignKey, TableDescriptor, TableKind};

    fn column(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: "integer".to_string(),
            is_nullable: false,
        }
    }

    fn table(name: &str, columns: &[&str], foreign_keys: Vec<ForeignKey>) -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: name.to_string(),
            kind: TableKind::Table,
            columns: columns.iter().map(|name| column(name)).collect(),
            foreign_keys,
        }
    }

    fn fk(columns: &[&str], table: &str, referenced: &[&str]) -> ForeignKey {
        ForeignKey {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_schema: "public".to_string(),
            referenced_table: table.to_string(),
            referenced_columns: referenced.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn accepts_consistent_catalog() {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables.push(table("customers", &["id", "name"], Vec::new()));
        catalog.tables.push(table(
            "orders",
            &["id", "customer_id"],
            vec![fk(&["customer_id"], "customers", &["id"])],
        ));

        validate_catalog(&catalog).expect("catalog should validate");
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables.push(table("customers", &["id", "ID"], Vec::new()));

        let err = validate_catalog(&catalog).unwrap_err();
        assert!(err.to_string().contains("duplicate column name"));
    }

    #[test]
    fn rejects_dangling_foreign_key() {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables.push(table(
            "orders",
            &["id", "customer_id"],
            vec![fk(&["customer_id"], "customers", &["id"])],
        ));

        let err = validate_catalog(&catalog).unwrap_err();
        assert!(err.to_string().contains("referenced table not found"));
    }
}
