use querysafe_core::{ColumnDescriptor, ForeignKey, TableDescriptor, TableKind};

use crate::options::IntrospectOptions;

use super::queries::{RawColumn, RawForeignKey, RawTable};

pub fn filter_schemas(raw: Vec<String>, opts: &IntrospectOptions) -> Vec<String> {
    raw.into_iter()
        .filter(|schema| {
            let is_system = schema.starts_with("pg_") || schema == "information_schema";
            match &opts.schemas {
                Some(list) => list.iter().any(|item| item == schema),
                None => opts.include_system_schemas || !is_system,
            }
        })
        .collect()
}

/// Map a `pg_class.relkind` code.
pub fn relkind_to_table_kind(relkind: i8) -> TableKind {
    match relkind as u8 {
        b'r' => TableKind::Table,
        b'p' => TableKind::PartitionedTable,
        b'v' => TableKind::View,
        b'm' => TableKind::MaterializedView,
        b'f' => TableKind::ForeignTable,
        other => TableKind::Other((other as char).to_string()),
    }
}

/// Table shells for `schema`; columns and foreign keys are filled in later.
pub fn map_tables(schema: &str, raw: Vec<RawTable>, opts: &IntrospectOptions) -> Vec<TableDescriptor> {
    raw.into_iter()
        .filter_map(|table| {
            let kind = relkind_to_table_kind(table.relkind);
            if !table_kind_enabled(&kind, opts) {
                return None;
            }

            Some(TableDescriptor {
                schema: schema.to_string(),
                name: table.name,
                kind,
                columns: Vec::new(),
                foreign_keys: Vec::new(),
            })
        })
        .collect()
}

fn table_kind_enabled(kind: &TableKind, opts: &IntrospectOptions) -> bool {
    match kind {
        TableKind::View => opts.include_views,
        TableKind::MaterializedView => opts.include_materialized_views,
        TableKind::ForeignTable => opts.include_foreign_tables,
        _ => true,
    }
}

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<ColumnDescriptor> {
    raw.into_iter()
        .map(|col| ColumnDescriptor {
            name: col.name,
            data_type: col.data_type,
            is_nullable: col.is_nullable,
        })
        .collect()
}

pub fn map_foreign_keys(raw: Vec<RawForeignKey>) -> Vec<ForeignKey> {
    raw.into_iter()
        .map(|fk| ForeignKey {
            name: Some(fk.name),
            columns: fk.columns,
            referenced_schema: fk.referenced_schema,
            referenced_table: fk.referenced_table,
            referenced_columns: fk.referenced_columns,
        })
        .collect()
}
