use sqlx::PgPool;

use querysafe_core::{Result, SchemaCatalog, validate_catalog};

use crate::adapter::Adapter;
use crate::options::IntrospectOptions;

mod explain;
mod mapper;
mod queries;

pub use explain::PostgresExecutor;

/// Adapter for PostgreSQL databases.
#[derive(Debug, Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    /// Create a new adapter using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Adapter for PostgresAdapter {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn introspect(&self, opts: &IntrospectOptions) -> Result<SchemaCatalog> {
        introspect(&self.pool, opts).await
    }
}

/// Build a catalog snapshot from a live Postgres database.
///
/// Tables come out ordered by schema name, then table name, so repeated
/// introspection of an unchanged database yields an identical catalog.
pub async fn introspect(pool: &PgPool, opts: &IntrospectOptions) -> Result<SchemaCatalog> {
    let database = queries::fetch_database_name(pool).await?;
    let schemas = mapper::filter_schemas(queries::list_schemas(pool).await?, opts);

    let mut catalog = SchemaCatalog::new("postgres", Some(database));

    for schema_name in schemas {
        let raw_tables = queries::list_tables_in_schema(pool, &schema_name).await?;
        let mut tables = mapper::map_tables(&schema_name, raw_tables, opts);

        for table in &mut tables {
            let raw_columns = queries::list_columns(pool, &schema_name, &table.name).await?;
            table.columns = mapper::map_columns(raw_columns);

            let raw_fks = queries::list_foreign_keys(pool, &schema_name, &table.name).await?;
            table.foreign_keys = mapper::map_foreign_keys(raw_fks);
        }

        catalog.tables.extend(tables);
    }

    // A filtered introspection may drop the target of a foreign key.
    let known: Vec<(String, String)> = catalog
        .tables
        .iter()
        .map(|table| (table.schema.clone(), table.name.clone()))
        .collect();
    for table in &mut catalog.tables {
        table.foreign_keys.retain(|fk| {
            known
                .iter()
                .any(|(schema, name)| *schema == fk.referenced_schema && *name == fk.referenced_table)
        });
    }

    validate_catalog(&catalog)?;
    tracing::debug!(
        event = "catalog_introspected",
        engine = "postgres",
        tables = catalog.len()
    );
    Ok(catalog)
}
