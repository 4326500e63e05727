/// Options that control which relations end up in the catalog.
#[derive(Debug, Clone)]
pub struct IntrospectOptions {
    pub include_system_schemas: bool,
    pub include_views: bool,
    pub include_materialized_views: bool,
    pub include_foreign_tables: bool,
    /// Restrict introspection to these schemas.
    pub schemas: Option<Vec<String>>,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self {
            include_system_schemas: false,
            include_views: true,
            include_materialized_views: true,
            include_foreign_tables: true,
            schemas: None,
        }
    }
}
