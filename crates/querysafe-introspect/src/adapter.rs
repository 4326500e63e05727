use async_trait::async_trait;

use querysafe_core::{Result, SchemaCatalog};

use crate::options::IntrospectOptions;

/// Database adapters that can produce a schema catalog.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Introspect the database and return a catalog snapshot.
    async fn introspect(&self, opts: &IntrospectOptions) -> Result<SchemaCatalog>;
}
