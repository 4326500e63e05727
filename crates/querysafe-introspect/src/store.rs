use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use querysafe_core::{Result, SchemaCatalog, validate_catalog};

use crate::adapter::Adapter;
use crate::options::IntrospectOptions;

/// Shared, swappable catalog snapshot.
///
/// Readers clone an `Arc` and keep using it for the whole validation even if
/// a reload lands meanwhile. Reloads are serialized and only replace the
/// snapshot once the new catalog has been introspected and validated.
#[derive(Debug)]
pub struct CatalogStore {
    current: RwLock<Arc<SchemaCatalog>>,
    reload: Mutex<()>,
}

impl CatalogStore {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
            reload: Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<SchemaCatalog> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Replace the snapshot after validating it.
    pub fn replace(&self, catalog: SchemaCatalog) -> Result<Arc<SchemaCatalog>> {
        validate_catalog(&catalog)?;
        let next = Arc::new(catalog);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&next),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&next),
        }
        Ok(next)
    }

    /// Introspect again and swap in the result.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn reload(
        &self,
        adapter: &dyn Adapter,
        opts: &IntrospectOptions,
    ) -> Result<Arc<SchemaCatalog>> {
        let _serialized = self.reload.lock().await;

        let catalog = adapter.introspect(opts).await.inspect_err(|err| {
            tracing::warn!(event = "catalog_reload_failed", engine = adapter.engine(), error = %err);
        })?;
        let next = self.replace(catalog)?;

        tracing::info!(
            event = "catalog_reloaded",
            engine = adapter.engine(),
            tables = next.len()
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use querysafe_core::{ColumnDescriptor, Error, TableDescriptor, TableKind};

    use super::*;

    struct FakeAdapter {
        generation: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn engine(&self) -> &'static str {
            "fake"
        }

        async fn introspect(&self, _opts: &IntrospectOptions) -> Result<SchemaCatalog> {
            if self.fail {
                return Err(Error::Db("connection refused".to_string()));
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst);
            Ok(catalog_with(&format!("table_{generation}")))
        }
    }

    fn catalog_with(name: &str) -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new("fake", None);
        catalog.tables.push(TableDescriptor {
            schema: "public".to_string(),
            name: name.to_string(),
            kind: TableKind::Table,
            columns: vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                is_nullable: false,
            }],
            foreign_keys: Vec::new(),
        });
        catalog
    }

    #[tokio::test]
    async fn reload_swaps_snapshot_without_touching_readers() {
        let store = CatalogStore::new(catalog_with("initial"));
        let before = store.snapshot();

        let adapter = FakeAdapter {
            generation: AtomicUsize::new(0),
            fail: false,
        };
        store
            .reload(&adapter, &IntrospectOptions::default())
            .await
            .expect("reload");

        assert!(before.contains("initial"));
        assert!(store.snapshot().contains("table_0"));
        assert!(!store.snapshot().contains("initial"));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let store = CatalogStore::new(catalog_with("initial"));
        let adapter = FakeAdapter {
            generation: AtomicUsize::new(0),
            fail: true,
        };

        let result = store.reload(&adapter, &IntrospectOptions::default()).await;
        assert!(result.is_err());
        assert!(store.snapshot().contains("initial"));
    }

    #[test]
    fn invalid_catalog_is_not_installed() {
        let store = CatalogStore::new(catalog_with("initial"));
        let mut broken = catalog_with("dup");
        broken.tables.push(broken.tables[0].clone());

        assert!(store.replace(broken).is_err());
        assert!(store.snapshot().contains("initial"));
    }
}
