//! Database introspection adapters, the live dry-run executor and the
//! shared catalog store.

pub mod adapter;
pub mod options;
pub mod postgres;
pub mod store;

pub use adapter::Adapter;
pub use options::IntrospectOptions;
pub use postgres::{PostgresAdapter, PostgresExecutor, introspect};
pub use store::CatalogStore;

pub use querysafe_core::SchemaCatalog;
