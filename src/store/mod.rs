//! The store seam: values, statements and the handles the archive engine
//! talks to.
//!
//! The engine never sees a connection. It hands a [`Statement`] to a
//! [`Store`] and gets back rows or an affected-row count. Each execution
//! commits on its own; nothing spans an insert and the matching delete.

mod dialect;
mod error;
#[cfg(feature = "database-mysql")]
mod mysql;
pub mod quote;
#[cfg(feature = "database-sqlite")]
mod sqlite;
mod statement;
mod value;

use std::sync::Arc;

use async_trait::async_trait;
pub use dialect::Dialect;
pub use error::{StoreError, StoreResult};
#[cfg(feature = "database-mysql")]
pub use mysql::MySqlStore;
#[cfg(feature = "database-sqlite")]
pub use sqlite::SqliteStore;
pub use statement::{Predicate, Statement};
pub use value::{Row, Value};

use crate::config::StoreConfig;

/// A live or archive database handle.
#[async_trait]
pub trait Store: Send + Sync {
    /// Dialect used to spell statements for this store.
    fn dialect(&self) -> Dialect;

    /// Run a select-shaped statement and return every row.
    async fn fetch(&self, statement: &Statement) -> StoreResult<Vec<Row>>;

    /// Run a statement that changes data or structure and return the number
    /// of affected rows.
    async fn execute(&self, statement: &Statement) -> StoreResult<u64>;
}

/// Open a store from configuration.
///
/// Store types whose driver was not compiled in are reported as
/// [`StoreError::Unsupported`].
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn Store>> {
    match config {
        StoreConfig::Mysql(cfg) => {
            #[cfg(feature = "database-mysql")]
            let store: StoreResult<Arc<dyn Store>> = Ok(Arc::new(MySqlStore::connect(cfg).await?));
            #[cfg(not(feature = "database-mysql"))]
            let store = {
                let _ = cfg;
                Err(StoreError::Unsupported(
                    "store type 'mysql' requires the 'database-mysql' feature".into(),
                ))
            };
            store
        }
        StoreConfig::Sqlite(cfg) => {
            #[cfg(feature = "database-sqlite")]
            let store: StoreResult<Arc<dyn Store>> = Ok(Arc::new(SqliteStore::connect(cfg).await?));
            #[cfg(not(feature = "database-sqlite"))]
            let store = {
                let _ = cfg;
                Err(StoreError::Unsupported(
                    "store type 'sqlite' requires the 'database-sqlite' feature".into(),
                ))
            };
            store
        }
    }
}
