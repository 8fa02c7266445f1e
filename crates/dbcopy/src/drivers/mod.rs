//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL store on a deadpool of `tokio-postgres` clients
//! - [`mysql`]: MySQL/MariaDB store on an SQLx pool (feature `mysql`)
//! - [`memory`]: in-process store for tests and dry runs
//! - [`common`]: shared utilities (TLS, default parsing)
//!
//! Each driver pairs a [`Dialect`](crate::dialect::Dialect) with a
//! [`DataStore`]. [`connect`] picks the driver from the URL scheme.

pub mod common;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgres;

use std::sync::Arc;

use tracing::info;

use crate::config::{StoreConfig, StoreKind};
use crate::core::traits::DataStore;
use crate::error::{CopyError, Result};

pub use common::{SslMode, TlsBuilder};
pub use memory::MemoryStore;
#[cfg(feature = "mysql")]
pub use mysql::{MySqlDialect, MySqlStore};
pub use postgres::{PostgresDialect, PostgresStore};

/// Open the store a URL names and check it answers.
///
/// Unknown schemes and malformed URLs are configuration errors; a store that
/// cannot be reached is a connection error naming the (redacted) URL.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn DataStore>> {
    let store: Arc<dyn DataStore> = match config.kind()? {
        StoreKind::Postgres => Arc::new(PostgresStore::connect(config)?),
        #[cfg(feature = "mysql")]
        StoreKind::MySql => Arc::new(MySqlStore::connect(config)?),
        #[cfg(not(feature = "mysql"))]
        StoreKind::MySql => {
            return Err(CopyError::Config(
                "MySQL support requires the `mysql` feature".to_string(),
            ))
        }
        StoreKind::Memory => Arc::new(MemoryStore::from_url(&config.url)?),
    };

    store
        .test_connection()
        .await
        .map_err(|e| CopyError::connection(&config.url, e))?;

    info!(
        "Connected to {} ({})",
        config.redacted_url(),
        store.dialect()
    );
    Ok(store)
}
