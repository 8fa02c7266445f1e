//! PostgreSQL [`DataStore`] on a deadpool connection pool.
//!
//! Schema and index introspection read `information_schema` and `pg_catalog`
//! for the configured schema. Pages are ordered by primary key; streamed
//! reads use a single `query_raw` cursor per table.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::core::schema::{ColumnSpec, IndexSpec, PrimaryKey, TableSchema};
use crate::core::filter::RowFilter;
use crate::core::traits::{DataStore, DdlStatement, ROW_CHANNEL_CAPACITY};
use crate::core::value::Row;
use crate::dialect::{Dialect, NativeType};
use crate::drivers::common::{parse_default, TlsBuilder};
use crate::error::{CopyError, Result};

use super::types::{decode_row, param_refs, params};
use super::PostgresDialect;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.column_name,
        c.udt_name,
        COALESCE(c.character_maximum_length, 0)::int8,
        COALESCE(c.numeric_precision, 0)::int8,
        COALESCE(c.numeric_scale, 0)::int8,
        c.is_nullable = 'YES',
        c.column_default,
        c.is_identity = 'YES'
    FROM information_schema.columns c
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT a.attname
    FROM pg_catalog.pg_constraint c
    JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
    WHERE n.nspname = $1
      AND t.relname = $2
      AND c.contype = 'p'
      AND a.attnum = ANY(c.conkey)
    ORDER BY array_position(c.conkey, a.attnum)
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        i.relname AS index_name,
        ix.indisunique,
        array_agg(a.attname ORDER BY array_position(ix.indkey::int2[], a.attnum)) AS columns
    FROM pg_catalog.pg_index ix
    JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
    JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
    WHERE n.nspname = $1
      AND t.relname = $2
      AND NOT ix.indisprimary
    GROUP BY i.relname, ix.indisunique
    ORDER BY i.relname
"#;

const TABLES_QUERY: &str = r#"
    SELECT table_name
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

/// PostgreSQL store.
pub struct PostgresStore {
    pool: Pool,
    dialect: PostgresDialect,
    /// Session settings replayed on every connection handed out.
    session: RwLock<Vec<String>>,
    /// Resolved page order per table.
    page_orders: Mutex<HashMap<String, Vec<String>>>,
}

impl PostgresStore {
    /// Build a pool for the store. No connection is opened until first use.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let pg_config: PgConfig = config.url.parse().map_err(|e| {
            CopyError::Config(format!(
                "invalid PostgreSQL URL '{}': {}",
                config.redacted_url(),
                e
            ))
        })?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match TlsBuilder::for_store(config)?.build()? {
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.get_max_connections())
                    .build()
                    .map_err(|e| CopyError::pool(e, "creating PostgreSQL pool"))?
            }
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.get_max_connections())
                    .build()
                    .map_err(|e| CopyError::pool(e, "creating PostgreSQL pool"))?
            }
        };

        info!(
            "PostgreSQL store: {} (schema {})",
            config.redacted_url(),
            config.get_schema()
        );

        Ok(Self {
            pool,
            dialect: PostgresDialect::new(config.get_schema()),
            session: RwLock::new(Vec::new()),
            page_orders: Mutex::new(HashMap::new()),
        })
    }

    pub fn sql_dialect(&self) -> &PostgresDialect {
        &self.dialect
    }

    fn schema(&self) -> &str {
        self.dialect.schema()
    }

    async fn client(&self, context: &str) -> Result<Object> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| CopyError::pool(e, context))?;

        let session = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .join("; ");
        if !session.is_empty() {
            client.batch_execute(&session).await?;
        }
        Ok(client)
    }

    /// Columns ordering the pages of `table`, resolved once per table.
    async fn page_order(&self, table: &str) -> Result<Vec<String>> {
        let cached = self
            .page_orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned();
        if let Some(order) = cached {
            return Ok(order);
        }

        let schema = self.introspect_schema(table).await?;
        let order = self.dialect.page_order(&schema);
        debug!("{}: pages ordered by {}", table, order.join(", "));

        self.page_orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string(), order.clone());
        Ok(order)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let client = self.client("loading PostgreSQL primary key").await?;
        let rows = client
            .query(PRIMARY_KEY_QUERY, &[&self.schema(), &table])
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

#[async_trait]
impl DataStore for PostgresStore {
    fn dialect(&self) -> &str {
        self.dialect.name()
    }

    async fn test_connection(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client("listing PostgreSQL tables").await?;
        let rows = client.query(TABLES_QUERY, &[&self.schema()]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn introspect_schema(&self, table: &str) -> Result<TableSchema> {
        let client = self.client("loading PostgreSQL columns").await?;
        let rows = client
            .query(COLUMNS_QUERY, &[&self.schema(), &table])
            .await?;
        if rows.is_empty() {
            return Err(CopyError::Store(format!(
                "table {}.{} does not exist",
                self.schema(),
                table
            )));
        }

        let mut schema = TableSchema::new(table);
        for row in &rows {
            let udt_name: String = row.get(1);
            let native = NativeType::new(udt_name.clone())
                .with_length(row.get(2))
                .with_precision(row.get(3), row.get(4));
            let is_identity: bool = row.get(7);

            let mut column = ColumnSpec::new(
                row.get::<_, String>(0),
                self.dialect.map_native_type(&native),
            );
            column.is_nullable = row.get(5);
            column.default = if is_identity {
                None
            } else {
                row.get::<_, Option<String>>(6)
                    .as_deref()
                    .and_then(parse_default)
            };
            column.native_type = Some(udt_name);
            schema.columns.push(column);
        }

        let key = self.primary_key(table).await?;
        if !key.is_empty() {
            for column in schema.columns.iter_mut() {
                if key.contains(&column.name) {
                    column.is_primary_key = true;
                }
            }
            schema.primary_key = Some(PrimaryKey::new(key));
        }

        debug!(
            "Loaded {} columns for {}.{}",
            schema.columns.len(),
            self.schema(),
            table
        );
        Ok(schema)
    }

    async fn introspect_indexes(&self, table: &str) -> Result<Vec<IndexSpec>> {
        let client = self.client("loading PostgreSQL indexes").await?;
        let rows = client
            .query(INDEXES_QUERY, &[&self.schema(), &table])
            .await?;
        let indexes: Vec<IndexSpec> = rows
            .iter()
            .map(|row| IndexSpec::new(row.get::<_, String>(0), row.get(2), row.get(1)))
            .collect();

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = self.dialect.count(table)?;
        let client = self.client("counting PostgreSQL rows").await?;
        let count: i64 = client.query_one(&sql, &[]).await?.get(0);
        Ok(count.max(0) as u64)
    }

    async fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>> {
        let order = self.page_order(table).await?;
        let sql = self.dialect.select_page(table, &order, offset, limit)?;
        let client = self.client("reading PostgreSQL page").await?;
        let rows = client.query(&sql, &[]).await?;
        rows.iter().map(decode_row).collect()
    }

    fn stream_rows(&self, table: &str) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let sql = self.dialect.select_all(table, &[]);
        let pool = self.pool.clone();
        let session = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .join("; ");
        let table = table.to_string();

        tokio::spawn(async move {
            let result: Result<()> = async {
                let sql = sql?;
                let client = pool
                    .get()
                    .await
                    .map_err(|e| CopyError::pool(e, "streaming PostgreSQL rows"))?;
                if !session.is_empty() {
                    client.batch_execute(&session).await?;
                }

                let no_params: Vec<&(dyn ToSql + Sync)> = Vec::new();
                let mut stream = Box::pin(client.query_raw(&sql, no_params).await?);
                while let Some(row) = stream.next().await {
                    let row = decode_row(&row?)?;
                    if tx.send(Ok(row)).await.is_err() {
                        debug!("{}: stream receiver dropped", table);
                        break;
                    }
                }
                Ok(())
            }
            .await;

            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn find_row(&self, table: &str, filter: &RowFilter) -> Result<Option<Row>> {
        let sql = self.dialect.select_matching(table, filter)?;
        let bound = filter.bound_values();
        let values = params(&bound);
        let refs = param_refs(&values);
        let client = self.client("looking up PostgreSQL row").await?;
        let row = client.query_opt(&sql, &refs).await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn execute_ddl(&self, ddl: &DdlStatement) -> Result<()> {
        let sql = match ddl {
            DdlStatement::CreateTable(schema) => self.dialect.create_table(schema)?,
            DdlStatement::CreateIndex { table, index } => {
                self.dialect.create_index(table, index)?
            }
            DdlStatement::SessionSetting(setting) => {
                let client = self.client("applying PostgreSQL session setting").await?;
                client.batch_execute(setting).await?;
                self.session
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(setting.clone());
                debug!("Session setting recorded: {}", setting);
                return Ok(());
            }
        };

        debug!("Executing DDL: {}", sql);
        let client = self.client("executing PostgreSQL DDL").await?;
        client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let columns: Vec<&str> = row.columns().collect();
        let sql = self.dialect.insert(table, &columns)?;
        let values = params(row.values());
        let refs = param_refs(&values);

        let client = self.client("inserting PostgreSQL row").await?;
        let statement = client.prepare_cached(&sql).await?;
        client.execute(&statement, &refs).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.pool.close();
    }
}
