//! MySQL/MariaDB [`DataStore`] on an SQLx pool.
//!
//! Tables live in the connection's default database. Session settings (the
//! `sql_mode` applied before schema copy, for one) are replayed on every
//! connection taken from the pool, since MySQL scopes them per session.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::core::schema::{ColumnSpec, DefaultValue, IndexSpec, PrimaryKey, TableSchema};
use crate::core::filter::RowFilter;
use crate::core::traits::{DataStore, DdlStatement, ROW_CHANNEL_CAPACITY};
use crate::core::value::{Row, SqlValue};
use crate::dialect::{Dialect, NativeType};
use crate::drivers::common::parse_default;
use crate::error::{CopyError, Result};

use super::MySqlDialect;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix length for TEXT/BLOB columns in an index.
const INDEX_PREFIX_LENGTH: u32 = 255;

const TABLES_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

// CAST string columns to CHAR and numerics to SIGNED to sidestep collation
// and width differences between server versions.
const COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
        CAST(COLUMN_TYPE AS CHAR(1024)) AS COLUMN_TYPE,
        CAST(CASE
            WHEN CHARACTER_MAXIMUM_LENGTH IS NULL THEN 0
            WHEN CHARACTER_MAXIMUM_LENGTH > 2147483647 THEN -1
            ELSE CHARACTER_MAXIMUM_LENGTH
        END AS SIGNED) AS max_length,
        CAST(COALESCE(NUMERIC_PRECISION, 0) AS SIGNED) AS num_precision,
        CAST(COALESCE(NUMERIC_SCALE, 0) AS SIGNED) AS num_scale,
        CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
        CAST(COLUMN_DEFAULT AS CHAR(4096)) AS COLUMN_DEFAULT,
        CAST(EXTRA AS CHAR(255)) AS EXTRA,
        CAST(IF(COLUMN_KEY = 'PRI', 1, 0) AS SIGNED) AS is_key
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
    ORDER BY ORDINAL_POSITION
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
        CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX SEPARATOR ',') AS CHAR(4096)) AS columns,
        CAST(IF(NON_UNIQUE = 0, 1, 0) AS SIGNED) AS is_unique
    FROM INFORMATION_SCHEMA.STATISTICS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
      AND INDEX_NAME != 'PRIMARY'
    GROUP BY INDEX_NAME, NON_UNIQUE
    ORDER BY INDEX_NAME
"#;

const COLUMN_TYPES_QUERY: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
"#;

/// MySQL/MariaDB store.
pub struct MySqlStore {
    pool: MySqlPool,
    dialect: MySqlDialect,
    session: RwLock<Vec<String>>,
    page_orders: Mutex<HashMap<String, Vec<String>>>,
}

impl MySqlStore {
    /// Build a pool for the store. Connections open lazily.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.get_max_connections() as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_lazy(&sqlx_url(&config.url))
            .map_err(|e| CopyError::pool(e, "creating MySQL pool"))?;

        info!("MySQL store: {}", config.redacted_url());

        Ok(Self {
            pool,
            dialect: MySqlDialect::new(),
            session: RwLock::new(Vec::new()),
            page_orders: Mutex::new(HashMap::new()),
        })
    }

    pub fn sql_dialect(&self) -> &MySqlDialect {
        &self.dialect
    }

    fn session_settings(&self) -> Vec<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn conn(&self, context: &str) -> Result<PoolConnection<MySql>> {
        acquire(&self.pool, &self.session_settings(), context).await
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
        let mut conn = self.conn("loading MySQL primary key").await?;
        let rows = sqlx::query(PRIMARY_KEY_QUERY)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>("COLUMN_NAME"))
            .collect::<std::result::Result<_, _>>()?)
    }

    /// CREATE INDEX with prefix lengths for TEXT/BLOB columns, which MySQL
    /// cannot index whole.
    async fn create_index_sql(&self, table: &str, index: &IndexSpec) -> Result<String> {
        let mut conn = self.conn("loading MySQL column types").await?;
        let types: HashMap<String, String> = sqlx::query(COLUMN_TYPES_QUERY)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("COLUMN_NAME")?,
                    row.try_get::<String, _>("DATA_TYPE")?.to_lowercase(),
                ))
            })
            .collect::<std::result::Result<_, sqlx::Error>>()?;

        let columns = index
            .columns
            .iter()
            .map(|name| {
                let quoted = self.dialect.quote_ident(name)?;
                let needs_prefix = types
                    .get(name)
                    .is_some_and(|t| t.contains("text") || t.contains("blob"));
                Ok(if needs_prefix {
                    format!("{}({})", quoted, INDEX_PREFIX_LENGTH)
                } else {
                    quoted
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.dialect.quote_ident(&index.name)?,
            self.dialect.qualify(table)?,
            columns.join(", ")
        ))
    }
}

/// SQLx only parses `mysql://`; `mariadb://` is accepted as an alias.
fn sqlx_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("mariadb") => {
            format!("mysql://{}", rest)
        }
        _ => url.to_string(),
    }
}

/// Take a pooled connection and replay session settings on it.
async fn acquire(
    pool: &MySqlPool,
    session: &[String],
    context: &str,
) -> Result<PoolConnection<MySql>> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| CopyError::pool(e, context))?;
    for setting in session {
        sqlx::query(setting).execute(&mut *conn).await?;
    }
    Ok(conn)
}

/// Column default as reported by `INFORMATION_SCHEMA.COLUMNS`.
///
/// MySQL reports string defaults without quotes and marks expression defaults
/// with `DEFAULT_GENERATED` in `EXTRA`; MariaDB quotes strings.
fn mysql_default(raw: Option<String>, extra: &str, data_type: &str) -> Option<DefaultValue> {
    let raw = raw?;
    let extra = extra.to_lowercase();
    if extra.contains("auto_increment") {
        return None;
    }
    if extra.contains("default_generated") || raw.to_uppercase().starts_with("CURRENT_TIMESTAMP")
    {
        return Some(DefaultValue::Expression(raw));
    }

    let textual = matches!(
        data_type,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set"
    );
    if textual && !raw.starts_with('\'') {
        return Some(DefaultValue::Literal(SqlValue::Text(raw)));
    }
    parse_default(&raw)
}

/// Decode one result row by the server-reported column types.
fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode_value(row, idx)?);
    }
    Ok(out)
}

fn decode_value(row: &MySqlRow, idx: usize) -> Result<SqlValue> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let type_name = row.columns()[idx].type_info().name().to_uppercase();
    let value = match type_name.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get::<bool, _>(idx)?),
        "TINYINT" => SqlValue::I16(i16::from(row.try_get::<i8, _>(idx)?)),
        "TINYINT UNSIGNED" => SqlValue::I16(i16::from(row.try_get::<u8, _>(idx)?)),
        "SMALLINT" => SqlValue::I16(row.try_get::<i16, _>(idx)?),
        "SMALLINT UNSIGNED" => SqlValue::I32(i32::from(row.try_get::<u16, _>(idx)?)),
        "MEDIUMINT" | "INT" => SqlValue::I32(row.try_get::<i32, _>(idx)?),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
            SqlValue::I64(i64::from(row.try_get::<u32, _>(idx)?))
        }
        "BIGINT" => SqlValue::I64(row.try_get::<i64, _>(idx)?),
        "BIGINT UNSIGNED" => {
            let v = row.try_get::<u64, _>(idx)?;
            match i64::try_from(v) {
                Ok(v) => SqlValue::I64(v),
                Err(_) => SqlValue::Decimal(v.into()),
            }
        }
        "YEAR" => SqlValue::I16(row.try_get::<u16, _>(idx)? as i16),
        "FLOAT" => SqlValue::F32(row.try_get::<f32, _>(idx)?),
        "DOUBLE" => SqlValue::F64(row.try_get::<f64, _>(idx)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(idx)?),
        "DATE" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(idx)?),
        "TIME" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(idx)?),
        "DATETIME" | "TIMESTAMP" => {
            SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(idx)?)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)
        }
        "JSON" => SqlValue::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()),
        // CHAR, VARCHAR, TEXT variants, ENUM, SET
        _ => SqlValue::Text(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}

/// Bind one value. UUIDs are stored as their canonical text.
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(v.with_timezone(&Utc)),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
    }
}

fn bind_all<'q, I>(sql: &'q str, values: I) -> Query<'q, MySql, MySqlArguments>
where
    I: IntoIterator<Item = &'q SqlValue>,
{
    values.into_iter().fold(sqlx::query(sql), bind_value)
}

#[async_trait]
impl DataStore for MySqlStore {
    fn dialect(&self) -> &str {
        self.dialect.name()
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.conn("testing MySQL connection").await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.conn("listing MySQL tables").await?;
        let rows = sqlx::query(TABLES_QUERY).fetch_all(&mut *conn).await?;
        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("TABLE_NAME"))
            .collect::<std::result::Result<_, _>>()?;
        Ok(tables)
    }

    async fn introspect_schema(&self, table: &str) -> Result<TableSchema> {
        let mut conn = self.conn("loading MySQL columns").await?;
        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;
        drop(conn);
        if rows.is_empty() {
            return Err(CopyError::Store(format!("table {} does not exist", table)));
        }

        let mut schema = TableSchema::new(table);
        for row in &rows {
            let data_type: String = row.try_get("DATA_TYPE")?;
            let column_type: String = row.try_get("COLUMN_TYPE")?;
            let mut native = NativeType::new(data_type.clone())
                .with_length(row.try_get("max_length")?)
                .with_precision(row.try_get("num_precision")?, row.try_get("num_scale")?);
            native.column_type = Some(column_type.clone());

            let extra: Option<String> = row.try_get("EXTRA")?;
            let default = mysql_default(
                row.try_get("COLUMN_DEFAULT")?,
                extra.as_deref().unwrap_or(""),
                &data_type.to_lowercase(),
            );

            let name: String = row.try_get("COLUMN_NAME")?;
            let mut column = ColumnSpec::new(name, self.dialect.map_native_type(&native));
            column.is_nullable = row.try_get::<i64, _>("is_nullable")? == 1;
            column.default = default;
            column.native_type = Some(column_type);
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

        debug!("Loaded {} columns for {}", schema.columns.len(), table);
        Ok(schema)
    }

    async fn introspect_indexes(&self, table: &str) -> Result<Vec<IndexSpec>> {
        let mut conn = self.conn("loading MySQL indexes").await?;
        let rows = sqlx::query(INDEXES_QUERY)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let columns: String = row.try_get("columns")?;
            indexes.push(IndexSpec::new(
                row.try_get::<String, _>("INDEX_NAME")?,
                columns.split(',').map(str::to_string).collect(),
                row.try_get::<i64, _>("is_unique")? == 1,
            ));
        }

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = self.dialect.count(table)?;
        let mut conn = self.conn("counting MySQL rows").await?;
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>> {
        let order = self.page_order(table).await?;
        let sql = self.dialect.select_page(table, &order, offset, limit)?;
        let mut conn = self.conn("reading MySQL page").await?;
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
        rows.iter().map(decode_row).collect()
    }

    fn stream_rows(&self, table: &str) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let sql = self.dialect.select_all(table, &[]);
        let pool = self.pool.clone();
        let session = self.session_settings();
        let table = table.to_string();

        tokio::spawn(async move {
            let result: Result<()> = async {
                let sql = sql?;
                let mut conn = acquire(&pool, &session, "streaming MySQL rows").await?;
                let mut rows = sqlx::query(&sql).fetch(&mut *conn);
                while let Some(row) = rows.try_next().await? {
                    if tx.send(Ok(decode_row(&row)?)).await.is_err() {
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
        let mut conn = self.conn("looking up MySQL row").await?;
        let row = bind_all(&sql, &bound)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn execute_ddl(&self, ddl: &DdlStatement) -> Result<()> {
        let sql = match ddl {
            DdlStatement::CreateTable(schema) => self.dialect.create_table(schema)?,
            DdlStatement::CreateIndex { table, index } => {
                self.create_index_sql(table, index).await?
            }
            DdlStatement::SessionSetting(setting) => {
                let mut conn = self.conn("applying MySQL session setting").await?;
                sqlx::query(setting).execute(&mut *conn).await?;
                self.session
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(setting.clone());
                debug!("Session setting recorded: {}", setting);
                return Ok(());
            }
        };

        debug!("Executing DDL: {}", sql);
        let mut conn = self.conn("executing MySQL DDL").await?;
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let columns: Vec<&str> = row.columns().collect();
        let sql = self.dialect.insert(table, &columns)?;
        let mut conn = self.conn("inserting MySQL row").await?;
        bind_all(&sql, row.values()).execute(&mut *conn).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.pool.close().await;
    }
}
