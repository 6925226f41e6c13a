use async_trait::async_trait;
use sqlx::{
    Column, Row as _, SqlitePool, TypeInfo, ValueRef,
    query::Query,
    sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};

use super::{Dialect, Row, Statement, Store, StoreResult, Value};
use crate::config::SqliteConfig;

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &SqliteConfig) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(config.create_if_missing)
                    .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)),
            )
            .await?;
        Ok(Self::new(pool))
    }

    /// Underlying pool, for test setup and ad-hoc inspection.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn build_query(statement: &Statement) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    statement
        .params()
        .iter()
        .fold(sqlx::query(statement.sql()), |query, value| match value {
            Value::Null => query.bind(None::<String>),
            Value::Int(i) => query.bind(*i),
            Value::UInt(u) => match i64::try_from(*u) {
                Ok(i) => query.bind(i),
                // SQLite integers are signed 64-bit
                Err(_) => query.bind(u.to_string()),
            },
            Value::Float(f) => query.bind(*f),
            Value::Decimal(d) => query.bind(d.to_string()),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::Date(d) => query.bind(*d),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Time(t) => query.bind(*t),
        })
}

fn decode_row(row: &SqliteRow) -> StoreResult<Row> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            // The runtime storage class, not the declared column type.
            let storage_class = raw.type_info().name().to_string();
            match storage_class.as_str() {
                "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => {
                    Value::Int(row.try_get_unchecked::<i64, _>(index)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
                "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

#[async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let rows = build_query(statement).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> StoreResult<u64> {
        let result = build_query(statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
