use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::{
    Column, Decode, MySqlPool, Row as _, Type, TypeInfo, ValueRef,
    mysql::{MySql, MySqlArguments, MySqlPoolOptions, MySqlRow, types::MySqlTime},
    query::Query,
};

use super::{Dialect, Row, Statement, Store, StoreError, StoreResult, Value};
use crate::config::MySqlConfig;

/// MySQL (or MariaDB) backed store.
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &MySqlConfig) -> StoreResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn build_query(statement: &Statement) -> Query<'_, MySql, MySqlArguments> {
    statement
        .params()
        .iter()
        .fold(sqlx::query(statement.sql()), |query, value| match value {
            Value::Null => query.bind(None::<String>),
            Value::Int(i) => query.bind(*i),
            Value::UInt(u) => query.bind(*u),
            Value::Float(f) => query.bind(*f),
            Value::Decimal(d) => query.bind(*d),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::Date(d) => query.bind(*d),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Time(t) => query.bind(*t),
        })
}

/// How a column's wire type maps onto [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnClass {
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Binary,
    Text,
}

impl ColumnClass {
    fn from_type_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("UNSIGNED") {
            return ColumnClass::Unsigned;
        }
        match upper.as_str() {
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" | "BIGINT" | "YEAR" => {
                ColumnClass::Signed
            }
            "FLOAT" => ColumnClass::Float,
            "DOUBLE" => ColumnClass::Double,
            "DECIMAL" => ColumnClass::Decimal,
            "DATE" => ColumnClass::Date,
            "TIME" => ColumnClass::Time,
            "DATETIME" | "TIMESTAMP" => ColumnClass::DateTime,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => ColumnClass::Binary,
            _ => ColumnClass::Text,
        }
    }
}

fn decode_error(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::Decode {
        column: column.to_string(),
        message: err.to_string(),
    }
}

/// Decode a DATE or DATETIME column.
///
/// Values chrono cannot represent, such as `0000-00-00` or `2018-06-00`
/// stored under a lenient `sql_mode`, are kept as text so they archive
/// unchanged.
fn decode_temporal<T>(
    row: &MySqlRow,
    index: usize,
    class: ColumnClass,
    wrap: fn(T) -> Value,
) -> Result<Value, sqlx::Error>
where
    T: for<'r> Decode<'r, MySql> + Type<MySql>,
{
    match row.try_get_unchecked::<T, _>(index) {
        Ok(value) => Ok(wrap(value)),
        Err(err) => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            temporal_text(class, &bytes).map(Value::Text).ok_or(err)
        }
    }
}

/// Render raw DATE or DATETIME bytes as MySQL writes them.
///
/// Text protocol values are already in that form. Binary protocol values
/// are a length byte followed by little-endian year, month, day, hour,
/// minute, second and microsecond parts; a zero date has no parts at all.
fn temporal_text(class: ColumnClass, bytes: &[u8]) -> Option<String> {
    if bytes.first().is_some_and(u8::is_ascii_digit) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let body = match bytes.split_first() {
        None => &[][..],
        Some((len, rest)) => rest.get(..usize::from(*len))?,
    };
    let (year, month, day) = match body {
        [] => (0, 0, 0),
        [y0, y1, month, day, ..] => (u16::from_le_bytes([*y0, *y1]), *month, *day),
        _ => return None,
    };
    let date = format!("{year:04}-{month:02}-{day:02}");
    if class == ColumnClass::Date {
        return Some(date);
    }

    let (hour, minute, second) = match body.get(4..7) {
        Some(&[h, m, s]) => (h, m, s),
        _ => (0, 0, 0),
    };
    let mut text = format!("{date} {hour:02}:{minute:02}:{second:02}");
    if let Some(&[a, b, c, d]) = body.get(7..11) {
        let micros = u32::from_le_bytes([a, b, c, d]);
        if micros != 0 {
            text.push_str(&format!(".{micros:06}"));
        }
    }
    Some(text)
}

fn decode_row(row: &MySqlRow) -> StoreResult<Row> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let name = column.name();
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            out.push(name, Value::Null);
            continue;
        }
        let class = ColumnClass::from_type_name(raw.type_info().name());
        let value = match class {
            ColumnClass::Signed => row.try_get_unchecked::<i64, _>(index).map(Value::Int),
            ColumnClass::Unsigned => row.try_get_unchecked::<u64, _>(index).map(Value::UInt),
            ColumnClass::Float => row
                .try_get_unchecked::<f32, _>(index)
                .map(|f| Value::Float(f64::from(f))),
            ColumnClass::Double => row.try_get_unchecked::<f64, _>(index).map(Value::Float),
            ColumnClass::Decimal => row
                .try_get_unchecked::<Decimal, _>(index)
                .map(Value::Decimal),
            ColumnClass::Date => decode_temporal::<NaiveDate>(row, index, class, Value::Date),
            ColumnClass::DateTime => {
                decode_temporal::<NaiveDateTime>(row, index, class, Value::DateTime)
            }
            // TIME spans -838:59:59 to 838:59:59, wider than a time of day
            ColumnClass::Time => row
                .try_get_unchecked::<MySqlTime, _>(index)
                .map(|t| Value::Text(t.to_string())),
            ColumnClass::Binary => row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes),
            ColumnClass::Text => row.try_get_unchecked::<String, _>(index).map(Value::Text),
        }
        .map_err(|e| decode_error(name, e))?;
        out.push(name, value);
    }
    Ok(out)
}

#[async_trait]
impl Store for MySqlStore {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn fetch(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let rows = build_query(statement).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> StoreResult<u64> {
        // DDL goes through the text protocol; not every statement is preparable
        let result = if statement.params().is_empty() {
            sqlx::raw_sql(statement.sql()).execute(&self.pool).await?
        } else {
            build_query(statement).execute(&self.pool).await?
        };
        Ok(result.rows_affected())
    }
}
