use std::fmt;

use super::{Predicate, Statement, quote::quote_identifier};

/// SQL dialect spoken by a store.
///
/// The engine only ever builds a handful of statement shapes; this is where
/// their per-database spelling lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn identifier_quote(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Sqlite => '"',
        }
    }

    pub fn ident(self, name: &str) -> String {
        quote_identifier(self, name)
    }

    /// `SELECT * FROM table WHERE predicate LIMIT n`.
    ///
    /// There is no offset: every row returned is moved out of the live table
    /// before the next page is fetched, so the next page starts where this
    /// one ended.
    pub fn select_page(self, table: &str, predicate: &Predicate, limit: u32) -> Statement {
        let mut statement = Statement::new(format!("SELECT * FROM {} WHERE ", self.ident(table)));
        predicate.append_to(self, &mut statement);
        statement.push_sql(&format!(" LIMIT {limit}"));
        statement
    }

    /// Insert covering every column of the row, replacing any archived row
    /// with the same key.
    ///
    /// A row whose earlier move was archived but not purged is selected
    /// again on the next run; its second insert must not fail on the key.
    pub fn insert_row(self, table: &str, row: &super::Row) -> Statement {
        let columns = row
            .names()
            .map(|name| self.ident(name))
            .collect::<Vec<_>>()
            .join(",");
        let placeholders = vec!["?"; row.len()].join(",");
        let verb = match self {
            Dialect::MySql => "REPLACE INTO",
            Dialect::Sqlite => "INSERT OR REPLACE INTO",
        };
        Statement::with_params(
            format!(
                "{verb} {} ({columns}) VALUES ({placeholders})",
                self.ident(table)
            ),
            row.values().cloned().collect(),
        )
    }

    /// Delete exactly one row matched by key equality.
    pub fn delete_one(self, table: &str, key_field: &str, key: &super::Value) -> Statement {
        let table = self.ident(table);
        let key_field = self.ident(key_field);
        let sql = match self {
            Dialect::MySql => format!("DELETE FROM {table} WHERE {key_field} = ? LIMIT 1"),
            // SQLite is built without DELETE ... LIMIT unless compiled with
            // SQLITE_ENABLE_UPDATE_DELETE_LIMIT
            Dialect::Sqlite => format!(
                "DELETE FROM {table} WHERE rowid IN \
                 (SELECT rowid FROM {table} WHERE {key_field} = ? LIMIT 1)"
            ),
        };
        Statement::with_params(sql, vec![key.clone()])
    }

    /// Column structure of a table, one row per column in ordinal order.
    ///
    /// Returns no rows when the table does not exist. The result columns are
    /// normalised to `name`, `data_type`, `nullable`, `column_key`,
    /// `column_default` and `position` so a single parser handles both
    /// dialects.
    pub fn describe_columns(self, table: &str) -> Statement {
        let sql = match self {
            Dialect::MySql => {
                "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS data_type, \
                 IS_NULLABLE AS nullable, COLUMN_KEY AS column_key, \
                 COLUMN_DEFAULT AS column_default, ORDINAL_POSITION AS position \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION"
            }
            Dialect::Sqlite => {
                "SELECT name, type AS data_type, \
                 CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS nullable, \
                 CASE WHEN pk > 0 THEN 'PRI' ELSE '' END AS column_key, \
                 dflt_value AS column_default, cid + 1 AS position \
                 FROM pragma_table_info(?) ORDER BY cid"
            }
        };
        Statement::with_params(sql, vec![super::Value::from(table)])
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::MySql => f.write_str("mysql"),
            Dialect::Sqlite => f.write_str("sqlite"),
        }
    }
}
