//! Archive table structure reconciliation.
//!
//! Before the first row of a table is written in a run, the archive copy of
//! the table is brought in line with the live one. Changes are additive:
//! missing columns are created and columns whose name, type or nullability
//! drifted are altered in place. Columns are never dropped and keys are
//! never touched.

use std::sync::Arc;

use super::SchemaError;
use crate::store::{Dialect, Row, Statement, Store, Value, quote::quote_text};

/// One column as reported by the store's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full column type as the store spells it, e.g. `int(11) unsigned`.
    pub data_type: String,
    pub nullable: bool,
    /// 1-based ordinal position.
    pub position: u32,
    pub primary_key: bool,
    /// Default expression as reported by the store, if any.
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            position: 0,
            primary_key: false,
            default: None,
        }
    }

    /// Parse one row of [`Dialect::describe_columns`] output.
    pub fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let text = |column: &str| -> Result<String, SchemaError> {
            row.get(column)
                .and_then(Value::as_text)
                .map(|s| s.into_owned())
                .ok_or_else(|| SchemaError::Malformed(format!("missing '{column}'")))
        };

        let name = text("name")?;
        let data_type = text("data_type")?;
        let nullable = text("nullable")?.eq_ignore_ascii_case("YES");
        let primary_key = text("column_key")?.eq_ignore_ascii_case("PRI");
        let default = match row.get("column_default") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_text()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|| value.to_string()),
            ),
        };
        let position = row
            .get("position")
            .and_then(Value::as_i64)
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(|| SchemaError::Malformed(format!("bad position for column '{name}'")))?;

        Ok(Self {
            name,
            data_type,
            nullable,
            position,
            primary_key,
            default,
        })
    }

    /// Name, type and nullability are the attributes that must agree.
    fn matches(&self, other: &ColumnDefinition) -> bool {
        self.name == other.name
            && self.data_type.eq_ignore_ascii_case(&other.data_type)
            && self.nullable == other.nullable
    }

    fn same_name(&self, other: &ColumnDefinition) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    fn to_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!("{} {}", dialect.ident(&self.name), self.data_type);
        sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_sql(dialect, default));
        }
        sql
    }
}

/// SQLite reports defaults as the original expression text; MySQL reports
/// the bare value.
fn default_sql(dialect: Dialect, default: &str) -> String {
    match dialect {
        Dialect::Sqlite => default.to_string(),
        Dialect::MySql => {
            let upper = default.to_ascii_uppercase();
            if upper.starts_with("CURRENT_TIMESTAMP") || upper == "NULL" {
                default.to_string()
            } else {
                quote_text(default)
            }
        }
    }
}

/// Where a created or altered column goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnPosition {
    First,
    After(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnChange {
    /// Column absent from the archive table.
    Create {
        column: ColumnDefinition,
        position: ColumnPosition,
    },
    /// Column present under `previous_name` (matched case-insensitively) but
    /// with a different name, type or nullability.
    Alter {
        previous_name: String,
        column: ColumnDefinition,
        position: ColumnPosition,
    },
}

impl ColumnChange {
    pub fn column(&self) -> &ColumnDefinition {
        match self {
            ColumnChange::Create { column, .. } | ColumnChange::Alter { column, .. } => column,
        }
    }
}

/// Changes that make `archive` accept every column of `live`, in live
/// column order.
///
/// Each change is anchored after the live column preceding it, whether or
/// not that column itself changed, so column order follows the live table.
pub fn diff_columns(live: &[ColumnDefinition], archive: &[ColumnDefinition]) -> Vec<ColumnChange> {
    let mut changes = Vec::new();
    let mut previous: Option<&str> = None;

    for column in live {
        let position = match previous {
            None => ColumnPosition::First,
            Some(name) => ColumnPosition::After(name.to_string()),
        };
        match archive.iter().find(|a| a.same_name(column)) {
            None => changes.push(ColumnChange::Create {
                column: column.clone(),
                position,
            }),
            Some(existing) if !existing.matches(column) => changes.push(ColumnChange::Alter {
                previous_name: existing.name.clone(),
                column: column.clone(),
                position,
            }),
            Some(_) => {}
        }
        previous = Some(&column.name);
    }
    changes
}

/// What reconciling one table would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPlan {
    pub table: String,
    /// Whether the archive table already exists.
    pub archive_exists: bool,
    pub live_columns: Vec<ColumnDefinition>,
    pub archive_columns: Vec<ColumnDefinition>,
    pub changes: Vec<ColumnChange>,
}

impl SchemaPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// DDL that carries out the plan on an archive store of `dialect`.
    ///
    /// MySQL gets a single composite statement. SQLite can only add or
    /// rename one column per `ALTER TABLE`, appends added columns at the end
    /// and cannot change a column's type or nullability at all.
    pub fn statements(
        &self,
        dialect: Dialect,
        engine: Option<&str>,
    ) -> Result<Vec<Statement>, SchemaError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if !self.archive_exists {
            return Ok(vec![self.create_table(dialect, engine)]);
        }
        match dialect {
            Dialect::MySql => Ok(vec![self.mysql_alter()]),
            Dialect::Sqlite => self.sqlite_alters(),
        }
    }

    fn create_table(&self, dialect: Dialect, engine: Option<&str>) -> Statement {
        let mut parts: Vec<String> = self
            .changes
            .iter()
            .map(|change| change.column().to_sql(dialect))
            .collect();

        let keys: Vec<String> = self
            .live_columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| dialect.ident(&c.name))
            .collect();
        if !keys.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.ident(&self.table),
            parts.join(", ")
        );
        if let (Dialect::MySql, Some(engine)) = (dialect, engine) {
            sql.push_str(" ENGINE=");
            sql.push_str(engine);
        }
        Statement::new(sql)
    }

    fn mysql_alter(&self) -> Statement {
        let dialect = Dialect::MySql;
        let clauses: Vec<String> = self
            .changes
            .iter()
            .map(|change| {
                let (head, column, position) = match change {
                    ColumnChange::Create { column, position } => {
                        ("ADD COLUMN".to_string(), column, position)
                    }
                    ColumnChange::Alter {
                        previous_name,
                        column,
                        position,
                    } => (
                        format!("CHANGE COLUMN {}", dialect.ident(previous_name)),
                        column,
                        position,
                    ),
                };
                let position = match position {
                    ColumnPosition::First => "FIRST".to_string(),
                    ColumnPosition::After(name) => format!("AFTER {}", dialect.ident(name)),
                };
                format!("{head} {} {position}", column.to_sql(dialect))
            })
            .collect();

        Statement::new(format!(
            "ALTER TABLE {} {}",
            dialect.ident(&self.table),
            clauses.join(", ")
        ))
    }

    fn sqlite_alters(&self) -> Result<Vec<Statement>, SchemaError> {
        let dialect = Dialect::Sqlite;
        let table = dialect.ident(&self.table);
        self.changes
            .iter()
            .map(|change| match change {
                ColumnChange::Create { column, .. } => {
                    if column.primary_key {
                        return Err(SchemaError::Unsupported(format!(
                            "SQLite cannot add primary key column '{}' to an existing table",
                            column.name
                        )));
                    }
                    if !column.nullable && column.default.is_none() {
                        return Err(SchemaError::Unsupported(format!(
                            "SQLite cannot add NOT NULL column '{}' without a default",
                            column.name
                        )));
                    }
                    Ok(Statement::new(format!(
                        "ALTER TABLE {table} ADD COLUMN {}",
                        column.to_sql(dialect)
                    )))
                }
                ColumnChange::Alter {
                    previous_name,
                    column,
                    ..
                } => {
                    let rename_only = self
                        .archive_columns
                        .iter()
                        .find(|a| &a.name == previous_name)
                        .is_some_and(|a| {
                            a.data_type.eq_ignore_ascii_case(&column.data_type)
                                && a.nullable == column.nullable
                        });
                    if rename_only {
                        Ok(Statement::new(format!(
                            "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                            dialect.ident(previous_name),
                            dialect.ident(&column.name)
                        )))
                    } else {
                        Err(SchemaError::Unsupported(format!(
                            "SQLite cannot change column '{previous_name}' to {}",
                            column.to_sql(dialect)
                        )))
                    }
                }
            })
            .collect()
    }
}

/// Column structure of `table` on one side, empty when the table does not
/// exist.
async fn describe_table(
    store: &dyn Store,
    table: &str,
    side: &'static str,
) -> Result<Vec<ColumnDefinition>, SchemaError> {
    let statement = store.dialect().describe_columns(table);
    let rows = store
        .fetch(&statement)
        .await
        .map_err(|source| SchemaError::Describe { side, source })?;
    rows.iter().map(ColumnDefinition::from_row).collect()
}

/// Compares and aligns archive tables with their live counterparts.
#[derive(Clone)]
pub struct SchemaReconciler {
    live: Arc<dyn Store>,
    archive: Arc<dyn Store>,
    engine: Option<String>,
}

impl SchemaReconciler {
    pub fn new(live: Arc<dyn Store>, archive: Arc<dyn Store>) -> Self {
        Self {
            live,
            archive,
            engine: None,
        }
    }

    /// Storage engine for tables created on a MySQL archive.
    pub fn with_engine(mut self, engine: Option<String>) -> Self {
        self.engine = engine;
        self
    }

    /// Work out what `table` needs without changing anything.
    pub async fn plan(&self, table: &str) -> Result<SchemaPlan, SchemaError> {
        let live_columns = describe_table(self.live.as_ref(), table, "live").await?;
        if live_columns.is_empty() {
            return Err(SchemaError::MissingLiveTable);
        }
        let archive_columns = describe_table(self.archive.as_ref(), table, "archive").await?;

        let changes = diff_columns(&live_columns, &archive_columns);
        Ok(SchemaPlan {
            table: table.to_string(),
            archive_exists: !archive_columns.is_empty(),
            live_columns,
            archive_columns,
            changes,
        })
    }

    /// DDL for a plan, spelled for the archive store.
    pub fn statements(&self, plan: &SchemaPlan) -> Result<Vec<Statement>, SchemaError> {
        plan.statements(self.archive.dialect(), self.engine.as_deref())
    }

    /// Plan and apply the changes for `table`, returning what was done.
    pub async fn reconcile(&self, table: &str) -> Result<SchemaPlan, SchemaError> {
        let plan = self.plan(table).await?;
        for statement in self.statements(&plan)? {
            tracing::info!(table, sql = %statement, "Updating archive table structure");
            self.archive
                .execute(&statement)
                .await
                .map_err(|source| SchemaError::Apply {
                    statement: statement.to_literal_sql(),
                    source,
                })?;
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnDefinition {
        ColumnDefinition::new(name, data_type, nullable)
    }

    fn cdr_live() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition {
                primary_key: true,
                ..column("cd_id", "int(11)", false)
            },
            column("cd_bnum", "varchar(20)", true),
            ColumnDefinition {
                default: Some("CURRENT_TIMESTAMP".into()),
                ..column("cd_start", "datetime", false)
            },
        ]
    }

    fn plan(live: Vec<ColumnDefinition>, archive: Vec<ColumnDefinition>) -> SchemaPlan {
        let changes = diff_columns(&live, &archive);
        SchemaPlan {
            table: "cdr".into(),
            archive_exists: !archive.is_empty(),
            live_columns: live,
            archive_columns: archive,
            changes,
        }
    }

    #[test]
    fn test_identical_tables_need_nothing() {
        assert!(diff_columns(&cdr_live(), &cdr_live()).is_empty());
    }

    #[test]
    fn test_diff_classifies_and_anchors_changes() {
        let live = cdr_live();
        let archive = vec![
            column("CD_ID", "int(11)", false),
            column("cd_bnum", "varchar(10)", true),
        ];

        let changes = diff_columns(&live, &archive);
        assert_eq!(changes.len(), 3);
        assert!(matches!(
            &changes[0],
            ColumnChange::Alter { previous_name, position: ColumnPosition::First, .. }
                if previous_name == "CD_ID"
        ));
        assert!(matches!(
            &changes[1],
            ColumnChange::Alter { position: ColumnPosition::After(after), column, .. }
                if after == "cd_id" && column.data_type == "varchar(20)"
        ));
        assert!(matches!(
            &changes[2],
            ColumnChange::Create { position: ColumnPosition::After(after), .. }
                if after == "cd_bnum"
        ));
    }

    #[test]
    fn test_type_case_and_extra_archive_columns_ignored() {
        let live = vec![column("cd_id", "INT(11)", false)];
        let archive = vec![
            column("cd_id", "int(11)", false),
            column("cd_legacy", "text", true),
        ];
        assert!(diff_columns(&live, &archive).is_empty());
    }

    #[test]
    fn test_mysql_create_table() {
        let statements = plan(cdr_live(), vec![])
            .statements(Dialect::MySql, Some("MyISAM"))
            .unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql(),
            "CREATE TABLE IF NOT EXISTS `cdr` (`cd_id` int(11) NOT NULL, \
             `cd_bnum` varchar(20) NULL, \
             `cd_start` datetime NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             PRIMARY KEY (`cd_id`)) ENGINE=MyISAM"
        );
    }

    #[test]
    fn test_mysql_create_table_uses_server_default_engine() {
        let statements = plan(cdr_live(), vec![])
            .statements(Dialect::MySql, None)
            .unwrap();
        assert!(statements[0].sql().ends_with("PRIMARY KEY (`cd_id`))"));
    }

    #[test]
    fn test_mysql_composite_alter() {
        let mut live = cdr_live();
        live[1].default = Some("it's".into());
        let archive = vec![column("cd_id", "int(11)", false), column("CD_BNUM", "varchar(20)", true)];

        let statements = plan(live, archive).statements(Dialect::MySql, None).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql(),
            r"ALTER TABLE `cdr` CHANGE COLUMN `CD_BNUM` `cd_bnum` varchar(20) NULL DEFAULT 'it\'s' AFTER `cd_id`, ADD COLUMN `cd_start` datetime NOT NULL DEFAULT CURRENT_TIMESTAMP AFTER `cd_bnum`"
        );
    }

    #[test]
    fn test_sqlite_adds_one_column_per_statement() {
        let live = vec![
            ColumnDefinition {
                primary_key: true,
                ..column("o_id", "INTEGER", true)
            },
            column("o_region", "TEXT", true),
            ColumnDefinition {
                default: Some("0".into()),
                ..column("o_total", "REAL", false)
            },
        ];
        let archive = vec![live[0].clone()];

        let statements = plan(live, archive)
            .statements(Dialect::Sqlite, Some("MyISAM"))
            .unwrap();
        let sql: Vec<_> = statements.iter().map(Statement::sql).collect();
        assert_eq!(
            sql,
            [
                "ALTER TABLE \"cdr\" ADD COLUMN \"o_region\" TEXT NULL",
                "ALTER TABLE \"cdr\" ADD COLUMN \"o_total\" REAL NOT NULL DEFAULT 0",
            ]
        );
    }

    #[test]
    fn test_sqlite_rename_only() {
        let live = vec![column("o_id", "INTEGER", true)];
        let archive = vec![column("O_ID", "integer", true)];
        let statements = plan(live, archive).statements(Dialect::Sqlite, None).unwrap();
        assert_eq!(
            statements[0].sql(),
            "ALTER TABLE \"cdr\" RENAME COLUMN \"O_ID\" TO \"o_id\""
        );
    }

    #[test]
    fn test_sqlite_type_change_unsupported() {
        let live = vec![column("o_id", "INTEGER", true)];
        let archive = vec![column("o_id", "TEXT", true)];
        let result = plan(live, archive).statements(Dialect::Sqlite, None);
        assert!(matches!(result, Err(SchemaError::Unsupported(_))));
    }

    #[test]
    fn test_sqlite_not_null_without_default_unsupported() {
        let live = vec![column("a", "INTEGER", true), column("b", "TEXT", false)];
        let archive = vec![column("a", "INTEGER", true)];
        let result = plan(live, archive).statements(Dialect::Sqlite, None);
        assert!(matches!(result, Err(SchemaError::Unsupported(msg)) if msg.contains("'b'")));
    }

    #[test]
    fn test_column_from_describe_row() {
        let row = Row::new()
            .with("name", "cd_id")
            .with("data_type", Value::Bytes(b"int(11) unsigned".to_vec()))
            .with("nullable", "NO")
            .with("column_key", "PRI")
            .with("column_default", Value::Null)
            .with("position", Value::UInt(1));

        let column = ColumnDefinition::from_row(&row).unwrap();
        assert_eq!(column.name, "cd_id");
        assert_eq!(column.data_type, "int(11) unsigned");
        assert!(!column.nullable);
        assert!(column.primary_key);
        assert_eq!(column.default, None);
        assert_eq!(column.position, 1);
    }

    #[test]
    fn test_malformed_describe_row() {
        let row = Row::new().with("name", "cd_id");
        assert!(matches!(
            ColumnDefinition::from_row(&row),
            Err(SchemaError::Malformed(_))
        ));
    }
}
