//! Test harness for archive engine testing
//!
//! Provides utilities for setting up test stores:
//! - SQLite: Fast in-memory databases
//! - MySQL: Testcontainers-based instance (ignored by default)
//! - A recording wrapper that logs statements and injects faults

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "database-sqlite")]
use crate::store::SqliteStore;
use crate::store::{Dialect, Row, Statement, Store, StoreError, StoreResult, Value};

/// Create an in-memory SQLite store for testing
#[cfg(feature = "database-sqlite")]
pub async fn create_sqlite_store() -> SqliteStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    SqliteStore::new(pool)
}

/// Execute each `;`-separated statement of a setup script
pub async fn exec_script(store: &dyn Store, script: &str) {
    for sql in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        store
            .execute(&Statement::new(sql))
            .await
            .unwrap_or_else(|e| panic!("setup statement failed: {sql}: {e}"));
    }
}

/// Integer values of `column`, ascending
pub async fn int_column(store: &dyn Store, table: &str, column: &str) -> Vec<i64> {
    let dialect = store.dialect();
    let column = dialect.ident(column);
    let sql = format!("SELECT {column} FROM {} ORDER BY {column}", dialect.ident(table));
    store
        .fetch(&Statement::new(sql))
        .await
        .expect("Failed to read column")
        .iter()
        .map(|row| row.values().next().and_then(Value::as_i64).expect("integer column"))
        .collect()
}

/// Every row of `table`, ordered by `key`
pub async fn all_rows(store: &dyn Store, table: &str, key: &str) -> Vec<Row> {
    let dialect = store.dialect();
    let sql = format!(
        "SELECT * FROM {} ORDER BY {}",
        dialect.ident(table),
        dialect.ident(key)
    );
    store
        .fetch(&Statement::new(sql))
        .await
        .expect("Failed to read table")
}

/// Column names of `table`, empty if it does not exist
pub async fn column_names(store: &dyn Store, table: &str) -> Vec<String> {
    store
        .fetch(&store.dialect().describe_columns(table))
        .await
        .expect("Failed to describe table")
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_text).map(|s| s.into_owned()))
        .collect()
}

enum Trigger {
    /// Return an error instead of running the statement
    Fail,
    /// Report zero affected rows (or no rows) without running the statement
    Skip,
    /// Run the statement, then cancel the token
    Cancel(CancellationToken),
}

struct Hook {
    prefix: String,
    nth: usize,
    trigger: Trigger,
}

/// Store wrapper that records every statement and can misbehave on the
/// n-th statement starting with a given prefix.
pub struct RecordingStore {
    inner: Arc<dyn Store>,
    statements: Mutex<Vec<Statement>>,
    hooks: Mutex<Vec<Hook>>,
}

enum Outcome {
    Run,
    Fail,
    Skip,
}

impl RecordingStore {
    pub fn new(inner: impl Store + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(inner),
            statements: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Fail the `nth` (1-based) statement starting with `prefix`
    pub fn fail_on(&self, prefix: &str, nth: usize) {
        self.hook(prefix, nth, Trigger::Fail);
    }

    /// Pretend the `nth` statement starting with `prefix` matched nothing
    pub fn skip_on(&self, prefix: &str, nth: usize) {
        self.hook(prefix, nth, Trigger::Skip);
    }

    /// Cancel `token` once the `nth` statement starting with `prefix` ran
    pub fn cancel_after(&self, prefix: &str, nth: usize, token: CancellationToken) {
        self.hook(prefix, nth, Trigger::Cancel(token));
    }

    fn hook(&self, prefix: &str, nth: usize, trigger: Trigger) {
        self.hooks.lock().unwrap().push(Hook {
            prefix: prefix.to_string(),
            nth,
            trigger,
        });
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    /// Number of statements seen that start with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter(|s| starts_with(s, prefix))
            .count()
    }

    fn observe(&self, statement: &Statement) -> Outcome {
        let mut statements = self.statements.lock().unwrap();
        statements.push(statement.clone());

        let mut outcome = Outcome::Run;
        for hook in self.hooks.lock().unwrap().iter() {
            if !starts_with(statement, &hook.prefix) {
                continue;
            }
            let seen = statements
                .iter()
                .filter(|s| starts_with(s, &hook.prefix))
                .count();
            if seen != hook.nth {
                continue;
            }
            match &hook.trigger {
                Trigger::Fail => outcome = Outcome::Fail,
                Trigger::Skip => outcome = Outcome::Skip,
                Trigger::Cancel(token) => token.cancel(),
            }
        }
        outcome
    }
}

fn starts_with(statement: &Statement, prefix: &str) -> bool {
    statement
        .sql()
        .trim_start()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn injected(statement: &Statement) -> StoreError {
    StoreError::Internal(format!("injected failure: {}", statement.sql()))
}

#[async_trait]
impl Store for RecordingStore {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn fetch(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        match self.observe(statement) {
            Outcome::Run => self.inner.fetch(statement).await,
            Outcome::Fail => Err(injected(statement)),
            Outcome::Skip => Ok(Vec::new()),
        }
    }

    async fn execute(&self, statement: &Statement) -> StoreResult<u64> {
        match self.observe(statement) {
            Outcome::Run => self.inner.execute(statement).await,
            Outcome::Fail => Err(injected(statement)),
            Outcome::Skip => Ok(0),
        }
    }
}

/// MySQL test harness using testcontainers
#[cfg(feature = "database-mysql")]
pub mod mysql {
    use testcontainers_modules::{
        mysql::Mysql,
        testcontainers::{ContainerAsync, runners::AsyncRunner},
    };

    use crate::store::MySqlStore;

    /// Start a MySQL container holding a `live` and an `archive` database.
    /// The container is kept alive as long as the returned handle is held.
    ///
    /// The server runs without strict mode so legacy zero dates can be
    /// stored, as on the production CDR databases.
    pub async fn create_mysql_stores() -> (MySqlStore, MySqlStore, ContainerAsync<Mysql>) {
        let container = Mysql::default()
            .start()
            .await
            .expect("Failed to start MySQL container");

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("Failed to get port");

        let connect = |database: &str| {
            let url = format!("mysql://root@{host}:{port}/{database}");
            async move {
                sqlx::mysql::MySqlPoolOptions::new()
                    .max_connections(2)
                    .connect(&url)
                    .await
                    .expect("Failed to connect to MySQL")
            }
        };

        let admin = connect("test").await;
        for database in ["live", "archive"] {
            sqlx::raw_sql(&format!("CREATE DATABASE {database}"))
                .execute(&admin)
                .await
                .expect("Failed to create database");
        }
        sqlx::raw_sql("SET GLOBAL sql_mode = 'NO_ENGINE_SUBSTITUTION'")
            .execute(&admin)
            .await
            .expect("Failed to relax sql_mode");

        let live = MySqlStore::new(connect("live").await);
        let archive = MySqlStore::new(connect("archive").await);
        (live, archive, container)
    }
}
