//! The cascading archiver.
//!
//! A pass over a table selects matching rows a page at a time and moves each
//! one with the record mover, which in turn runs a pass over every child
//! table of the row. Rows are deleted from the live store only after their
//! archive insert and their whole cascade succeeded, so the first failure
//! leaves every earlier row fully moved and every later row untouched.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{ArchiveError, ArchiveFailure, Catalog, SchemaReconciler};
use crate::{
    config::{RunConfig, TableDescriptor},
    observability::metrics,
    store::{Predicate, Store},
};

/// Tunables for an [`Archiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Rows selected per page. A shorter page ends the pass.
    pub page_size: u32,
    /// Align each archive table with the live one before writing to it.
    pub reconcile_schema: bool,
    /// Storage engine for archive tables created on MySQL.
    pub engine: Option<String>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for ArchiveOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            page_size: config.page_size,
            reconcile_schema: config.reconcile_schema,
            engine: config.engine.clone(),
        }
    }
}

/// Moves rows, and the rows that depend on them, from a live store to an
/// archive store.
pub struct Archiver {
    pub(super) live: Arc<dyn Store>,
    pub(super) archive: Arc<dyn Store>,
    pub(super) catalog: Catalog,
    options: ArchiveOptions,
    cancel: CancellationToken,
}

impl Archiver {
    pub fn new(
        live: Arc<dyn Store>,
        archive: Arc<dyn Store>,
        catalog: Catalog,
        options: ArchiveOptions,
    ) -> Self {
        Self {
            live,
            archive,
            catalog,
            options: ArchiveOptions {
                page_size: options.page_size.max(1),
                ..options
            },
            cancel: CancellationToken::new(),
        }
    }

    /// Stop at the next page or row boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn reconciler(&self) -> SchemaReconciler {
        SchemaReconciler::new(self.live.clone(), self.archive.clone())
            .with_engine(self.options.engine.clone())
    }

    /// Archive every table in `tables`, in order, with its predicate.
    ///
    /// Nothing is touched unless every table has a predicate. The first
    /// failure stops the run; tables after it are not processed. Returns the
    /// number of records moved, including cascaded child records.
    pub async fn archive_all(&self, tables: &[TableDescriptor]) -> Result<u64, ArchiveFailure> {
        if let Some(table) = tables.iter().find(|t| t.predicate.is_none()) {
            let error = ArchiveError::MissingPredicate {
                table: table.name.clone(),
            };
            return Err(self.fail(error, &RunState::default()));
        }

        tracing::info!(tables = tables.len(), "Archive run started");
        let mut run = Run::new(self);
        for table in tables {
            let predicate = Predicate::expression(table.predicate.as_deref().unwrap_or_default());
            if let Err(error) = run
                .archive_root(&table.name, predicate, &table.primary_key_field)
                .await
            {
                return Err(self.fail(error, &run.state));
            }
        }

        tracing::info!(
            records = run.state.records_archived,
            tables = %run.state.summary(),
            "Archive run complete"
        );
        Ok(run.state.records_archived)
    }

    /// Archive the rows of one table matching `predicate`, cascading into
    /// its child tables.
    pub async fn archive_table(
        &self,
        table: &str,
        predicate: &Predicate,
        primary_key_field: &str,
    ) -> Result<u64, ArchiveFailure> {
        let mut run = Run::new(self);
        match run
            .archive_root(table, predicate.clone(), primary_key_field)
            .await
        {
            Ok(()) => Ok(run.state.records_archived),
            Err(error) => Err(self.fail(error, &run.state)),
        }
    }

    fn fail(&self, error: ArchiveError, state: &RunState) -> ArchiveFailure {
        tracing::error!(
            error = %error,
            kind = %error.kind(),
            records = state.records_archived,
            "Archive run failed"
        );
        metrics::record_archive_failure(error.kind().as_str());
        ArchiveFailure::new(error, state.records_archived)
    }
}

/// Counters for one invocation.
#[derive(Debug, Default)]
pub(super) struct RunState {
    pub(super) records_archived: u64,
    per_table: HashMap<String, u64>,
    reconciled: HashSet<String>,
}

impl RunState {
    pub(super) fn record_moved(&mut self, table: &str) {
        self.records_archived += 1;
        *self.per_table.entry(table.to_string()).or_default() += 1;
    }

    /// `table=count` pairs in name order, for the end-of-run log line.
    fn summary(&self) -> String {
        let mut counts: Vec<_> = self.per_table.iter().collect();
        counts.sort();
        counts
            .iter()
            .map(|(table, count)| format!("{table}={count}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One invocation of the archiver.
pub(super) struct Run<'a> {
    pub(super) archiver: &'a Archiver,
    pub(super) state: RunState,
}

impl<'a> Run<'a> {
    fn new(archiver: &'a Archiver) -> Self {
        Self {
            archiver,
            state: RunState::default(),
        }
    }

    async fn archive_root(
        &mut self,
        table: &str,
        predicate: Predicate,
        key_field: &str,
    ) -> Result<(), ArchiveError> {
        let before = self.state.records_archived;
        tracing::info!(
            table,
            predicate = %predicate.to_literal_sql(self.archiver.live.dialect()),
            "Archiving table"
        );

        // every table of the cascade is aligned before the first row moves
        let archiver = self.archiver;
        for name in archiver.catalog.cascade_of(table) {
            self.ensure_schema(name).await?;
        }

        self.archive_pass(table, predicate, key_field).await?;

        tracing::info!(
            table,
            records = self.state.records_archived - before,
            run_total = self.state.records_archived,
            "Table archived"
        );
        Ok(())
    }

    /// Page through `table` until a short page, moving every row.
    ///
    /// Boxed because the mover recurses back into it for child tables.
    pub(super) fn archive_pass<'b>(
        &'b mut self,
        table: &'b str,
        predicate: Predicate,
        key_field: &'b str,
    ) -> BoxFuture<'b, Result<(), ArchiveError>> {
        Box::pin(async move {
            self.ensure_schema(table).await?;

            let live = self.archiver.live.clone();
            let page_size = self.archiver.options.page_size;
            loop {
                self.check_cancelled()?;

                let statement = live.dialect().select_page(table, &predicate, page_size);
                tracing::debug!(table, sql = %statement, "Executed query");
                let rows = live
                    .fetch(&statement)
                    .await
                    .map_err(|source| ArchiveError::Fetch {
                        table: table.to_string(),
                        source,
                    })?;

                // rows leave the live table as they are moved, so the next
                // page starts where this one ended
                let fetched = rows.len();
                for row in rows {
                    self.check_cancelled()?;
                    self.move_record(table, key_field, row).await?;
                }

                if fetched < page_size as usize {
                    return Ok(());
                }
            }
        })
    }

    async fn ensure_schema(&mut self, table: &str) -> Result<(), ArchiveError> {
        if !self.archiver.options.reconcile_schema || self.state.reconciled.contains(table) {
            return Ok(());
        }

        let plan = self
            .archiver
            .reconciler()
            .reconcile(table)
            .await
            .map_err(|source| ArchiveError::Schema {
                table: table.to_string(),
                source,
            })?;
        if !plan.is_empty() {
            tracing::info!(
                table,
                changes = plan.changes.len(),
                created = !plan.archive_exists,
                "Archive table structure updated"
            );
            metrics::record_schema_change(table, plan.changes.len() as u64);
        }

        self.state.reconciled.insert(table.to_string());
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), ArchiveError> {
        if self.archiver.cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        Ok(())
    }
}
