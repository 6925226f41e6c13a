//! The record mover: insert into archive, cascade, delete from live.

use super::{ArchiveError, engine::Run};
use crate::{
    observability::metrics,
    store::{Predicate, Row, StoreError, Value},
};

impl Run<'_> {
    /// Move one row of `table` out of the live store.
    ///
    /// The row is inserted into the archive, then every associated child
    /// row is archived, then the row is deleted from live by key. A failure
    /// after the insert leaves the row in both stores; nothing is undone.
    pub(super) async fn move_record(
        &mut self,
        table: &str,
        key_field: &str,
        row: Row,
    ) -> Result<(), ArchiveError> {
        let archiver = self.archiver;
        let key = row
            .get(key_field)
            .cloned()
            .ok_or_else(|| ArchiveError::MissingKey {
                table: table.to_string(),
                field: key_field.to_string(),
            })?;

        let insert = archiver.archive.dialect().insert_row(table, &row);
        tracing::debug!(table, sql = %insert, "Executed query");
        if let Err(source) = archiver.archive.execute(&insert).await {
            tracing::error!(table, key = %key, error = %source, "Unable to insert record");
            return Err(ArchiveError::Insert {
                table: table.to_string(),
                key: key.to_string(),
                source,
            });
        }

        for assoc in archiver.catalog.children_of(table) {
            let link = match row.get(&assoc.parent_link_field) {
                None => continue,
                // `= NULL` never matches
                Some(Value::Null) => {
                    tracing::debug!(
                        table,
                        child_table = %assoc.child_table,
                        link_field = %assoc.parent_link_field,
                        "Skipping cascade on null link"
                    );
                    continue;
                }
                Some(value) => value.clone(),
            };
            let predicate = Predicate::equals(&assoc.child_link_field, link);
            self.archive_pass(&assoc.child_table, predicate, &assoc.child_key_field)
                .await?;
        }

        let delete = archiver.live.dialect().delete_one(table, key_field, &key);
        tracing::debug!(table, sql = %delete, "Executed query");
        let purge_error = match archiver.live.execute(&delete).await {
            Ok(0) => Some(StoreError::NoRowsAffected),
            Ok(_) => None,
            Err(e) => Some(e),
        };
        if let Some(source) = purge_error {
            tracing::error!(table, key = %key, error = %source, "Unable to delete record");
            return Err(ArchiveError::Purge {
                table: table.to_string(),
                key: key.to_string(),
                source,
            });
        }

        self.state.record_moved(table);
        metrics::record_archived(table, 1);
        Ok(())
    }
}
