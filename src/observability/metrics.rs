//! Archive run counters.
//!
//! Counters are emitted through the `metrics` facade when the `metrics`
//! feature is enabled and compile to nothing otherwise. Installing a
//! recorder is left to the embedding application.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Record rows moved from live to archive.
///
/// # Arguments
/// * `table` - The table the rows were moved out of (e.g., "cdr", "cdr_notes")
/// * `count` - The number of rows moved
pub fn record_archived(table: &str, count: u64) {
    #[cfg(feature = "metrics")]
    {
        counter!(
            "archive_records_total",
            "table" => table.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (table, count);
    }
}

/// Record a failed archive run.
///
/// # Arguments
/// * `kind` - Failure class (config, fetch, write, schema, cancelled)
pub fn record_archive_failure(kind: &str) {
    #[cfg(feature = "metrics")]
    {
        counter!(
            "archive_failures_total",
            "kind" => kind.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = kind;
    }
}

/// Record column changes applied to an archive table.
pub fn record_schema_change(table: &str, changes: u64) {
    #[cfg(feature = "metrics")]
    {
        counter!(
            "archive_schema_changes_total",
            "table" => table.to_string()
        )
        .increment(changes);
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (table, changes);
    }
}
