//! The archival engine.
//!
//! [`Archiver`] pages through root tables, moving each matching row and its
//! associated child rows from the live store to the archive store. Each
//! archive table is reconciled with its live counterpart by the
//! [`SchemaReconciler`] before its first row is written.

mod catalog;
mod engine;
mod error;
mod mover;
mod schema;

pub use catalog::Catalog;
pub use engine::{ArchiveOptions, Archiver};
pub use error::{ArchiveError, ArchiveFailure, ErrorKind, SchemaError};
pub use schema::{
    ColumnChange, ColumnDefinition, ColumnPosition, SchemaPlan, SchemaReconciler, diff_columns,
};

pub use crate::config::{AssociationDescriptor, TableDescriptor};
