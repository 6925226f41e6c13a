//! Moves call-detail records and their dependent rows from a live database
//! to an archive database, keeping the archive schema in step.

pub mod archive;
pub mod config;
pub mod observability;
pub mod store;

#[cfg(test)]
mod tests;

pub use archive::{
    ArchiveError, ArchiveFailure, ArchiveOptions, Archiver, AssociationDescriptor, Catalog,
    ErrorKind, SchemaReconciler, TableDescriptor,
};
pub use config::{ArchiverConfig, ConfigError};
pub use store::{Dialect, Predicate, Row, Statement, Store, StoreError, Value};
