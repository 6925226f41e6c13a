//! Archive runs against real stores.
//!
//! - **SQLite**: in-memory stores, run with every `cargo test`
//! - **MySQL**: testcontainers, run with `cargo test -- --ignored` (requires Docker)

pub mod harness;
