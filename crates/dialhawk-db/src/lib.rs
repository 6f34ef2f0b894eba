//! Database layer for the Dialhawk platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, and embedded SQL migrations. Every table the dialer
//! touches — agents, leads, call attempts, call logs, dashboard stats,
//! and the durable dial job queue — is created through versioned
//! migrations owned by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: single-process deployment, no external
//!   database server. WAL allows concurrent readers with a single
//!   writer, which matches the dialer's access pattern (many workers
//!   reading policy, short atomic counter writes).
//! - **`r2d2` connection pool**: bounded connection reuse; call workers
//!   and the reset scheduler each check out a connection per operation.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
