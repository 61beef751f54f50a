//! Sequential SQLite statement runner.
//!
//! # Intention
//!
//! - Run an ordered list of statements against one embedded database handle,
//!   reporting each outcome and closing the handle exactly once.
//! - Offer the same three primitives (`execute`, `query`, `close`) as
//!   blocking calls, completion callbacks and awaitable futures, all backed
//!   by a single implementation.
//!
//! # Architectural Boundaries
//!
//! - [`sqlite`] holds the blocking primitives; every other convention
//!   delegates to it.
//! - [`callback`] and [`asynchronous`] are calling-convention adapters only.
//! - [`runner`] decides what is fatal; [`demo`] is presentation.

pub mod asynchronous;
pub mod callback;
pub mod demo;
pub mod error;
pub mod runner;
pub mod sqlite;

pub use asynchronous::{AsyncDatabase, StatementExecutor};
pub use callback::CallbackDatabase;
pub use error::{Error, Result, StatementError};
pub use runner::{
    execute_all, run_async, run_blocking, run_with_callbacks, LogSink, Outcome, OutcomeSink, RecordingSink,
    RunSummary, Statement,
};
pub use sqlite::{Database, MutationResult, Params, Record, SqlQuery, SqliteConfig, Value};
