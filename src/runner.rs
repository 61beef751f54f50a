//! Sequential statement runner.
//!
//! Opens one handle, runs each statement in order, reports every outcome to
//! an [`OutcomeSink`] and closes the handle once. A statement failure is
//! reported and the run moves on; open and close failures end the run.
//!
//! The same runner is offered three ways: [`run_blocking`],
//! [`run_with_callbacks`] and [`run_async`]. For the same statements all
//! three report the same outcomes in the same order.

use crate::asynchronous::{AsyncDatabase, StatementExecutor};
use crate::callback::CallbackDatabase;
use crate::error::{Error, Result, StatementError};
use crate::sqlite::{Database, MutationResult, Record, SqlQuery, SqliteConfig};

/// One scheduled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Non-query statement, yields a [`MutationResult`].
    Execute(SqlQuery),
    /// Query statement, yields the full row set.
    Query(SqlQuery),
}

impl Statement {
    pub fn execute(query: impl Into<SqlQuery>) -> Self {
        Statement::Execute(query.into())
    }

    pub fn query(query: impl Into<SqlQuery>) -> Self {
        Statement::Query(query.into())
    }

    pub fn sql_query(&self) -> &SqlQuery {
        match self {
            Statement::Execute(query) | Statement::Query(query) => query,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql_query().statement
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Statement::Query(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Mutation(MutationResult),
    Rows(Vec<Record>),
    Failed(StatementError),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Counts for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub statements: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        self.statements += 1;
        if outcome.is_failure() {
            self.failed += 1;
        }
    }
}

/// Receives each statement's outcome as soon as it is known.
///
/// Called on whatever thread completed the statement; implementations must
/// return promptly.
pub trait OutcomeSink {
    fn report(&mut self, index: usize, statement: &Statement, outcome: &Outcome);
}

impl<F> OutcomeSink for F
where
    F: FnMut(usize, &Statement, &Outcome),
{
    fn report(&mut self, index: usize, statement: &Statement, outcome: &Outcome) {
        self(index, statement, outcome)
    }
}

/// Keeps every outcome in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSink {
    pub outcomes: Vec<Outcome>,
}

impl OutcomeSink for RecordingSink {
    fn report(&mut self, _index: usize, _statement: &Statement, outcome: &Outcome) {
        self.outcomes.push(outcome.clone());
    }
}

/// Writes outcomes to the `log` facade.
#[derive(Debug, Clone)]
pub struct LogSink {
    label: String,
}

impl LogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl OutcomeSink for LogSink {
    fn report(&mut self, index: usize, statement: &Statement, outcome: &Outcome) {
        match outcome {
            Outcome::Mutation(result) => log::info!(
                "[{}] #{index} ok: last_insert_id={} changes={} ({})",
                self.label,
                result.last_insert_id,
                result.changes,
                statement.sql()
            ),
            Outcome::Rows(rows) => log::info!(
                "[{}] #{index} ok: {} rows ({})",
                self.label,
                rows.len(),
                statement.sql()
            ),
            Outcome::Failed(err) => log::error!(
                "[{}] #{index} failed: {err} ({})",
                self.label,
                statement.sql()
            ),
        }
    }
}

/// Statement failures become outcomes; anything else ends the run.
fn capture<T>(result: Result<T>, wrap: impl FnOnce(T) -> Outcome) -> Result<Outcome> {
    match result {
        Ok(value) => Ok(wrap(value)),
        Err(Error::Statement(err)) => Ok(Outcome::Failed(err)),
        Err(err) => Err(err),
    }
}

/// Close after an aborted run. The abort reason wins over any close error.
fn close_after_abort(closed: Result<()>, reason: Error) -> Error {
    match closed {
        Ok(()) | Err(Error::HandleClosed) => {}
        Err(err) => log::warn!("close after aborted run failed: {err}"),
    }
    reason
}

/// Run `statements` with blocking calls.
pub fn run_blocking<S>(
    config: &SqliteConfig,
    statements: &[Statement],
    sink: &mut S,
) -> Result<RunSummary>
where
    S: OutcomeSink + ?Sized,
{
    let mut db = Database::open(config)?;
    let mut summary = RunSummary::default();
    for (index, statement) in statements.iter().enumerate() {
        let outcome = match statement {
            Statement::Execute(query) => capture(db.execute(query), Outcome::Mutation),
            Statement::Query(query) => capture(db.query(query), Outcome::Rows),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return Err(close_after_abort(db.close(), err)),
        };
        summary.record(&outcome);
        sink.report(index, statement, &outcome);
    }
    db.close()?;
    Ok(summary)
}

/// Run `statements` through awaitable operations.
pub async fn run_async<S>(
    config: &SqliteConfig,
    statements: &[Statement],
    sink: &mut S,
) -> Result<RunSummary>
where
    S: OutcomeSink + ?Sized,
{
    let db = AsyncDatabase::open(config)?;
    execute_all(&db, statements, sink).await
}

/// Drive an already opened executor through `statements`, then close it.
pub async fn execute_all<E, S>(
    executor: &E,
    statements: &[Statement],
    sink: &mut S,
) -> Result<RunSummary>
where
    E: StatementExecutor + ?Sized,
    S: OutcomeSink + ?Sized,
{
    let mut summary = RunSummary::default();
    for (index, statement) in statements.iter().enumerate() {
        let outcome = match statement {
            Statement::Execute(query) => capture(executor.execute(query.clone()).await, Outcome::Mutation),
            Statement::Query(query) => capture(executor.query(query.clone()).await, Outcome::Rows),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return Err(close_after_abort(executor.close().await, err)),
        };
        summary.record(&outcome);
        sink.report(index, statement, &outcome);
    }
    executor.close().await?;
    Ok(summary)
}

/// Run `statements` by chaining completion callbacks.
///
/// Returns immediately. `done` is called exactly once, after the handle has
/// been closed (or as soon as the run fails), and gets the sink back.
pub fn run_with_callbacks<S, F>(config: &SqliteConfig, statements: Vec<Statement>, sink: S, done: F)
where
    S: OutcomeSink + Send + 'static,
    F: FnOnce(Result<RunSummary>, S) + Send + 'static,
{
    match CallbackDatabase::open(config) {
        Ok(db) => CallbackRun {
            db,
            pending: statements.into_iter(),
            index: 0,
            sink,
            summary: RunSummary::default(),
            done,
        }
        .advance(),
        Err(err) => done(Err(err), sink),
    }
}

struct CallbackRun<S, F> {
    db: CallbackDatabase,
    pending: std::vec::IntoIter<Statement>,
    index: usize,
    sink: S,
    summary: RunSummary,
    done: F,
}

impl<S, F> CallbackRun<S, F>
where
    S: OutcomeSink + Send + 'static,
    F: FnOnce(Result<RunSummary>, S) + Send + 'static,
{
    fn advance(mut self) {
        let db = self.db.clone();
        let Some(statement) = self.pending.next() else {
            db.close(move |result| {
                let CallbackRun { sink, summary, done, .. } = self;
                done(result.map(|()| summary), sink);
            });
            return;
        };

        let query = statement.sql_query().clone();
        if statement.is_query() {
            db.query(query, move |result| {
                self.resume(statement, capture(result, Outcome::Rows))
            });
        } else {
            db.execute(query, move |result| {
                self.resume(statement, capture(result, Outcome::Mutation))
            });
        }
    }

    fn resume(mut self, statement: Statement, outcome: Result<Outcome>) {
        match outcome {
            Ok(outcome) => {
                self.summary.record(&outcome);
                self.sink.report(self.index, &statement, &outcome);
                self.index += 1;
                self.advance();
            }
            Err(err) => {
                let CallbackRun { db, sink, done, .. } = self;
                db.close(move |closed| done(Err(close_after_abort(closed, err)), sink));
            }
        }
    }
}
