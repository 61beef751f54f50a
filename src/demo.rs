//! The "books" scenario run under each calling convention.

use crate::error::{Error, Result};
use crate::runner::{self, Outcome, OutcomeSink, RunSummary, Statement};
use crate::sqlite::{Params, SqlQuery, SqliteConfig, Value};
use clap::ValueEnum;
use futures::channel::oneshot;
use std::fmt;

pub const CREATE_BOOKS: &str =
    "CREATE TABLE books (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL UNIQUE)";
pub const INSERT_BOOK: &str = "INSERT INTO books (title) VALUES (?1)";
pub const SELECT_TITLES: &str = "SELECT title FROM books";
pub const SELECT_AUTHORS: &str = "SELECT author FROM books";
pub const DROP_BOOKS: &str = "DROP TABLE books";

pub const BOOK_TITLE: &str = "The Hitchhiker's Guide to the Galaxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Every statement succeeds.
    Success,
    /// NOT NULL violation and unknown column, then cleanup.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Style {
    Blocking,
    Callback,
    Async,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Success => f.write_str("success"),
            Scenario::Failure => f.write_str("failure"),
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Style::Blocking => f.write_str("blocking"),
            Style::Callback => f.write_str("callback"),
            Style::Async => f.write_str("async"),
        }
    }
}

pub fn books_script(scenario: Scenario) -> Vec<Statement> {
    let title = match scenario {
        Scenario::Success => Value::from(BOOK_TITLE),
        Scenario::Failure => Value::Null,
    };
    let select = match scenario {
        Scenario::Success => SELECT_TITLES,
        Scenario::Failure => SELECT_AUTHORS,
    };
    vec![
        Statement::execute(CREATE_BOOKS),
        Statement::execute(SqlQuery::new(INSERT_BOOK).with_params(Params::new().with_positional(title))),
        Statement::query(select),
        Statement::execute(DROP_BOOKS),
    ]
}

/// Run `statements` with the given calling convention.
pub async fn run_style<S>(
    style: Style,
    config: &SqliteConfig,
    statements: Vec<Statement>,
    sink: S,
) -> (Result<RunSummary>, S)
where
    S: OutcomeSink + Default + Send + 'static,
{
    let mut sink = sink;
    match style {
        Style::Blocking => {
            let result = runner::run_blocking(config, &statements, &mut sink);
            (result, sink)
        }
        Style::Async => {
            let result = runner::run_async(config, &statements, &mut sink).await;
            (result, sink)
        }
        Style::Callback => {
            let (tx, rx) = oneshot::channel();
            runner::run_with_callbacks(config, statements, sink, move |result, sink| {
                let _ = tx.send((result, sink));
            });
            match rx.await {
                Ok(finished) => finished,
                Err(_canceled) => {
                    // The worker died before calling back and took the sink with it.
                    log::error!("callback run ended without reporting completion");
                    (Err(Error::HandleClosed), S::default())
                }
            }
        }
    }
}

/// Prints outcomes the way a console demo would: insert ids and row sets to
/// stdout, failure messages to stderr.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    label: String,
}

impl ConsoleSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl OutcomeSink for ConsoleSink {
    fn report(&mut self, _index: usize, statement: &Statement, outcome: &Outcome) {
        match outcome {
            Outcome::Mutation(result) => {
                if statement.sql().trim_start().to_ascii_uppercase().starts_with("INSERT") {
                    println!("[{}] {}", self.label, result.last_insert_id);
                }
            }
            Outcome::Rows(rows) => match serde_json::to_string(rows) {
                Ok(json) => println!("[{}] {json}", self.label),
                Err(err) => log::error!("failed to format rows: {err}"),
            },
            Outcome::Failed(err) => eprintln!("[{}] {}", self.label, err.message),
        }
    }
}
