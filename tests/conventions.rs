use async_trait::async_trait;
use futures::channel::oneshot;
use rust_sqlite_runner::demo::{self, Scenario, Style};
use rust_sqlite_runner::{
    execute_all, run_async, run_blocking, run_with_callbacks, AsyncDatabase, CallbackDatabase, Error, LogSink,
    MutationResult, Outcome, Record, RecordingSink, Result, RunSummary, SqlQuery, SqliteConfig, Statement,
    StatementExecutor, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run_callbacks_to_completion(
    config: &SqliteConfig,
    statements: Vec<Statement>,
) -> (Result<RunSummary>, RecordingSink) {
    let (tx, rx) = oneshot::channel();
    run_with_callbacks(config, statements, RecordingSink::default(), move |result, sink| {
        let _ = tx.send((result, sink));
    });
    futures::executor::block_on(rx).unwrap()
}

fn assert_success_outcomes(outcomes: &[Outcome]) {
    assert_eq!(outcomes.len(), 4);
    assert!(matches!(outcomes[0], Outcome::Mutation(_)));
    assert_eq!(
        outcomes[1],
        Outcome::Mutation(MutationResult {
            last_insert_id: 1,
            changes: 1
        })
    );
    match &outcomes[2] {
        Outcome::Rows(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get("title"), Some(&Value::from(demo::BOOK_TITLE)));
        }
        other => panic!("expected rows, got {other:?}"),
    }
    // DROP writes no rows
    assert_eq!(
        outcomes[3],
        Outcome::Mutation(MutationResult {
            last_insert_id: 1,
            changes: 0
        })
    );
}

fn assert_failure_outcomes(outcomes: &[Outcome]) {
    assert_eq!(outcomes.len(), 4);
    assert!(matches!(outcomes[0], Outcome::Mutation(_)));
    match &outcomes[1] {
        Outcome::Failed(err) => assert!(err.message.contains("NOT NULL constraint failed"), "{}", err.message),
        other => panic!("expected failure, got {other:?}"),
    }
    match &outcomes[2] {
        Outcome::Failed(err) => assert!(err.message.contains("no such column: author"), "{}", err.message),
        other => panic!("expected failure, got {other:?}"),
    }
    // the handle survived both failures
    assert!(matches!(outcomes[3], Outcome::Mutation(_)));
}

#[test]
fn test_blocking_runner_success() {
    init_logging();
    let mut sink = RecordingSink::default();
    let summary = run_blocking(&SqliteConfig::in_memory(), &demo::books_script(Scenario::Success), &mut sink).unwrap();
    assert_eq!(summary, RunSummary { statements: 4, failed: 0 });
    assert_success_outcomes(&sink.outcomes);
}

#[test]
fn test_blocking_runner_continues_after_failures() {
    init_logging();
    let mut sink = RecordingSink::default();
    let summary = run_blocking(&SqliteConfig::in_memory(), &demo::books_script(Scenario::Failure), &mut sink).unwrap();
    assert_eq!(summary, RunSummary { statements: 4, failed: 2 });
    assert_failure_outcomes(&sink.outcomes);
}

#[test]
fn test_callback_runner_matches_blocking() {
    init_logging();
    for scenario in [Scenario::Success, Scenario::Failure] {
        let statements = demo::books_script(scenario);
        let mut blocking = RecordingSink::default();
        let expected = run_blocking(&SqliteConfig::in_memory(), &statements, &mut blocking).unwrap();

        let (summary, sink) = run_callbacks_to_completion(&SqliteConfig::in_memory(), statements);
        assert_eq!(summary.unwrap(), expected);
        assert_eq!(sink.outcomes, blocking.outcomes);
    }
}

#[tokio::test]
async fn test_all_styles_report_identical_outcomes() {
    init_logging();
    for scenario in [Scenario::Success, Scenario::Failure] {
        let mut observed = Vec::new();
        for style in [Style::Blocking, Style::Callback, Style::Async] {
            let (result, sink) = demo::run_style(
                style,
                &SqliteConfig::in_memory(),
                demo::books_script(scenario),
                RecordingSink::default(),
            )
            .await;
            result.unwrap();
            observed.push(sink.outcomes);
        }
        match scenario {
            Scenario::Success => assert_success_outcomes(&observed[0]),
            Scenario::Failure => assert_failure_outcomes(&observed[0]),
        }
        assert_eq!(observed[0], observed[1]);
        assert_eq!(observed[1], observed[2]);
    }
}

#[tokio::test]
async fn test_async_runner_with_closure_sink() {
    let mut indices = Vec::new();
    let mut sink = |index: usize, statement: &Statement, outcome: &Outcome| {
        assert_eq!(outcome.is_failure(), statement.is_query() || statement.sql().contains("INSERT"));
        indices.push(index);
    };
    let summary = run_async(&SqliteConfig::in_memory(), &demo::books_script(Scenario::Failure), &mut sink)
        .await
        .unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_log_sink_runs() {
    init_logging();
    let mut sink = LogSink::new("log");
    let summary = run_blocking(&SqliteConfig::in_memory(), &demo::books_script(Scenario::Failure), &mut sink).unwrap();
    assert_eq!(summary.statements, 4);
}

#[test]
fn test_open_failure_reports_nothing() {
    let config = SqliteConfig::new("/nonexistent-directory/nested/books.db");

    let mut sink = RecordingSink::default();
    let err = run_blocking(&config, &demo::books_script(Scenario::Success), &mut sink).unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert!(sink.outcomes.is_empty());

    let (result, sink) = run_callbacks_to_completion(&config, demo::books_script(Scenario::Success));
    assert!(matches!(result, Err(Error::Connection { .. })));
    assert!(sink.outcomes.is_empty());

    let mut sink = RecordingSink::default();
    let err = futures::executor::block_on(run_async(&config, &demo::books_script(Scenario::Success), &mut sink))
        .unwrap_err();
    assert!(err.is_connection_error());
    assert!(sink.outcomes.is_empty());
}

#[test]
fn test_callback_chaining() {
    let db = CallbackDatabase::open(&SqliteConfig::in_memory()).unwrap();
    let (tx, rx) = oneshot::channel();

    let next = db.clone();
    db.execute(demo::CREATE_BOOKS, move |created| {
        created.unwrap();
        let db = next.clone();
        next.execute(
            "INSERT INTO books (title) VALUES ('The Hitchhiker''s Guide to the Galaxy')",
            move |inserted| {
                let last_insert_id = inserted.unwrap().last_insert_id;
                let after = db.clone();
                db.query(demo::SELECT_TITLES, move |rows| {
                    let rows = rows.unwrap();
                    after.close(move |closed| {
                        let _ = tx.send((last_insert_id, rows, closed));
                    });
                });
            },
        );
    });

    let (last_insert_id, rows, closed) = futures::executor::block_on(rx).unwrap();
    assert_eq!(last_insert_id, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), Some(&Value::from(demo::BOOK_TITLE)));
    closed.unwrap();
}

#[test]
fn test_callback_requests_run_in_submission_order() {
    let db = CallbackDatabase::open(&SqliteConfig::in_memory()).unwrap();
    let ids = Arc::new(Mutex::new(Vec::new()));

    db.execute(demo::CREATE_BOOKS, |created| {
        created.unwrap();
    });
    for n in 0..50 {
        let ids = Arc::clone(&ids);
        db.execute(format!("INSERT INTO books (title) VALUES ('book {n}')"), move |inserted| {
            ids.lock().unwrap().push(inserted.unwrap().last_insert_id);
        });
    }
    let (tx, rx) = oneshot::channel();
    db.close(move |closed| {
        let _ = tx.send(closed);
    });
    futures::executor::block_on(rx).unwrap().unwrap();

    let ids = ids.lock().unwrap();
    assert_eq!(*ids, (1..=50).collect::<Vec<i64>>());
}

#[test]
fn test_callback_after_close_fails_with_handle_closed() {
    let db = CallbackDatabase::open(&SqliteConfig::in_memory()).unwrap();
    let (tx, rx) = oneshot::channel();

    db.close(|closed| closed.unwrap());
    db.query(demo::SELECT_TITLES, move |rows| {
        let _ = tx.send(rows);
    });

    let err = futures::executor::block_on(rx).unwrap().unwrap_err();
    assert!(matches!(err, Error::HandleClosed));
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_async_sequence_and_close() {
    let db = AsyncDatabase::open(&SqliteConfig::in_memory()).unwrap();

    db.execute(demo::CREATE_BOOKS).await.unwrap();
    let inserted = db
        .execute("INSERT INTO books (title) VALUES ('The Hitchhiker''s Guide to the Galaxy')")
        .await
        .unwrap();
    assert_eq!(inserted.last_insert_id, 1);

    let err = db.execute("INSERT INTO books (title) VALUES (NULL)").await.unwrap_err();
    assert!(err.to_string().contains("NOT NULL constraint failed"));

    let rows = db.query(demo::SELECT_TITLES).await.unwrap();
    assert_eq!(rows.len(), 1);

    db.execute(demo::DROP_BOOKS).await.unwrap();
    let err = db.execute(demo::DROP_BOOKS).await.unwrap_err();
    assert!(err.as_statement_error().is_some());

    db.close().await.unwrap();
    assert!(matches!(db.query(demo::SELECT_TITLES).await, Err(Error::HandleClosed)));
    assert!(matches!(db.execute(demo::DROP_BOOKS).await, Err(Error::HandleClosed)));
    assert!(matches!(db.close().await, Err(Error::HandleClosed)));
}

#[test]
fn test_async_without_tokio() {
    futures::executor::block_on(async {
        let db = AsyncDatabase::open(&SqliteConfig::in_memory()).unwrap();
        db.execute(demo::CREATE_BOOKS).await.unwrap();
        let err = db.query(demo::SELECT_AUTHORS).await.unwrap_err();
        assert!(err.to_string().contains("no such column: author"));
        db.close().await.unwrap();
    });
}

/// Delegates to a real database but can misbehave on request.
struct FaultyExecutor {
    inner: AsyncDatabase,
    fail_close: bool,
    lose_handle_on_query: bool,
    close_calls: AtomicUsize,
}

impl FaultyExecutor {
    fn new(fail_close: bool, lose_handle_on_query: bool) -> Self {
        Self {
            inner: AsyncDatabase::open(&SqliteConfig::in_memory()).unwrap(),
            fail_close,
            lose_handle_on_query,
            close_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StatementExecutor for FaultyExecutor {
    async fn execute(&self, query: SqlQuery) -> Result<MutationResult> {
        self.inner.execute(query).await
    }

    async fn query(&self, query: SqlQuery) -> Result<Vec<Record>> {
        if self.lose_handle_on_query {
            self.inner.close().await?;
        }
        self.inner.query(query).await
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let closed = self.inner.close().await;
        if self.fail_close {
            return Err(Error::Close {
                message: "disk I/O error".to_string(),
            });
        }
        closed
    }
}

#[tokio::test]
async fn test_close_failure_is_returned_after_all_outcomes() {
    let executor = FaultyExecutor::new(true, false);
    let mut sink = RecordingSink::default();

    let err = execute_all(&executor, &demo::books_script(Scenario::Success), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Close { .. }));
    assert_success_outcomes(&sink.outcomes);
    assert_eq!(executor.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lost_handle_aborts_the_run() {
    let executor = FaultyExecutor::new(false, true);
    let mut sink = RecordingSink::default();

    let err = execute_all(&executor, &demo::books_script(Scenario::Success), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HandleClosed));
    // create and insert were reported, the query and drop never ran
    assert_eq!(sink.outcomes.len(), 2);
    // close is still attempted, and its HandleClosed does not mask the abort
    assert_eq!(executor.close_calls.load(Ordering::SeqCst), 1);
}

/// Fails every request with `HandleClosed` without touching a real store.
#[derive(Default)]
struct VanishedExecutor {
    close_calls: AtomicUsize,
}

#[async_trait]
impl StatementExecutor for VanishedExecutor {
    async fn execute(&self, _query: SqlQuery) -> Result<MutationResult> {
        Err(Error::HandleClosed)
    }

    async fn query(&self, _query: SqlQuery) -> Result<Vec<Record>> {
        Err(Error::HandleClosed)
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Close {
            message: "disk I/O error".to_string(),
        })
    }
}

#[tokio::test]
async fn test_abort_reason_wins_over_close_failure() {
    let executor = VanishedExecutor::default();
    let mut sink = RecordingSink::default();

    let err = execute_all(&executor, &demo::books_script(Scenario::Success), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HandleClosed));
    assert!(sink.outcomes.is_empty());
    assert_eq!(executor.close_calls.load(Ordering::SeqCst), 1);
}
