//! Callback calling convention.
//!
//! A [`CallbackDatabase`] moves its [`Database`] onto a dedicated worker
//! thread. Requests are queued and run one at a time in submission order;
//! each completion is handed to the caller's callback on that thread. A
//! callback may submit the next request, which is how sequences are chained.

use crate::error::{Error, Result};
use crate::sqlite::{Database, MutationResult, Record, SqlQuery, SqliteConfig};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use std::thread;

/// Work item run on the worker. `None` means the worker is gone.
type Job = Box<dyn FnOnce(Option<&mut Database>) + Send>;

/// Handle to a database owned by a worker thread. Clones share the handle.
#[derive(Clone)]
pub struct CallbackDatabase {
    jobs: UnboundedSender<Job>,
}

impl CallbackDatabase {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let database = Database::open(config)?;
        Self::spawn(database)
    }

    /// Hand an already opened database to a new worker thread.
    pub fn spawn(database: Database) -> Result<Self> {
        let (jobs, queue) = unbounded();
        let path = database.path().to_string();
        thread::Builder::new()
            .name("sqlite-worker".to_string())
            .spawn(move || run_worker(database, queue))
            .map_err(|err| Error::Connection {
                path,
                message: format!("failed to start worker thread: {err}"),
            })?;
        Ok(Self { jobs })
    }

    pub fn execute<F>(&self, query: impl Into<SqlQuery>, callback: F)
    where
        F: FnOnce(Result<MutationResult>) + Send + 'static,
    {
        let query = query.into();
        self.submit(move |db| db.execute(query), callback);
    }

    pub fn query<F>(&self, query: impl Into<SqlQuery>, callback: F)
    where
        F: FnOnce(Result<Vec<Record>>) + Send + 'static,
    {
        let query = query.into();
        self.submit(move |db| db.query(query), callback);
    }

    /// Close the handle once every request queued before this one has run.
    pub fn close<F>(&self, callback: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.submit(Database::close, callback);
    }

    fn submit<T, Op, F>(&self, op: Op, callback: F)
    where
        Op: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let job: Job = Box::new(move |db: Option<&mut Database>| {
            let result = match db {
                Some(db) => op(db),
                None => Err(Error::HandleClosed),
            };
            callback(result);
        });
        if let Err(err) = self.jobs.unbounded_send(job) {
            log::debug!("sqlite worker is gone, failing request");
            (err.into_inner())(None);
        }
    }
}

fn run_worker(mut database: Database, mut queue: UnboundedReceiver<Job>) {
    log::debug!("sqlite worker started for {}", database.path());
    while let Some(job) = futures::executor::block_on(queue.next()) {
        job(Some(&mut database));
    }
    log::debug!("sqlite worker stopped for {}", database.path());
}
