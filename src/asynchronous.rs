//! Sequential-suspension calling convention.
//!
//! [`AsyncDatabase`] turns each [`CallbackDatabase`] completion into a
//! future. The futures do not depend on a particular runtime.

use crate::callback::CallbackDatabase;
use crate::error::{Error, Result};
use crate::sqlite::{MutationResult, Record, SqlQuery, SqliteConfig};
use async_trait::async_trait;
use futures::channel::oneshot;

/// The three statement primitives as awaitable operations.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, query: SqlQuery) -> Result<MutationResult>;
    async fn query(&self, query: SqlQuery) -> Result<Vec<Record>>;
    async fn close(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct AsyncDatabase {
    inner: CallbackDatabase,
}

impl AsyncDatabase {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        Ok(Self::from(CallbackDatabase::open(config)?))
    }

    pub async fn execute(&self, query: impl Into<SqlQuery>) -> Result<MutationResult> {
        let query = query.into();
        settle(|reply| self.inner.execute(query, reply)).await
    }

    pub async fn query(&self, query: impl Into<SqlQuery>) -> Result<Vec<Record>> {
        let query = query.into();
        settle(|reply| self.inner.query(query, reply)).await
    }

    /// Resolves once the store has finished closing.
    pub async fn close(&self) -> Result<()> {
        settle(|reply| self.inner.close(reply)).await
    }
}

impl From<CallbackDatabase> for AsyncDatabase {
    fn from(inner: CallbackDatabase) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StatementExecutor for AsyncDatabase {
    async fn execute(&self, query: SqlQuery) -> Result<MutationResult> {
        AsyncDatabase::execute(self, query).await
    }

    async fn query(&self, query: SqlQuery) -> Result<Vec<Record>> {
        AsyncDatabase::query(self, query).await
    }

    async fn close(&self) -> Result<()> {
        AsyncDatabase::close(self).await
    }
}

/// Register a completion callback and wait for it to fire.
async fn settle<T, R>(register: R) -> Result<T>
where
    T: Send + 'static,
    R: FnOnce(Box<dyn FnOnce(Result<T>) + Send>),
{
    let (tx, rx) = oneshot::channel::<Result<T>>();
    register(Box::new(move |result: Result<T>| {
        // Receiver dropped means the caller stopped waiting; nothing to do.
        let _ = tx.send(result);
    }));
    rx.await.map_err(|_canceled| Error::HandleClosed)?
}
