//! Multi-statement transactions.
//!
//! [`run_in_transaction`] starts a session and a transaction, then hands a
//! [`Transaction`] to the caller's unit of work. The unit of work decides when
//! the transaction becomes durable by calling [`Transaction::commit`]; every
//! other outcome (an error, cancellation, or returning without committing)
//! aborts it. The session is ended before `run_in_transaction` returns.

use crate::{Connection, Error, Mongo, Result};
use futures_util::{FutureExt, future::BoxFuture};
use mongodb::{ClientSession, Database};
use tokio_util::sync::CancellationToken;

/// The transaction controls of a database session.
pub trait SessionControl: Send {
    fn begin(&mut self) -> BoxFuture<'_, Result<()>>;

    fn commit(&mut self) -> BoxFuture<'_, Result<()>>;

    fn abort(&mut self) -> BoxFuture<'_, Result<()>>;
}

impl SessionControl for ClientSession {
    fn begin(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.start_transaction().await?;
            Ok(())
        }
        .boxed()
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.commit_transaction().await?;
            Ok(())
        }
        .boxed()
    }

    fn abort(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.abort_transaction().await?;
            Ok(())
        }
        .boxed()
    }
}

/// A database bound to a session with an open transaction.
#[derive(Debug)]
pub struct Transaction<'a, S = ClientSession> {
    pub db: &'a Database,
    session: &'a mut S,
    committed: bool,
}

impl<S: SessionControl> Transaction<'_, S> {
    /// Commits the transaction. Writes made through [`mongo`](Self::mongo)
    /// become visible to other sessions once this returns `Ok`.
    pub async fn commit(&mut self) -> Result<()> {
        self.session.commit().await?;
        self.committed = true;

        tracing::debug!(db = self.db.name(), "transaction committed");

        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

impl Transaction<'_, ClientSession> {
    /// A handle that runs operations inside this transaction.
    pub fn mongo(&mut self) -> Mongo<'_> {
        Mongo::new_with_session(self.db, self.session)
    }

    pub fn session(&mut self) -> &mut ClientSession {
        self.session
    }
}

impl<'a> From<&'a mut Transaction<'_, ClientSession>> for Mongo<'a> {
    fn from(value: &'a mut Transaction<'_, ClientSession>) -> Self {
        value.mongo()
    }
}

/// Runs `work` inside a fresh session and transaction.
///
/// ```ignore
/// run_in_transaction(&conn, &cancel, |trx| {
///     async move {
///         from.update_one(trx.mongo(), Updates::new().set("balance", 0), None).await?;
///         to.update_one(trx.mongo(), Updates::new().set("balance", total), None).await?;
///         trx.commit().await
///     }
///     .boxed()
/// })
/// .await?;
/// ```
///
/// The error returned by `work` is returned to the caller after the
/// transaction is aborted. If `cancel` fires first, `work` is dropped, the
/// transaction is aborted, and [`Error::Cancelled`] is returned.
pub async fn run_in_transaction<T, F>(
    conn: &Connection,
    cancel: &CancellationToken,
    work: F,
) -> Result<T>
where
    F: for<'t, 's> FnOnce(&'t mut Transaction<'s>) -> BoxFuture<'t, Result<T>>,
{
    let session = conn.client().start_session().await?;

    drive(conn.database(), session, cancel, work).await
}

pub(crate) async fn drive<S, T, F>(
    db: &Database,
    mut session: S,
    cancel: &CancellationToken,
    work: F,
) -> Result<T>
where
    S: SessionControl,
    F: for<'t, 's> FnOnce(&'t mut Transaction<'s, S>) -> BoxFuture<'t, Result<T>>,
{
    let outcome = run_work(db, &mut session, cancel, work).await;

    drop(session);
    tracing::debug!(db = db.name(), "session ended");

    outcome
}

async fn run_work<S, T, F>(
    db: &Database,
    session: &mut S,
    cancel: &CancellationToken,
    work: F,
) -> Result<T>
where
    S: SessionControl,
    F: for<'t, 's> FnOnce(&'t mut Transaction<'s, S>) -> BoxFuture<'t, Result<T>>,
{
    session.begin().await?;

    let mut trx = Transaction {
        db,
        session,
        committed: false,
    };

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        outcome = work(&mut trx) => outcome,
    };

    match (outcome, trx.committed) {
        (Ok(value), true) => Ok(value),
        (Ok(value), false) => {
            tracing::warn!(db = db.name(), "unit of work returned without committing");
            abort(db, trx.session).await;
            Ok(value)
        }
        (Err(err), true) => {
            tracing::warn!(db = db.name(), error = %err, "unit of work failed after committing");
            Err(err)
        }
        (Err(err), false) => {
            tracing::debug!(db = db.name(), error = %err, "aborting transaction");
            abort(db, trx.session).await;
            Err(err)
        }
    }
}

async fn abort<S: SessionControl>(db: &Database, session: &mut S) {
    if let Err(err) = session.abort().await {
        tracing::error!(db = db.name(), error = %err, "failed to abort transaction");
    }
}
