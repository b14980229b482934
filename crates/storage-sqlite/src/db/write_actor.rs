use super::DbPool;
use crate::errors::StorageError;
use diesel::SqliteConnection;
use log::error;
use std::any::Any;
use timesync_core::errors::{Error, Result};
use tokio::sync::{mpsc, oneshot};

type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;
type AnyBox = Box<dyn Any + Send + 'static>;
type Request = (Job<AnyBox>, oneshot::Sender<Result<AnyBox>>);

/// Error inside a writer transaction. Keeps the job's own error intact.
enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

impl From<TxError> for Error {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Job(e) => e,
            TxError::Diesel(e) => StorageError::from(e).into(),
        }
    }
}

fn unavailable(message: &str) -> Error {
    StorageError::WriterUnavailable(message.to_string()).into()
}

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Request>,
}

impl WriteHandle {
    /// Executes `job` on the writer's connection inside an immediate
    /// transaction. The transaction is committed before this returns.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as AnyBox)),
                ret_tx,
            ))
            .await
            .map_err(|_| unavailable("writer actor stopped"))?;

        let boxed = ret_rx
            .await
            .map_err(|_| unavailable("writer actor dropped the reply"))??;
        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| unavailable("writer returned an unexpected type"))
    }
}

/// Spawns the single writer task.
///
/// The task owns one pooled connection for its lifetime and runs jobs one at
/// a time. If no connection can be acquired every job is answered with an
/// error.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<Request>(1024);

    tokio::spawn(async move {
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Writer actor could not acquire a connection: {}", e);
                let message = format!("no database connection: {}", e);
                while let Some((_, reply_tx)) = rx.recv().await {
                    let _ = reply_tx.send(Err(unavailable(&message)));
                }
                return;
            }
        };

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: Result<AnyBox> = conn
                .immediate_transaction::<_, TxError, _>(|c| job(c).map_err(TxError::Job))
                .map_err(Error::from);

            // The requester may have gone away.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}
