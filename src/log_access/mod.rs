//! Read-only access to the host notification log.
//!
//! The connection lives on a dedicated thread; callers queue closures onto it
//! and await the reply. A single thread per open log keeps every read serial.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use rusqlite::{params, Connection, OpenFlags};
use tokio::sync::oneshot;

mod error;

pub use error::AccessError;

use crate::models::{RawRecord, RecordId};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const PROBE_SQL: &str = "SELECT rec_id FROM record LIMIT 1";
const LATEST_SQL: &str = "SELECT COALESCE(MAX(rec_id), 0) FROM record";
const READ_SINCE_SQL: &str = "SELECT r.rec_id, r.app_id, a.identifier, r.data, r.delivered_date
     FROM record r
     LEFT JOIN app a ON a.app_id = r.app_id
     WHERE r.rec_id > ?1
     ORDER BY r.rec_id ASC
     LIMIT ?2";

type LogTask = Box<dyn FnOnce(&Connection) + Send + 'static>;

enum LogCommand {
    Execute(LogTask),
    Shutdown,
}

struct LogAccessInner {
    sender: mpsc::Sender<LogCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogAccessInner {
    fn shutdown(&self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if self.sender.send(LogCommand::Shutdown).is_err() {
                log_debug!("log reader already gone before shutdown");
            }
            if let Err(join_err) = handle.join() {
                log_error!("Failed to join log reader thread: {join_err:?}");
            }
        }
    }
}

impl Drop for LogAccessInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Open the log, run a trivial query, close it again. Existence of the file
/// is not proof of access: the OS may deny reads while the path stays visible.
pub fn probe(path: &Path) -> Result<(), AccessError> {
    let conn = open_read_only(path)?;
    probe_connection(&conn, path)
}

fn open_read_only(path: &Path) -> Result<Connection, AccessError> {
    if !path.exists() {
        return Err(AccessError::Missing(path.to_path_buf()));
    }

    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| AccessError::unreadable(path, err))
}

fn probe_connection(conn: &Connection, path: &Path) -> Result<(), AccessError> {
    let mut stmt = conn
        .prepare(PROBE_SQL)
        .map_err(|err| AccessError::unreadable(path, err))?;
    let mut rows = stmt
        .query([])
        .map_err(|err| AccessError::unreadable(path, err))?;
    rows.next()
        .map_err(|err| AccessError::unreadable(path, err))?;
    Ok(())
}

#[derive(Clone)]
pub struct LogAccess {
    inner: Arc<LogAccessInner>,
    path: Arc<PathBuf>,
    read_failures: Arc<AtomicU32>,
    reads: Arc<AtomicU64>,
}

impl LogAccess {
    /// Open the log on its own reader thread. Fails when the file is missing
    /// or the probe query does not succeed.
    pub fn open(path: &Path) -> Result<Self, AccessError> {
        let (command_tx, command_rx) = mpsc::channel::<LogCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = path.to_path_buf();

        let worker = thread::Builder::new()
            .name("notif-hud-log".into())
            .spawn(move || {
                let conn = match open_read_only(&path_for_thread)
                    .and_then(|conn| probe_connection(&conn, &path_for_thread).map(|_| conn))
                {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    log_error!("log reader opener dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        LogCommand::Execute(task) => task(&conn),
                        LogCommand::Shutdown => break,
                    }
                }

                log_debug!("log reader thread shutting down");
            })
            .map_err(|err| AccessError::unreadable(path, err))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(AccessError::WorkerGone);
            }
        }

        log_info!("notification log opened at {}", path.display());

        Ok(Self {
            inner: Arc::new(LogAccessInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path.to_path_buf()),
            read_failures: Arc::new(AtomicU32::new(0)),
            reads: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, AccessError>
    where
        F: FnOnce(&Connection) -> Result<T, AccessError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = LogCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                log_debug!("log caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|_| AccessError::WorkerGone)?;

        reply_rx.await.map_err(|_| AccessError::WorkerGone)?
    }

    /// Records with id greater than `cursor`, ascending, at most `limit`.
    /// Read failures yield an empty batch and bump [`Self::consecutive_failures`].
    pub async fn read_since(&self, cursor: RecordId, limit: usize) -> Vec<RawRecord> {
        let path = self.path.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.reads.fetch_add(1, Ordering::Relaxed);
        let result = self
            .execute(move |conn| {
                read_records(conn, cursor, limit)
                    .map_err(|err| AccessError::unreadable(path.as_path(), err))
            })
            .await;

        match result {
            Ok(records) => {
                self.read_failures.store(0, Ordering::SeqCst);
                records
            }
            Err(err) => {
                let failures = self.read_failures.fetch_add(1, Ordering::SeqCst) + 1;
                log_warn!("notification log read failed ({failures} in a row): {err}");
                Vec::new()
            }
        }
    }

    pub async fn latest_id(&self) -> Result<RecordId, AccessError> {
        let path = self.path.clone();
        self.execute(move |conn| {
            conn.query_row(LATEST_SQL, [], |row| row.get::<_, i64>(0))
                .map(RecordId)
                .map_err(|err| AccessError::unreadable(path.as_path(), err))
        })
        .await
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.read_failures.load(Ordering::SeqCst)
    }

    /// `read_since` calls made through this handle or its clones.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Stop the reader thread and release the connection. Blocks until the
    /// thread has exited; safe to call more than once.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        match self.inner.worker.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

fn read_records(conn: &Connection, cursor: RecordId, limit: i64) -> rusqlite::Result<Vec<RawRecord>> {
    let mut stmt = conn.prepare_cached(READ_SINCE_SQL)?;
    let rows = stmt.query_map(params![cursor.0, limit], |row| {
        Ok(RawRecord {
            id: RecordId(row.get(0)?),
            sender_key: row.get::<_, Option<i64>>(1)?.unwrap_or(-1),
            sender_identifier: row.get(2)?,
            payload: row.get::<_, Option<Vec<u8>>>(3)?.unwrap_or_default(),
            delivered_at: row.get(4)?,
        })
    })?;
    let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}
