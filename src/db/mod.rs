//! Local geofence registry backed by SQLite.
//!
//! `rusqlite::Connection` is not `Sync`, so the connection lives on its own
//! thread. Async callers ship closures to it and await a oneshot reply.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
pub mod models;
mod repositories;

use migrations::run_migrations;

pub use models::{GeofenceRow, NewGeofence};

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Close,
}

/// Owns the worker thread; closing happens when the last `Database` clone
/// goes away.
struct Worker {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if self.requests.send(Request::Close).is_err() {
            warn!("registry worker already gone at shutdown");
        }
        if let Err(panic) = handle.join() {
            error!("registry worker panicked: {panic:?}");
        }
    }
}

#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    location: Arc<Option<PathBuf>>,
}

impl Database {
    /// Open (creating if needed) the registry file at `db_path` and bring
    /// its schema up to date.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create registry directory {}", parent.display())
            })?;
        }

        let path = db_path.clone();
        let database = Self::spawn(Some(db_path), move || {
            let conn = Connection::open(&path)
                .with_context(|| format!("failed to open registry at {}", path.display()))?;
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                warn!("WAL unavailable for registry: {err}");
            }
            Ok(conn)
        })?;

        if let Some(path) = database.path() {
            info!("geofence registry opened at {}", path.display());
        }
        Ok(database)
    }

    /// Registry that lives only as long as this handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::spawn(None, || {
            Connection::open_in_memory().context("failed to open in-memory registry")
        })
    }

    fn spawn<F>(location: Option<PathBuf>, open: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Connection> + Send + 'static,
    {
        let (requests_tx, requests_rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let thread = thread::Builder::new()
            .name("tourguard-db".into())
            .spawn(move || {
                let mut conn = match open().and_then(|mut conn| {
                    run_migrations(&mut conn).context("registry migrations failed")?;
                    Ok(conn)
                }) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                for request in requests_rx {
                    match request {
                        Request::Run(job) => job(&mut conn),
                        Request::Close => break,
                    }
                }
                info!("registry worker stopped");
            })
            .context("failed to spawn registry worker thread")?;

        ready_rx
            .recv()
            .context("registry worker exited during startup")??;

        Ok(Self {
            worker: Arc::new(Worker {
                requests: requests_tx,
                thread: Mutex::new(Some(thread)),
            }),
            location: Arc::new(location),
        })
    }

    /// Backing file, or `None` for an in-memory registry.
    pub fn path(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Run `task` on the worker thread and await its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have given up waiting; nothing to do then.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .requests
            .send(Request::Run(job))
            .map_err(|_| anyhow!("registry worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("registry worker dropped the request"))?
    }
}
