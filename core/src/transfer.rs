use crate::connection::{Connection, ConnectionState};
use crate::error::{NearlinkError, Result};
use crate::events::SessionEvent;
use bytes::BytesMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Failed | TransferState::Cancelled
        )
    }
}

struct JobEntry {
    cancel: Arc<AtomicBool>,
    state_rx: watch::Receiver<TransferState>,
}

/// Caller-side handle to a running job. Cancellation is cooperative: the flag
/// is checked between chunks, so the job reaches Cancelled at the next chunk
/// boundary rather than immediately.
#[derive(Debug)]
pub struct TransferHandle {
    id: String,
    cancel: Arc<AtomicBool>,
    state_rx: watch::Receiver<TransferState>,
}

impl TransferHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn state(&self) -> TransferState {
        *self.state_rx.borrow()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(&mut self) -> TransferState {
        loop {
            let state = *self.state_rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if self.state_rx.changed().await.is_err() {
                return *self.state_rx.borrow();
            }
        }
    }
}

/// Chunked, flow-controlled copy of a byte source into an established
/// connection's channel, one spawned task per job.
pub struct TransferEngine {
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl TransferEngine {
    pub fn new(event_tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            event_tx,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start copying `source` into the connection in chunks of `chunk_size`
    /// bytes. Progress is reported after every chunk write; a short chunk can
    /// only be the last one.
    pub fn send<S>(
        &self,
        conn: Connection,
        source: S,
        total_size: Option<u64>,
        chunk_size: usize,
    ) -> Result<TransferHandle>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        if chunk_size == 0 {
            return Err(NearlinkError::InvalidChunkSize);
        }
        if conn.state() != ConnectionState::Established {
            return Err(NearlinkError::NotConnected(conn.peer_id().to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));
        let (state_tx, state_rx) = watch::channel(TransferState::Pending);

        self.jobs.lock().insert(
            id.clone(),
            JobEntry {
                cancel: cancel.clone(),
                state_rx: state_rx.clone(),
            },
        );

        info!(
            job = %id,
            peer = conn.peer_id(),
            total_size,
            chunk_size,
            "transfer starting"
        );
        let _ = self.event_tx.send(SessionEvent::TransferStarting {
            id: id.clone(),
            peer_id: conn.peer_id().to_string(),
            total_size,
        });

        let handle = TransferHandle {
            id: id.clone(),
            cancel: cancel.clone(),
            state_rx,
        };

        let event_tx = self.event_tx.clone();
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            let _ = state_tx.send(TransferState::InProgress);
            let outcome =
                run_job(&id, conn, source, total_size, chunk_size, &cancel, &event_tx).await;
            let _ = state_tx.send(outcome);
            // drop the record only after the terminal event went out
            jobs.lock().remove(&id);
        });

        Ok(handle)
    }

    /// Cooperative cancel by job id; returns false for unknown or already
    /// finished jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.jobs.lock().get(job_id) {
            Some(job) => {
                job.cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn job_state(&self, job_id: &str) -> Option<TransferState> {
        self.jobs.lock().get(job_id).map(|job| *job.state_rx.borrow())
    }
}

async fn run_job<S>(
    id: &str,
    conn: Connection,
    mut source: S,
    total_size: Option<u64>,
    chunk_size: usize,
    cancel: &AtomicBool,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
) -> TransferState
where
    S: AsyncRead + Send + Unpin,
{
    let mut transferred: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!(job = id, "transfer cancelled at chunk boundary");
            let _ = event_tx.send(SessionEvent::TransferCancelled {
                id: id.to_string(),
                bytes_transferred: transferred,
            });
            return TransferState::Cancelled;
        }

        if conn.state() != ConnectionState::Established {
            warn!(job = id, "connection no longer established, aborting transfer");
            let _ = event_tx.send(SessionEvent::TransferFailed {
                id: id.to_string(),
                error: NearlinkError::ChannelClosed.to_string(),
            });
            return TransferState::Failed;
        }

        // Fill a whole chunk; a short read only happens at end-of-source.
        let mut buf = BytesMut::zeroed(chunk_size);
        let mut filled = 0usize;
        let read_err = loop {
            match source.read(&mut buf[filled..]).await {
                Ok(0) => break None,
                Ok(n) => {
                    filled += n;
                    if filled == chunk_size {
                        break None;
                    }
                }
                Err(e) => break Some(e),
            }
        };
        if let Some(e) = read_err {
            warn!(job = id, "source read error: {}", e);
            let _ = event_tx.send(SessionEvent::TransferFailed {
                id: id.to_string(),
                error: e.to_string(),
            });
            return TransferState::Failed;
        }
        if filled == 0 {
            info!(job = id, bytes = transferred, "transfer completed");
            let _ = event_tx.send(SessionEvent::TransferCompleted {
                id: id.to_string(),
                bytes_transferred: transferred,
            });
            return TransferState::Completed;
        }

        // Write under the channel lock so a concurrent disconnect lands on a
        // chunk boundary instead of racing the write.
        let mut guard = conn.channel().lock().await;
        match guard.as_mut() {
            None => {
                drop(guard);
                let _ = event_tx.send(SessionEvent::TransferFailed {
                    id: id.to_string(),
                    error: NearlinkError::ChannelClosed.to_string(),
                });
                return TransferState::Failed;
            }
            Some(channel) => {
                if let Err(e) = channel.write_all(&buf[..filled]).await {
                    drop(guard);
                    warn!(job = id, "channel write error: {}", e);
                    if conn.mark_failed() {
                        let _ = event_tx.send(SessionEvent::ConnectionStateChanged {
                            peer_id: conn.peer_id().to_string(),
                            state: ConnectionState::Failed,
                        });
                    }
                    let _ = event_tx.send(SessionEvent::TransferFailed {
                        id: id.to_string(),
                        error: e.to_string(),
                    });
                    return TransferState::Failed;
                }
            }
        }
        drop(guard);

        transferred += filled as u64;
        let _ = event_tx.send(SessionEvent::TransferProgress {
            id: id.to_string(),
            bytes_transferred: transferred,
            total_size,
        });
    }
}
