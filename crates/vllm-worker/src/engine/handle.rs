use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot};

use crate::types::{EngineEvent, JobInput};

#[derive(Debug)]
pub enum EngineCommand {
    Generate {
        job: JobInput,
        reply: oneshot::Sender<SubmitOutput>,
    },
    Abort {
        request_id: String,
    },
}

#[derive(Debug)]
pub enum SubmitOutput {
    Stream {
        request_id: String,
        rx: mpsc::Receiver<EngineEvent>,
    },
    Error {
        request_id: String,
        message: String,
    },
}

/// Client side of the engine command channel.
///
/// Cloneable; all clones feed the same engine runtime and read the same
/// concurrency gauge.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    max_concurrency: Arc<AtomicUsize>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<EngineCommand>, max_concurrency: Arc<AtomicUsize>) -> Self {
        Self {
            tx,
            max_concurrency,
        }
    }

    pub async fn generate(&self, job: JobInput) -> crate::Result<SubmitOutput> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Generate {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|e| crate::Error::internal(format!("engine channel closed: {e}")))?;

        reply_rx
            .await
            .map_err(|e| crate::Error::internal(format!("engine reply dropped: {e}")))
    }

    pub async fn abort(&self, request_id: &str) -> crate::Result<()> {
        self.tx
            .send(EngineCommand::Abort {
                request_id: request_id.to_string(),
            })
            .await
            .map_err(|e| crate::Error::internal(format!("engine channel closed: {e}")))?;
        Ok(())
    }

    /// Advisory limit the host polls to adjust its own admission control.
    /// Recomputed by the engine runtime as load changes.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.load(Ordering::Relaxed)
    }
}
