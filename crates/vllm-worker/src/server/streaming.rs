use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::handler::{JobRun, Worker};

/// Forward a job's chunks over SSE. A dropped client ends the pump and the
/// disconnect is forwarded to the engine so it stops producing.
pub(crate) fn sse_job_stream(
    worker: Worker,
    run: JobRun,
    keep_alive_ms: u64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sse_tx, sse_rx) = mpsc::channel(256);
    let request_id = run.request_id.clone();
    tokio::spawn(async move {
        let mut rx = run.rx;
        while let Some(chunk) = rx.recv().await {
            let json = serde_json::to_string(&chunk).unwrap_or_default();
            if sse_tx.send(Event::default().data(json)).await.is_err() {
                tracing::warn!(%request_id, "client disconnected, aborting generation");
                let _ = worker.abort(&request_id).await;
                return;
            }
        }
        let _ = sse_tx.send(Event::default().data("[DONE]")).await;
    });

    let stream = ReceiverStream::new(sse_rx).map(Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_millis(keep_alive_ms)))
}
