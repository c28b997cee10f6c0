use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{EngineCommand, EngineHandle, SubmitOutput};
use crate::types::{EngineEvent, JobInput};

/// Backend hook where an actual inference engine binding plugs in.
///
/// Implementations push [`EngineEvent`]s on `events` as tokens come out and
/// finish with `Done`; returning an error surfaces it as an `Error` event on
/// the same stream. The runtime owns task lifecycle and abort.
#[async_trait]
pub trait InferBackend: Send + Sync + 'static {
    async fn generate(
        &self,
        job: JobInput,
        events: mpsc::Sender<EngineEvent>,
    ) -> crate::Result<()>;

    /// Current maximum number of jobs the backend wants in flight.
    fn max_concurrency(&self) -> usize;
}

/// Command loop between handles and the backend. One per process.
pub struct EngineRuntime {
    rx: mpsc::Receiver<EngineCommand>,
    backend: Arc<dyn InferBackend>,
    active: HashMap<String, tokio::task::JoinHandle<()>>,
    max_concurrency: Arc<AtomicUsize>,
}

impl EngineRuntime {
    pub fn spawn(backend: Arc<dyn InferBackend>) -> EngineHandle {
        let (tx, rx) = mpsc::channel(1024);
        let max_concurrency = Arc::new(AtomicUsize::new(backend.max_concurrency()));
        let handle = EngineHandle::new(tx, max_concurrency.clone());
        let runtime = Self {
            rx,
            backend,
            active: HashMap::new(),
            max_concurrency,
        };
        tokio::spawn(runtime.run());
        handle
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle_command(cmd);
            self.active.retain(|_, task| !task.is_finished());
            self.max_concurrency
                .store(self.backend.max_concurrency(), Ordering::Relaxed);
        }
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Generate { job, reply } => {
                let request_id = job.request_id.clone();
                let (event_tx, event_rx) = mpsc::channel(256);
                let backend = self.backend.clone();
                let task = tokio::spawn({
                    let request_id = request_id.clone();
                    async move {
                        if let Err(e) = backend.generate(job, event_tx.clone()).await {
                            tracing::error!(%request_id, error = %e, "generation failed");
                            let _ = event_tx.send(EngineEvent::Error(e.to_string())).await;
                        }
                    }
                });
                self.active.insert(request_id.clone(), task);
                let _ = reply.send(SubmitOutput::Stream {
                    request_id,
                    rx: event_rx,
                });
            }
            EngineCommand::Abort { request_id } => {
                if let Some(task) = self.active.remove(&request_id) {
                    task.abort();
                    tracing::info!(%request_id, "generation aborted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineRuntime, InferBackend};
    use crate::engine::SubmitOutput;
    use crate::types::{EngineEvent, FinishReason, JobInput, LlmInput, SamplingParams};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct EchoBackend;

    #[async_trait]
    impl InferBackend for EchoBackend {
        async fn generate(
            &self,
            job: JobInput,
            events: mpsc::Sender<EngineEvent>,
        ) -> crate::Result<()> {
            for word in job.prompt_text().split_whitespace() {
                events
                    .send(EngineEvent::Token(word.to_string()))
                    .await
                    .map_err(|_| crate::Error::internal("event receiver dropped"))?;
            }
            events
                .send(EngineEvent::Done(FinishReason::Stop))
                .await
                .map_err(|_| crate::Error::internal("event receiver dropped"))?;
            Ok(())
        }

        fn max_concurrency(&self) -> usize {
            8
        }
    }

    fn job(prompt: &str) -> JobInput {
        JobInput {
            llm_input: LlmInput::Prompt(prompt.to_string()),
            stream: true,
            max_batch_size: None,
            min_batch_size: None,
            batch_size_growth_factor: None,
            apply_chat_template: false,
            use_openai_format: false,
            openai_route: None,
            openai_input: None,
            sampling: SamplingParams::default(),
            request_id: "req-test".to_string(),
            lora: crate::lora::LoraRequest::new("safecoder", 1, "/tmp/safecoder"),
        }
    }

    #[tokio::test]
    async fn runtime_streams_backend_events() {
        let handle = EngineRuntime::spawn(Arc::new(EchoBackend));
        let submit = handle.generate(job("one two three")).await.expect("submit");

        let SubmitOutput::Stream { mut rx, .. } = submit else {
            panic!("expected a stream");
        };

        let mut tokens = Vec::new();
        let mut finished = false;
        while let Some(ev) = rx.recv().await {
            match ev {
                EngineEvent::Token(t) => tokens.push(t),
                EngineEvent::Done(reason) => {
                    assert_eq!(reason, FinishReason::Stop);
                    finished = true;
                }
                EngineEvent::Error(msg) => panic!("unexpected error: {msg}"),
            }
        }
        assert_eq!(tokens, vec!["one", "two", "three"]);
        assert!(finished);
    }

    #[tokio::test]
    async fn gauge_reports_backend_concurrency() {
        let handle = EngineRuntime::spawn(Arc::new(EchoBackend));
        // Refreshed after the first command lands.
        let submit = handle.generate(job("hi")).await.expect("submit");
        drop(submit);
        assert_eq!(handle.max_concurrency(), 8);
    }
}
