mod openai_routes;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::WorkerConfig;
use crate::engine::{EngineHandle, SubmitOutput, chunk_stream};
use crate::job;
use crate::lora::LoraRegistry;
use crate::openai::{
    ChatCompletionChunk, ChatCompletionResponse, CompletionResponse, ErrorResponse,
    ModelListResponse,
};
use crate::types::{GenerationChunk, JobInput};

/// One unit of handler output, shaped by the job's format selection.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ResultChunk {
    Raw(GenerationChunk),
    OpenAiChunk(ChatCompletionChunk),
    OpenAiResponse(ChatCompletionResponse),
    Completion(CompletionResponse),
    Models(ModelListResponse),
    Error(ErrorResponse),
}

/// A running job: its id, whether the client asked for incremental
/// delivery, and the chunk stream itself.
#[derive(Debug)]
pub struct JobRun {
    pub request_id: String,
    pub stream_requested: bool,
    pub rx: mpsc::Receiver<ResultChunk>,
}

impl JobRun {
    /// Drain the stream, the aggregation the host applies for
    /// non-streaming jobs.
    pub async fn collect_all(mut self) -> Vec<ResultChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            out.push(chunk);
        }
        out
    }
}

/// The serverless handler: normalizes a job payload, dispatches it to the
/// engine, and re-yields chunks in the requested output format.
#[derive(Clone)]
pub struct Worker {
    engine: EngineHandle,
    registry: LoraRegistry,
    cfg: WorkerConfig,
}

impl Worker {
    pub fn new(engine: EngineHandle, cfg: WorkerConfig) -> Self {
        let registry = LoraRegistry::from_config(&cfg);
        Self {
            engine,
            registry,
            cfg,
        }
    }

    pub fn with_registry(engine: EngineHandle, cfg: WorkerConfig, registry: LoraRegistry) -> Self {
        Self {
            engine,
            registry,
            cfg,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &LoraRegistry {
        &self.registry
    }

    /// Advisory the host polls to size its admission control.
    pub fn max_concurrency(&self) -> usize {
        self.engine.max_concurrency()
    }

    /// Forward a client-disconnect signal so the engine stops producing.
    pub async fn abort(&self, request_id: &str) -> crate::Result<()> {
        self.engine.abort(request_id).await
    }

    /// Entry point for one job payload (the `input` mapping of a job).
    pub async fn handle(&self, payload: serde_json::Value) -> crate::Result<JobRun> {
        let job = job::normalize(payload, &self.cfg, &self.registry)?;
        tracing::info!(
            request_id = %job.request_id,
            stream = job.stream,
            openai_route = job.openai_route.map(|r| r.as_path()),
            "job accepted"
        );

        match job.openai_route {
            Some(route) => openai_routes::run_route(self, job, route).await,
            None => self.run_raw(job).await,
        }
    }

    /// Engine-native path: chunks of generated token texts, optionally
    /// re-dressed as OpenAI chat objects when the job asks for that format.
    async fn run_raw(&self, job: JobInput) -> crate::Result<JobRun> {
        let batch = job::batch_size_for(&job, &self.cfg)?;
        let request_id = job.request_id.clone();
        let stream_requested = job.stream;
        let use_openai_format = job.use_openai_format;
        let model = self.cfg.model_name.clone();

        let chunks = self.submit(job, &request_id, batch).await?;

        if use_openai_format {
            if stream_requested {
                let rx = openai_routes::spawn_chat_chunk_pump(
                    format!("chatcmpl-{request_id}"),
                    model,
                    chunks,
                );
                return Ok(JobRun {
                    request_id,
                    stream_requested,
                    rx,
                });
            }
            let rx = openai_routes::spawn_chat_response_pump(
                format!("chatcmpl-{request_id}"),
                model,
                chunks,
            );
            return Ok(JobRun {
                request_id,
                stream_requested,
                rx,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut chunks = chunks;
            while let Some(item) = chunks.recv().await {
                let mapped = match item {
                    Ok(chunk) => ResultChunk::Raw(chunk),
                    Err(e) => ResultChunk::Error(ErrorResponse::from_error(&e)),
                };
                if tx.send(mapped).await.is_err() {
                    return;
                }
            }
        });

        Ok(JobRun {
            request_id,
            stream_requested,
            rx,
        })
    }

    /// Submit to the engine and wire the token stream through the chunking
    /// policy.
    pub(crate) async fn submit(
        &self,
        job: JobInput,
        request_id: &str,
        batch: crate::types::BatchSize,
    ) -> crate::Result<mpsc::Receiver<crate::Result<GenerationChunk>>> {
        match self.engine.generate(job).await? {
            SubmitOutput::Stream { rx, .. } => {
                Ok(chunk_stream(request_id.to_string(), rx, batch))
            }
            SubmitOutput::Error { message, .. } => Err(crate::Error::engine(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResultChunk, Worker};
    use crate::config::WorkerConfig;
    use crate::engine::{EngineRuntime, InferBackend};
    use crate::types::{EngineEvent, FinishReason, JobInput};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Emits one token per whitespace-separated word of the prompt.
    struct EchoBackend;

    #[async_trait]
    impl InferBackend for EchoBackend {
        async fn generate(
            &self,
            job: JobInput,
            events: mpsc::Sender<EngineEvent>,
        ) -> crate::Result<()> {
            for word in job.prompt_text().split_whitespace() {
                let _ = events.send(EngineEvent::Token(format!("{word} "))).await;
            }
            let _ = events.send(EngineEvent::Done(FinishReason::Stop)).await;
            Ok(())
        }

        fn max_concurrency(&self) -> usize {
            4
        }
    }

    fn worker() -> Worker {
        let engine = EngineRuntime::spawn(Arc::new(EchoBackend));
        Worker::new(engine, WorkerConfig::default())
    }

    #[tokio::test]
    async fn raw_job_round_trips_tokens() {
        let run = worker()
            .handle(json!({"prompt": "a b c", "stream": true}))
            .await
            .expect("job accepted");
        assert!(run.stream_requested);

        let chunks = run.collect_all().await;
        let mut text = String::new();
        for chunk in &chunks {
            match chunk {
                ResultChunk::Raw(c) => text.push_str(&c.text()),
                other => panic!("expected raw chunks, got {other:?}"),
            }
        }
        assert_eq!(text, "a b c ");
    }

    #[tokio::test]
    async fn raw_chunks_follow_growth_policy() {
        let run = worker()
            .handle(json!({
                "prompt": "t1 t2 t3 t4 t5 t6 t7 t8",
                "stream": true,
                "max_batch_size": 4,
                "min_batch_size": 1,
                "batch_size_growth_factor": 2.0
            }))
            .await
            .expect("job accepted");

        let sizes: Vec<usize> = run
            .collect_all()
            .await
            .iter()
            .map(|chunk| match chunk {
                ResultChunk::Raw(c) => c.tokens.len(),
                other => panic!("expected raw chunks, got {other:?}"),
            })
            .collect();
        assert_eq!(sizes, vec![1, 2, 4, 1]);
    }

    #[tokio::test]
    async fn inputless_job_is_a_client_error() {
        let err = worker()
            .handle(json!({"stream": true}))
            .await
            .expect_err("missing input must fail");
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn openai_format_wraps_chunks_as_chat_objects() {
        let run = worker()
            .handle(json!({"prompt": "a b", "stream": true, "use_openai_format": true}))
            .await
            .expect("job accepted");

        let chunks = run.collect_all().await;
        assert!(chunks.len() >= 2, "role delta plus content expected");
        match &chunks[0] {
            ResultChunk::OpenAiChunk(chunk) => {
                assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
            }
            other => panic!("expected a chat chunk, got {other:?}"),
        }
        match chunks.last().unwrap() {
            ResultChunk::OpenAiChunk(chunk) => {
                assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("expected a finish chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn openai_format_non_streaming_aggregates_to_one_response() {
        let run = worker()
            .handle(json!({"prompt": "a b", "use_openai_format": true}))
            .await
            .expect("job accepted");
        assert!(!run.stream_requested);

        let chunks = run.collect_all().await;
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            ResultChunk::OpenAiResponse(resp) => {
                assert_eq!(resp.choices[0].message.content, "a b ");
                assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("expected one aggregated response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn advisory_concurrency_comes_from_backend() {
        assert_eq!(worker().max_concurrency(), 4);
    }
}
