use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use vllm_worker::artifacts::{self, ArtifactSpec};
use vllm_worker::engine::{EngineRuntime, InferBackend};
use vllm_worker::lora::LoraRegistry;
use vllm_worker::types::{EngineEvent, FinishReason, JobInput};
use vllm_worker::{RouterBuilder, Worker, WorkerConfig};

/// Stand-in backend: streams the prompt back word by word with a short
/// delay per token. A real deployment replaces this with an actual engine
/// binding.
struct EchoBackend {
    in_flight: AtomicUsize,
}

impl EchoBackend {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferBackend for EchoBackend {
    async fn generate(
        &self,
        job: JobInput,
        events: mpsc::Sender<EngineEvent>,
    ) -> vllm_worker::Result<()> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let text = job.prompt_text();
        let max_tokens = job.sampling.max_tokens;

        let mut produced = 0usize;
        for word in text.split_whitespace() {
            if produced >= max_tokens {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            if events
                .send(EngineEvent::Token(format!("{word} ")))
                .await
                .is_err()
            {
                break;
            }
            produced += 1;
        }

        let reason = if produced >= max_tokens {
            FinishReason::Length
        } else {
            FinishReason::Stop
        };
        let _ = events.send(EngineEvent::Done(reason)).await;
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn max_concurrency(&self) -> usize {
        // A real backend derives this from free KV-cache blocks; the demo
        // just caps at a constant minus current load.
        16usize.saturating_sub(self.in_flight.load(Ordering::Relaxed))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    vllm_worker::trace::init_tracing("vllm_worker=info")?;

    let cfg = WorkerConfig::from_env()?;

    // Artifact phase first: the server must not accept jobs until the
    // adapter files are on disk. The demo seeds a placeholder adapter when
    // no URL override is configured, so it can run without network access.
    if std::env::var("LORA_ADAPTER_URL").is_ok() {
        let client = reqwest::Client::new();
        artifacts::prepare(&client, &ArtifactSpec::lora_from_config(&cfg)).await?;
    } else {
        tokio::fs::create_dir_all(&cfg.lora_extract_dir).await?;
        tokio::fs::write(
            cfg.lora_extract_dir.join("adapter_config.json"),
            b"{\"demo\": true}",
        )
        .await?;
        tracing::info!(dir = %cfg.lora_extract_dir.display(), "seeded demo adapter");
    }

    let registry = LoraRegistry::from_config(&cfg);
    registry.verify_artifacts()?;

    let engine = EngineRuntime::spawn(Arc::new(EchoBackend::new()));
    let worker = Worker::with_registry(engine, cfg.clone(), registry);

    let app = RouterBuilder::new().with_worker(worker).build()?;
    let listener = tokio::net::TcpListener::bind(cfg.http_bind_addr).await?;
    tracing::info!(addr = %cfg.http_bind_addr, "worker accepting jobs");
    axum::serve(listener, app).await?;
    Ok(())
}
