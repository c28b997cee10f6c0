use tokio::sync::mpsc;

use crate::handler::{JobRun, ResultChunk, Worker};
use crate::job;
use crate::openai::{
    ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionRequest, ChatCompletionResponse,
    ChatCompletionResponseChoice, ChatDelta, CompletionRequest, CompletionResponse,
    CompletionResponseChoice, ErrorResponse, ModelListResponse, OpenAiRoute, StopField,
    current_unix_seconds,
};
use crate::types::{ChatMessage, GenerationChunk, JobInput, LlmInput, SamplingParams};

/// Dispatch a job that selected an OpenAI-compatible route. The route's own
/// request object rides in `openai_input`.
pub(crate) async fn run_route(
    worker: &Worker,
    job: JobInput,
    route: OpenAiRoute,
) -> crate::Result<JobRun> {
    match route {
        OpenAiRoute::Models => {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx
                .send(ResultChunk::Models(ModelListResponse::single(
                    worker.config().model_name.clone(),
                )))
                .await;
            Ok(JobRun {
                request_id: job.request_id,
                stream_requested: false,
                rx,
            })
        }
        OpenAiRoute::ChatCompletions => run_chat_completions(worker, job).await,
        OpenAiRoute::Completions => run_completions(worker, job).await,
    }
}

async fn run_chat_completions(worker: &Worker, job: JobInput) -> crate::Result<JobRun> {
    let input = job.openai_input.clone().ok_or_else(|| {
        crate::Error::bad_request("openai_input is required for /v1/chat/completions")
    })?;
    let req: ChatCompletionRequest = serde_json::from_value(input)
        .map_err(|e| crate::Error::bad_request(format!("invalid chat completion request: {e}")))?;
    if req.messages.is_empty() {
        return Err(crate::Error::bad_request("messages cannot be empty"));
    }

    let stream_requested = req.stream.unwrap_or(false);
    let model = resolve_model(req.model.as_deref(), worker);
    let sampling = sampling_overrides(
        req.n,
        req.max_tokens,
        req.temperature,
        req.top_p,
        req.presence_penalty,
        req.frequency_penalty,
        req.stop.clone(),
        req.seed,
    )?;

    let engine_job = JobInput {
        llm_input: LlmInput::Messages(req.messages.clone()),
        stream: stream_requested,
        apply_chat_template: true,
        use_openai_format: true,
        sampling,
        ..job
    };
    let batch = job::batch_size_for(&engine_job, worker.config())?;
    let request_id = engine_job.request_id.clone();

    let chunks = worker.submit(engine_job, &request_id, batch).await?;
    let id = format!("chatcmpl-{request_id}");
    let rx = if stream_requested {
        spawn_chat_chunk_pump(id, model, chunks)
    } else {
        spawn_chat_response_pump(id, model, chunks)
    };
    Ok(JobRun {
        request_id,
        stream_requested,
        rx,
    })
}

async fn run_completions(worker: &Worker, job: JobInput) -> crate::Result<JobRun> {
    let input = job
        .openai_input
        .clone()
        .ok_or_else(|| crate::Error::bad_request("openai_input is required for /v1/completions"))?;
    let req: CompletionRequest = serde_json::from_value(input)
        .map_err(|e| crate::Error::bad_request(format!("invalid completion request: {e}")))?;

    let stream_requested = req.stream.unwrap_or(false);
    let model = resolve_model(req.model.as_deref(), worker);
    let sampling = sampling_overrides(
        req.n,
        req.max_tokens,
        req.temperature,
        req.top_p,
        req.presence_penalty,
        req.frequency_penalty,
        req.stop.clone(),
        req.seed,
    )?;

    let engine_job = JobInput {
        llm_input: LlmInput::Prompt(req.prompt.clone()),
        stream: stream_requested,
        apply_chat_template: false,
        use_openai_format: true,
        sampling,
        ..job
    };
    let batch = job::batch_size_for(&engine_job, worker.config())?;
    let request_id = engine_job.request_id.clone();

    let chunks = worker.submit(engine_job, &request_id, batch).await?;
    let id = format!("cmpl-{request_id}");
    let rx = if stream_requested {
        spawn_completion_chunk_pump(id, model, chunks)
    } else {
        spawn_completion_response_pump(id, model, chunks)
    };
    Ok(JobRun {
        request_id,
        stream_requested,
        rx,
    })
}

fn resolve_model(requested: Option<&str>, worker: &Worker) -> String {
    match requested {
        Some(model) if !model.trim().is_empty() => model.to_string(),
        _ => worker.config().model_name.clone(),
    }
}

#[allow(clippy::too_many_arguments)]
fn sampling_overrides(
    n: Option<usize>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
    stop: Option<StopField>,
    seed: Option<u64>,
) -> crate::Result<SamplingParams> {
    let mut params = SamplingParams::default();
    if let Some(n) = n {
        params.n = n;
    }
    if let Some(max_tokens) = max_tokens {
        params.max_tokens = max_tokens;
    }
    if let Some(temperature) = temperature {
        params.temperature = temperature;
    }
    if let Some(top_p) = top_p {
        params.top_p = top_p;
    }
    if let Some(presence_penalty) = presence_penalty {
        params.presence_penalty = presence_penalty;
    }
    if let Some(frequency_penalty) = frequency_penalty {
        params.frequency_penalty = frequency_penalty;
    }
    params.stop = stop.map(StopField::into_vec);
    params.seed = seed;
    params.validate()?;
    Ok(params)
}

fn chat_chunk(
    id: &str,
    created: u64,
    model: &str,
    delta: ChatDelta,
    finish_reason: Option<String>,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChatCompletionChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

/// Stream framing: a role-first delta, content deltas per generation chunk,
/// then a finish chunk carrying the reason.
pub(crate) fn spawn_chat_chunk_pump(
    id: String,
    model: String,
    mut chunks: mpsc::Receiver<crate::Result<GenerationChunk>>,
) -> mpsc::Receiver<ResultChunk> {
    let (tx, rx) = mpsc::channel(64);
    let created = current_unix_seconds();
    tokio::spawn(async move {
        let role = chat_chunk(
            &id,
            created,
            &model,
            ChatDelta {
                role: Some("assistant".to_string()),
                content: None,
            },
            None,
        );
        if tx.send(ResultChunk::OpenAiChunk(role)).await.is_err() {
            return;
        }

        while let Some(item) = chunks.recv().await {
            match item {
                Ok(chunk) => {
                    if !chunk.tokens.is_empty() {
                        let delta = chat_chunk(
                            &id,
                            created,
                            &model,
                            ChatDelta {
                                role: None,
                                content: Some(chunk.text()),
                            },
                            None,
                        );
                        if tx.send(ResultChunk::OpenAiChunk(delta)).await.is_err() {
                            return;
                        }
                    }
                    if let Some(reason) = chunk.finish_reason {
                        let finish = chat_chunk(
                            &id,
                            created,
                            &model,
                            ChatDelta::default(),
                            Some(reason.as_openai_str().to_string()),
                        );
                        let _ = tx.send(ResultChunk::OpenAiChunk(finish)).await;
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(ResultChunk::Error(ErrorResponse::from_error(&e)))
                        .await;
                    return;
                }
            }
        }
    });
    rx
}

/// Aggregate the whole generation into one chat completion response.
pub(crate) fn spawn_chat_response_pump(
    id: String,
    model: String,
    mut chunks: mpsc::Receiver<crate::Result<GenerationChunk>>,
) -> mpsc::Receiver<ResultChunk> {
    let (tx, rx) = mpsc::channel(1);
    let created = current_unix_seconds();
    tokio::spawn(async move {
        let mut content = String::new();
        let mut finish_reason = None;
        while let Some(item) = chunks.recv().await {
            match item {
                Ok(chunk) => {
                    content.push_str(&chunk.text());
                    if let Some(reason) = chunk.finish_reason {
                        finish_reason = Some(reason.as_openai_str().to_string());
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(ResultChunk::Error(ErrorResponse::from_error(&e)))
                        .await;
                    return;
                }
            }
        }
        let response = ChatCompletionResponse {
            id,
            object: "chat.completion".to_string(),
            created,
            model,
            choices: vec![ChatCompletionResponseChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason,
            }],
        };
        let _ = tx.send(ResultChunk::OpenAiResponse(response)).await;
    });
    rx
}

fn completion_chunk(
    id: &str,
    created: u64,
    model: &str,
    text: String,
    finish_reason: Option<String>,
) -> CompletionResponse {
    CompletionResponse {
        id: id.to_string(),
        object: "text_completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![CompletionResponseChoice {
            text,
            index: 0,
            finish_reason,
        }],
    }
}

fn spawn_completion_chunk_pump(
    id: String,
    model: String,
    mut chunks: mpsc::Receiver<crate::Result<GenerationChunk>>,
) -> mpsc::Receiver<ResultChunk> {
    let (tx, rx) = mpsc::channel(64);
    let created = current_unix_seconds();
    tokio::spawn(async move {
        while let Some(item) = chunks.recv().await {
            match item {
                Ok(chunk) => {
                    let finish = chunk
                        .finish_reason
                        .map(|reason| reason.as_openai_str().to_string());
                    let is_final = finish.is_some();
                    let delta = completion_chunk(&id, created, &model, chunk.text(), finish);
                    if tx.send(ResultChunk::Completion(delta)).await.is_err() || is_final {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(ResultChunk::Error(ErrorResponse::from_error(&e)))
                        .await;
                    return;
                }
            }
        }
    });
    rx
}

fn spawn_completion_response_pump(
    id: String,
    model: String,
    mut chunks: mpsc::Receiver<crate::Result<GenerationChunk>>,
) -> mpsc::Receiver<ResultChunk> {
    let (tx, rx) = mpsc::channel(1);
    let created = current_unix_seconds();
    tokio::spawn(async move {
        let mut text = String::new();
        let mut finish_reason = None;
        while let Some(item) = chunks.recv().await {
            match item {
                Ok(chunk) => {
                    text.push_str(&chunk.text());
                    if let Some(reason) = chunk.finish_reason {
                        finish_reason = Some(reason.as_openai_str().to_string());
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(ResultChunk::Error(ErrorResponse::from_error(&e)))
                        .await;
                    return;
                }
            }
        }
        let response = completion_chunk(&id, created, &model, text, finish_reason);
        let _ = tx.send(ResultChunk::Completion(response)).await;
    });
    rx
}
