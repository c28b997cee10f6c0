use serde::Deserialize;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::lora::LoraRegistry;
use crate::openai::OpenAiRoute;
use crate::types::{BatchSize, ChatMessage, JobInput, LlmInput, SamplingParams};

/// Raw job mapping as submitted by the client. Everything is optional here;
/// [`normalize`] turns it into a validated [`JobInput`] or fails. Unknown
/// top-level keys are ignored, matching the reference.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JobPayload {
    pub messages: Option<Vec<ChatMessage>>,
    pub prompt: Option<String>,
    pub stream: Option<bool>,
    pub max_batch_size: Option<usize>,
    pub min_batch_size: Option<serde_json::Value>,
    pub batch_size_growth_factor: Option<serde_json::Value>,
    pub apply_chat_template: Option<bool>,
    pub use_openai_format: Option<bool>,
    pub openai_route: Option<String>,
    pub openai_input: Option<serde_json::Value>,
    pub sampling_params: Option<serde_json::Value>,
    pub lora: Option<String>,
}

/// Normalize an untyped job mapping into a [`JobInput`].
///
/// Messages take precedence over a plain prompt; a payload with neither is
/// rejected up front instead of forwarding a null input for the engine to
/// trip over. The request id is freshly generated on every call.
pub fn normalize(
    payload: serde_json::Value,
    cfg: &WorkerConfig,
    registry: &LoraRegistry,
) -> crate::Result<JobInput> {
    let payload: JobPayload = serde_json::from_value(payload)
        .map_err(|e| crate::Error::bad_request(format!("invalid job payload: {e}")))?;
    normalize_payload(payload, cfg, registry)
}

pub fn normalize_payload(
    payload: JobPayload,
    cfg: &WorkerConfig,
    registry: &LoraRegistry,
) -> crate::Result<JobInput> {
    let llm_input = match (payload.messages, payload.prompt) {
        (Some(messages), _) => LlmInput::Messages(messages),
        (None, Some(prompt)) => LlmInput::Prompt(prompt),
        (None, None) => return Err(crate::Error::MissingInput),
    };

    let min_batch_size = coerce_optional_usize(
        "min_batch_size",
        payload.min_batch_size,
        cfg.legacy_zero_means_unset,
    )?;
    let batch_size_growth_factor = coerce_optional_f64(
        "batch_size_growth_factor",
        payload.batch_size_growth_factor,
        cfg.legacy_zero_means_unset,
    )?;

    let openai_route = payload
        .openai_route
        .as_deref()
        .map(OpenAiRoute::parse)
        .transpose()?;

    let sampling = match payload.sampling_params {
        Some(value) => SamplingParams::from_value(value)?,
        None => SamplingParams::default(),
    };

    let lora = registry.resolve(payload.lora.as_deref())?;

    Ok(JobInput {
        llm_input,
        stream: payload.stream.unwrap_or(false),
        max_batch_size: payload.max_batch_size,
        min_batch_size,
        batch_size_growth_factor,
        apply_chat_template: payload.apply_chat_template.unwrap_or(false),
        use_openai_format: payload.use_openai_format.unwrap_or(false),
        openai_route,
        openai_input: payload.openai_input,
        sampling,
        request_id: Uuid::new_v4().as_simple().to_string(),
        lora,
    })
}

/// Chunking policy for one job: overrides from the payload merged over the
/// worker defaults.
pub fn batch_size_for(job: &JobInput, cfg: &WorkerConfig) -> crate::Result<BatchSize> {
    BatchSize::new(
        job.max_batch_size.unwrap_or(cfg.default_max_batch_size),
        job.min_batch_size.unwrap_or(cfg.default_min_batch_size),
        job.batch_size_growth_factor
            .unwrap_or(cfg.default_batch_size_growth_factor),
    )
}

fn coerce_optional_usize(
    name: &str,
    value: Option<serde_json::Value>,
    legacy_zero_means_unset: bool,
) -> crate::Result<Option<usize>> {
    let Some(parsed) = parse_number(name, value)? else {
        return Ok(None);
    };
    if parsed.fract() != 0.0 || parsed < 0.0 {
        return Err(crate::Error::bad_request(format!(
            "{name} must be a non-negative integer, got {parsed}"
        )));
    }
    let parsed = parsed as usize;
    if parsed == 0 {
        if legacy_zero_means_unset {
            return Ok(None);
        }
        return Err(crate::Error::bad_request(format!("{name} must be >= 1")));
    }
    Ok(Some(parsed))
}

fn coerce_optional_f64(
    name: &str,
    value: Option<serde_json::Value>,
    legacy_zero_means_unset: bool,
) -> crate::Result<Option<f64>> {
    let Some(parsed) = parse_number(name, value)? else {
        return Ok(None);
    };
    if parsed == 0.0 {
        if legacy_zero_means_unset {
            return Ok(None);
        }
        return Err(crate::Error::bad_request(format!("{name} must be > 0")));
    }
    Ok(Some(parsed))
}

/// Accepts JSON numbers and numeric strings, the two forms the reference
/// coerces; null counts as absent.
fn parse_number(name: &str, value: Option<serde_json::Value>) -> crate::Result<Option<f64>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| {
            crate::Error::bad_request(format!("{name} is not a representable number"))
        }),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| crate::Error::bad_request(format!("{name} is not numeric: {s:?}"))),
        other => Err(crate::Error::bad_request(format!(
            "{name} must be a number, got {other}"
        ))),
    }
}
