use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// OpenAI-compatible routes the worker can emulate for payloads that carry
/// an `openai_route` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenAiRoute {
    ChatCompletions,
    Completions,
    Models,
}

impl OpenAiRoute {
    pub fn parse(route: &str) -> crate::Result<Self> {
        match route {
            "/v1/chat/completions" | "chat/completions" => Ok(Self::ChatCompletions),
            "/v1/completions" | "completions" => Ok(Self::Completions),
            "/v1/models" | "models" => Ok(Self::Models),
            other => Err(crate::Error::bad_request(format!(
                "unsupported openai_route: {other}"
            ))),
        }
    }

    pub fn as_path(self) -> &'static str {
        match self {
            Self::ChatCompletions => "/v1/chat/completions",
            Self::Completions => "/v1/completions",
            Self::Models => "/v1/models",
        }
    }
}

/// Structured error payload: message, type tag, numeric status code. The
/// delivery channel is not strictly HTTP, but the contract mirrors an
/// HTTP-style bad request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(rename = "type")]
    pub err_type: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            err_type: "BadRequestError".to_string(),
            code: 400,
        }
    }

    pub fn from_error(err: &crate::Error) -> Self {
        Self {
            message: err.to_string(),
            err_type: err.openai_error_type().to_string(),
            code: if err.is_client_error() { 400 } else { 500 },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopField {
    Single(String),
    Multiple(Vec<String>),
}

impl StopField {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopField::Single(s) => vec![s],
            StopField::Multiple(v) => v,
        }
    }
}

// === /v1/chat/completions ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub stream: Option<bool>,
    pub n: Option<usize>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub stop: Option<StopField>,
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponseChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionResponseChoice>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChunkChoice>,
}

// === /v1/completions ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub stream: Option<bool>,
    pub n: Option<usize>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub stop: Option<StopField>,
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionResponseChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionResponseChoice>,
}

// === /v1/models ===

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub object: String,
    pub data: Vec<ModelObject>,
}

impl ModelListResponse {
    pub fn single(model: impl Into<String>) -> Self {
        Self {
            object: "list".to_string(),
            data: vec![ModelObject {
                id: model.into(),
                object: "model".to_string(),
                owned_by: "vllm-worker".to_string(),
            }],
        }
    }
}

pub(crate) fn current_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::{ErrorResponse, OpenAiRoute, StopField};

    #[test]
    fn parses_known_routes() {
        assert_eq!(
            OpenAiRoute::parse("/v1/chat/completions").unwrap(),
            OpenAiRoute::ChatCompletions
        );
        assert_eq!(
            OpenAiRoute::parse("completions").unwrap(),
            OpenAiRoute::Completions
        );
        assert_eq!(OpenAiRoute::parse("/v1/models").unwrap(), OpenAiRoute::Models);
    }

    #[test]
    fn rejects_unknown_route() {
        OpenAiRoute::parse("/v1/images/generations").expect_err("unsupported route");
    }

    #[test]
    fn error_response_carries_type_tag_and_code() {
        let resp = ErrorResponse::from_error(&crate::Error::bad_request("temperature out of range"));
        assert_eq!(resp.err_type, "BadRequestError");
        assert_eq!(resp.code, 400);

        let json = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(json["type"], "BadRequestError");
        assert_eq!(json["code"], 400);
    }

    #[test]
    fn stop_field_accepts_single_and_multiple() {
        let single: StopField = serde_json::from_str("\"</s>\"").expect("single");
        assert_eq!(single.into_vec(), vec!["</s>".to_string()]);

        let multi: StopField = serde_json::from_str("[\"a\", \"b\"]").expect("multi");
        assert_eq!(multi.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }
}
