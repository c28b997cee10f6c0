use serde::{Deserialize, Serialize};

/// One event on an engine token stream.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Token(String),
    Done(FinishReason),
    Error(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Abort,
}

impl FinishReason {
    pub fn as_openai_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Abort => "abort",
        }
    }
}

/// Cumulative token accounting attached to every chunk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub output_tokens: usize,
}

/// Engine-native unit of streamed output: a batch of generated token texts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationChunk {
    pub request_id: String,
    pub tokens: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

impl GenerationChunk {
    pub fn text(&self) -> String {
        self.tokens.concat()
    }

    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}
