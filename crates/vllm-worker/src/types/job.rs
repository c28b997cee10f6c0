use serde::{Deserialize, Serialize};

use crate::lora::LoraRequest;
use crate::openai::OpenAiRoute;
use crate::types::SamplingParams;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The model-facing input of a job. Messages take precedence over a plain
/// prompt when a payload carries both.
#[derive(Clone, Debug)]
pub enum LlmInput {
    Messages(Vec<ChatMessage>),
    Prompt(String),
}

/// A fully-typed, validated request descriptor.
///
/// Built once per incoming job by [`crate::job`] and immutable afterwards;
/// everything downstream (engine submission, chunking, output formatting)
/// reads from here.
#[derive(Clone, Debug)]
pub struct JobInput {
    pub llm_input: LlmInput,
    pub stream: bool,
    pub max_batch_size: Option<usize>,
    pub min_batch_size: Option<usize>,
    pub batch_size_growth_factor: Option<f64>,
    pub apply_chat_template: bool,
    pub use_openai_format: bool,
    pub openai_route: Option<OpenAiRoute>,
    pub openai_input: Option<serde_json::Value>,
    pub sampling: SamplingParams,
    pub request_id: String,
    pub lora: LoraRequest,
}

impl JobInput {
    /// Flatten the input into one prompt string for engines that take text.
    ///
    /// Message sequences are rendered role-prefixed; a raw prompt passes
    /// through untouched.
    pub fn prompt_text(&self) -> String {
        match &self.llm_input {
            LlmInput::Prompt(prompt) => prompt.clone(),
            LlmInput::Messages(messages) => {
                let mut out = String::new();
                for msg in messages {
                    out.push_str(&msg.role);
                    out.push_str(": ");
                    out.push_str(&msg.content);
                    out.push('\n');
                }
                out
            }
        }
    }
}
