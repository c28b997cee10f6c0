mod batch;
mod chunk;
mod job;
mod sampling;

pub use batch::BatchSize;
pub use chunk::{EngineEvent, FinishReason, GenerationChunk, Usage};
pub use job::{ChatMessage, JobInput, LlmInput};
pub use sampling::SamplingParams;
