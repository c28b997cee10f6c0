mod handle;
mod runtime;
mod stream;

pub use handle::{EngineCommand, EngineHandle, SubmitOutput};
pub use runtime::{EngineRuntime, InferBackend};
pub use stream::chunk_stream;
