//! Serverless LLM worker.
//!
//! This crate provides:
//! - job-payload normalization into a validated request descriptor;
//! - a dynamic batch-size policy that grows chunk sizes over one streaming
//!   generation;
//! - a command-channel seam to the inference engine, with chunked
//!   re-streaming in raw or OpenAI-compatible formats;
//! - a startup artifact phase (download + extract of LoRA adapter files)
//!   that must complete before the worker accepts jobs;
//! - HTTP server scaffolding (axum) standing in for the serverless host.

pub mod artifacts;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod job;
pub mod lora;
pub mod openai;
pub mod server;
pub mod trace;
pub mod types;

pub use config::WorkerConfig;
pub use engine::{EngineHandle, EngineRuntime, InferBackend};
pub use error::{Error, Result};
pub use handler::{JobRun, ResultChunk, Worker};
pub use lora::{LoraRegistry, LoraRequest};
pub use server::{AppState, RouterBuilder};
pub use types::{BatchSize, JobInput, SamplingParams};
