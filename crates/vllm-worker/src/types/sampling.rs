use serde::{Deserialize, Serialize};

const DEFAULT_N: usize = 1;
const DEFAULT_TEMPERATURE: f32 = 1.0;
const MAX_TEMPERATURE: f32 = 1000.0;
const DEFAULT_TOP_P: f32 = 1.0;
const DEFAULT_TOP_K: i32 = -1;
const DEFAULT_MIN_P: f32 = 0.0;
const DEFAULT_PRESENCE_PENALTY: f32 = 0.0;
const DEFAULT_FREQUENCY_PENALTY: f32 = 0.0;
const DEFAULT_REPETITION_PENALTY: f32 = 1.0;
const DEFAULT_MAX_TOKENS: usize = 256;
const DEFAULT_MIN_TOKENS: usize = 0;

/// Generation-control knobs forwarded to the inference engine.
///
/// Deserialization is strict: a key the engine does not recognize fails the
/// whole job at normalization time instead of surfacing later from inside a
/// running generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SamplingParams {
    pub n: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub min_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub repetition_penalty: f32,
    pub max_tokens: usize,
    pub min_tokens: usize,
    pub stop: Option<Vec<String>>,
    pub stop_token_ids: Option<Vec<i64>>,
    pub ignore_eos: bool,
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            n: DEFAULT_N,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            min_p: DEFAULT_MIN_P,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
            max_tokens: DEFAULT_MAX_TOKENS,
            min_tokens: DEFAULT_MIN_TOKENS,
            stop: None,
            stop_token_ids: None,
            ignore_eos: false,
            seed: None,
        }
    }
}

impl SamplingParams {
    /// Parse and validate a client-supplied mapping.
    ///
    /// Mirrors the engine's own parameter validation so malformed params are
    /// rejected where the job enters the system.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        let params: Self = serde_json::from_value(value)
            .map_err(|e| crate::Error::bad_request(format!("invalid sampling_params: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.n < 1 {
            return Err(crate::Error::bad_request(format!(
                "n must be >= 1, got {}",
                self.n
            )));
        }

        if !self.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(crate::Error::bad_request(format!(
                "temperature must be finite and in [0, {MAX_TEMPERATURE}], got {}",
                self.temperature
            )));
        }

        if !self.top_p.is_finite() || !(0.0..=1.0).contains(&self.top_p) || self.top_p == 0.0 {
            return Err(crate::Error::bad_request(format!(
                "top_p must be finite and in (0, 1], got {}",
                self.top_p
            )));
        }

        if self.top_k < -1 || self.top_k == 0 {
            return Err(crate::Error::bad_request(format!(
                "top_k must be -1 (disabled) or >= 1, got {}",
                self.top_k
            )));
        }

        if !self.min_p.is_finite() || !(0.0..=1.0).contains(&self.min_p) {
            return Err(crate::Error::bad_request(format!(
                "min_p must be finite and in [0, 1], got {}",
                self.min_p
            )));
        }

        validate_finite_in("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        validate_finite_in("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;

        if !self.repetition_penalty.is_finite() || self.repetition_penalty <= 0.0 {
            return Err(crate::Error::bad_request(format!(
                "repetition_penalty must be finite and > 0, got {}",
                self.repetition_penalty
            )));
        }

        if self.max_tokens < 1 {
            return Err(crate::Error::bad_request(format!(
                "max_tokens must be >= 1, got {}",
                self.max_tokens
            )));
        }

        if self.min_tokens > self.max_tokens {
            return Err(crate::Error::bad_request(format!(
                "min_tokens must be <= max_tokens, got {} > {}",
                self.min_tokens, self.max_tokens
            )));
        }

        Ok(())
    }
}

fn validate_finite_in(name: &str, value: f32, lo: f32, hi: f32) -> crate::Result<()> {
    if !value.is_finite() || !(lo..=hi).contains(&value) {
        return Err(crate::Error::bad_request(format!(
            "{name} must be finite and in [{lo}, {hi}], got {value}"
        )));
    }
    Ok(())
}
