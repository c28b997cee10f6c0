use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_MIN_BATCH_SIZE: usize = 1;
const DEFAULT_BATCH_SIZE_GROWTH_FACTOR: f64 = 3.0;

const DEFAULT_MODEL_NAME: &str = "mistralai/Mistral-7B-v0.1";

const DEFAULT_LORA_NAME: &str = "safecoder";
const DEFAULT_LORA_URL: &str =
    "https://files.sri.inf.ethz.ch/safecoder/mistral-7b-lora-safecoder.tar.gz";
const DEFAULT_LORA_ARCHIVE_PATH: &str = "/tmp/mistral-7b-lora-safecoder.tar.gz";
const DEFAULT_LORA_EXTRACT_DIR: &str = "/tmp/mistral-7b-lora-safecoder";

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub http_bind_addr: SocketAddr,
    pub request_body_limit_bytes: usize,
    pub sse_keep_alive_ms: u64,

    /// Label reported in OpenAI-compatible responses and `/v1/models`.
    pub model_name: String,

    /// Chunking policy applied when a job does not override it.
    pub default_max_batch_size: usize,
    pub default_min_batch_size: usize,
    pub default_batch_size_growth_factor: f64,

    /// Reference parity: a literal `0` for `min_batch_size` or
    /// `batch_size_growth_factor` in a job payload counts as "unset".
    /// Turned off, an explicit zero is a bad request.
    pub legacy_zero_means_unset: bool,

    pub lora_name: String,
    pub lora_url: String,
    pub lora_archive_path: PathBuf,
    pub lora_extract_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            http_bind_addr: "0.0.0.0:8000".parse().expect("valid bind addr"),
            request_body_limit_bytes: 10 * 1024 * 1024,
            sse_keep_alive_ms: 10_000,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            default_max_batch_size: DEFAULT_BATCH_SIZE,
            default_min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            default_batch_size_growth_factor: DEFAULT_BATCH_SIZE_GROWTH_FACTOR,
            legacy_zero_means_unset: true,
            lora_name: DEFAULT_LORA_NAME.to_string(),
            lora_url: DEFAULT_LORA_URL.to_string(),
            lora_archive_path: PathBuf::from(DEFAULT_LORA_ARCHIVE_PATH),
            lora_extract_dir: PathBuf::from(DEFAULT_LORA_EXTRACT_DIR),
        }
    }
}

impl WorkerConfig {
    /// Defaults overlaid with the deployment's environment contract.
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();

        if let Some(addr) = read_env("HTTP_BIND_ADDR") {
            cfg.http_bind_addr = addr
                .parse()
                .map_err(|_| bad_env("HTTP_BIND_ADDR", &addr))?;
        }
        if let Some(raw) = read_env("REQUEST_BODY_LIMIT_BYTES") {
            cfg.request_body_limit_bytes =
                raw.parse().map_err(|_| bad_env("REQUEST_BODY_LIMIT_BYTES", &raw))?;
        }
        if let Some(raw) = read_env("SSE_KEEP_ALIVE_MS") {
            cfg.sse_keep_alive_ms = raw.parse().map_err(|_| bad_env("SSE_KEEP_ALIVE_MS", &raw))?;
        }
        if let Some(raw) = read_env("DEFAULT_BATCH_SIZE") {
            cfg.default_max_batch_size =
                raw.parse().map_err(|_| bad_env("DEFAULT_BATCH_SIZE", &raw))?;
        }
        if let Some(raw) = read_env("DEFAULT_MIN_BATCH_SIZE") {
            cfg.default_min_batch_size =
                raw.parse().map_err(|_| bad_env("DEFAULT_MIN_BATCH_SIZE", &raw))?;
        }
        if let Some(raw) = read_env("DEFAULT_BATCH_SIZE_GROWTH_FACTOR") {
            cfg.default_batch_size_growth_factor = raw
                .parse()
                .map_err(|_| bad_env("DEFAULT_BATCH_SIZE_GROWTH_FACTOR", &raw))?;
        }
        cfg.legacy_zero_means_unset = parse_int_bool(
            "LEGACY_ZERO_MEANS_UNSET",
            read_env("LEGACY_ZERO_MEANS_UNSET").as_deref(),
            cfg.legacy_zero_means_unset,
        )?;

        if let Some(name) = read_env("MODEL_NAME") {
            cfg.model_name = name;
        }
        if let Some(name) = read_env("LORA_ADAPTER_NAME") {
            cfg.lora_name = name;
        }
        if let Some(url) = read_env("LORA_ADAPTER_URL") {
            cfg.lora_url = url;
        }
        if let Some(path) = read_env("LORA_ARCHIVE_PATH") {
            cfg.lora_archive_path = PathBuf::from(path);
        }
        if let Some(dir) = read_env("LORA_EXTRACT_DIR") {
            cfg.lora_extract_dir = PathBuf::from(dir);
        }

        Ok(cfg)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn bad_env(name: &str, value: &str) -> crate::Error {
    crate::Error::invalid_configuration(format!("env {name} has invalid value {value:?}"))
}

/// `"1"` is true, `"0"` is false; anything else is a configuration error.
/// Matches the reference deployment's integer-boolean env convention.
fn parse_int_bool(name: &str, raw: Option<&str>, default: bool) -> crate::Result<bool> {
    match raw {
        None => Ok(default),
        Some(raw) => {
            let parsed: i64 = raw.parse().map_err(|_| bad_env(name, raw))?;
            Ok(parsed == 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_int_bool;

    #[test]
    fn int_bool_parses_one_and_zero() {
        assert!(parse_int_bool("X", Some("1"), false).unwrap());
        assert!(!parse_int_bool("X", Some("0"), true).unwrap());
    }

    #[test]
    fn int_bool_defaults_when_unset() {
        assert!(parse_int_bool("X", None, true).unwrap());
        assert!(!parse_int_bool("X", None, false).unwrap());
    }

    #[test]
    fn int_bool_rejects_garbage() {
        parse_int_bool("X", Some("yes"), false).expect_err("non-integer should be rejected");
    }

    #[test]
    fn int_bool_treats_other_integers_as_false() {
        assert!(!parse_int_bool("X", Some("2"), true).unwrap());
    }
}
