use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::WorkerConfig;

/// Reference to one LoRA adapter the engine can apply at inference time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoraRequest {
    pub name: String,
    pub id: u32,
    pub path: PathBuf,
}

impl LoraRequest {
    pub fn new(name: impl Into<String>, id: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            id,
            path: path.into(),
        }
    }
}

/// Adapter lookup keyed by name, with a default for jobs that name none.
///
/// The registry is assembled once during startup and read-only afterwards;
/// requests never mutate it.
#[derive(Clone, Debug)]
pub struct LoraRegistry {
    adapters: HashMap<String, LoraRequest>,
    default_name: String,
}

impl LoraRegistry {
    pub fn new(default_adapter: LoraRequest) -> Self {
        let default_name = default_adapter.name.clone();
        let mut adapters = HashMap::new();
        adapters.insert(default_name.clone(), default_adapter);
        Self {
            adapters,
            default_name,
        }
    }

    pub fn from_config(cfg: &WorkerConfig) -> Self {
        Self::new(LoraRequest::new(
            cfg.lora_name.clone(),
            1,
            cfg.lora_extract_dir.clone(),
        ))
    }

    pub fn register(&mut self, adapter: LoraRequest) {
        self.adapters.insert(adapter.name.clone(), adapter);
    }

    pub fn resolve(&self, name: Option<&str>) -> crate::Result<LoraRequest> {
        let name = name.unwrap_or(&self.default_name);
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| crate::Error::bad_request(format!("unknown lora adapter: {name}")))
    }

    /// Every registered adapter must have its extracted files on disk before
    /// the worker accepts requests; a partial extraction would corrupt
    /// adapter loading silently.
    pub fn verify_artifacts(&self) -> crate::Result<()> {
        for adapter in self.adapters.values() {
            verify_adapter_dir(&adapter.name, &adapter.path)?;
        }
        Ok(())
    }
}

fn verify_adapter_dir(name: &str, path: &Path) -> crate::Result<()> {
    let mut entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            return Err(crate::Error::invalid_configuration(format!(
                "lora adapter {name}: cannot read {}: {e}",
                path.display()
            )));
        }
    };
    if entries.next().is_none() {
        return Err(crate::Error::invalid_configuration(format!(
            "lora adapter {name}: {} is empty",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LoraRegistry, LoraRequest};

    fn registry() -> LoraRegistry {
        LoraRegistry::new(LoraRequest::new("safecoder", 1, "/tmp/safecoder"))
    }

    #[test]
    fn resolves_default_when_unnamed() {
        let adapter = registry().resolve(None).expect("default must resolve");
        assert_eq!(adapter.name, "safecoder");
    }

    #[test]
    fn resolves_registered_adapter_by_name() {
        let mut reg = registry();
        reg.register(LoraRequest::new("other", 2, "/tmp/other"));
        let adapter = reg.resolve(Some("other")).expect("named adapter");
        assert_eq!(adapter.id, 2);
    }

    #[test]
    fn rejects_unknown_adapter() {
        let err = registry()
            .resolve(Some("nope"))
            .expect_err("unknown adapter must fail");
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn verify_fails_before_artifacts_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("never-extracted");
        let reg = LoraRegistry::new(LoraRequest::new("safecoder", 1, &missing));
        reg.verify_artifacts()
            .expect_err("missing adapter dir must fail verification");
    }

    #[test]
    fn verify_fails_on_empty_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = LoraRegistry::new(LoraRequest::new("safecoder", 1, dir.path()));
        reg.verify_artifacts()
            .expect_err("empty adapter dir must fail verification");
    }

    #[test]
    fn verify_passes_with_files_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("adapter_model.bin"), b"weights").expect("write");
        let reg = LoraRegistry::new(LoraRequest::new("safecoder", 1, dir.path()));
        reg.verify_artifacts().expect("populated dir must verify");
    }
}
