use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::config::WorkerConfig;

/// One archive the worker must fetch and unpack before serving.
#[derive(Clone, Debug)]
pub struct ArtifactSpec {
    pub url: String,
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
}

impl ArtifactSpec {
    pub fn lora_from_config(cfg: &WorkerConfig) -> Self {
        Self {
            url: cfg.lora_url.clone(),
            archive_path: cfg.lora_archive_path.clone(),
            extract_dir: cfg.lora_extract_dir.clone(),
        }
    }
}

/// Run the startup artifact phase: download, extract, delete the archive,
/// verify the result. Any failure here is fatal; the server must not bind
/// until this returns Ok.
pub async fn prepare(client: &reqwest::Client, spec: &ArtifactSpec) -> crate::Result<()> {
    download_file(client, &spec.url, &spec.archive_path).await?;

    tokio::fs::create_dir_all(&spec.extract_dir)
        .await
        .map_err(|e| crate::Error::artifact("creating extract dir", e))?;

    let archive_path = spec.archive_path.clone();
    let extract_dir = spec.extract_dir.clone();
    tokio::task::spawn_blocking(move || extract_tar_gz(&archive_path, &extract_dir))
        .await
        .map_err(|e| crate::Error::internal(format!("extract task failed: {e}")))??;
    tracing::info!(dir = %spec.extract_dir.display(), "artifact extracted");

    tokio::fs::remove_file(&spec.archive_path)
        .await
        .map_err(|e| crate::Error::artifact("removing downloaded archive", e))?;
    tracing::info!(path = %spec.archive_path.display(), "removed downloaded archive");

    if dir_is_empty(&spec.extract_dir) {
        return Err(crate::Error::invalid_configuration(format!(
            "artifact extraction produced an empty directory: {}",
            spec.extract_dir.display()
        )));
    }
    Ok(())
}

/// Streamed HTTPS download to a local path. Non-2xx statuses are errors.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> crate::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| crate::Error::artifact("creating download dir", e))?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| crate::Error::artifact(format!("downloading {url}"), e))?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| crate::Error::artifact("creating download file", e))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| crate::Error::artifact(format!("reading {url}"), e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| crate::Error::artifact("writing download file", e))?;
    }
    file.flush()
        .await
        .map_err(|e| crate::Error::artifact("flushing download file", e))?;

    tracing::info!(url, dest = %dest.display(), "downloaded artifact");
    Ok(())
}

/// Name of the archive's single top-level directory, if its first entry is
/// a directory.
pub fn top_level_dir(archive: &Path) -> crate::Result<Option<String>> {
    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut entries = tar.entries()?;
    let Some(first) = entries.next() else {
        return Ok(None);
    };
    let entry = first?;
    if !entry.header().entry_type().is_dir() {
        return Ok(None);
    }
    let path = entry.path()?;
    Ok(path
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned()))
}

/// Unpack a `.tar.gz`. When the archive's top-level directory name already
/// matches the extraction directory's name, unpack into the parent instead
/// so the files do not end up one level deeper than intended.
pub fn extract_tar_gz(archive: &Path, extract_dir: &Path) -> crate::Result<()> {
    let top = top_level_dir(archive)?;
    let matches_target = match (&top, extract_dir.file_name()) {
        (Some(top), Some(base)) => top.as_str() == base.to_string_lossy(),
        _ => false,
    };
    let dest = if matches_target {
        extract_dir.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        extract_dir.to_path_buf()
    };

    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    tar.unpack(&dest)
        .map_err(|e| crate::Error::artifact(format!("extracting {}", archive.display()), e))?;
    Ok(())
}

fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
