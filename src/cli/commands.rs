//! Command implementations for the osslite binary

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::{error, info, warn};

use crate::config::{self, Config};
use crate::oss::Client;

/// Content type for a file extension (leading dot optional)
pub fn content_type_for_extension(ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    mime_guess::from_ext(ext).first_or_octet_stream().to_string()
}

/// Options for [`upload_dir`]
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub dry_run: bool,
    pub no_md5: bool,
    pub exclude_ext: Vec<String>,
    pub workers: usize,
    pub progress: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            no_md5: false,
            exclude_ext: Vec::new(),
            workers: default_workers(),
            progress: false,
        }
    }
}

/// Number of CPUs, or 4 when unknown
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Outcome of a directory upload
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Extension of `path` without the dot, or "" when it has none
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_excluded(path: &Path, exclude_ext: &[String]) -> bool {
    let ext = extension_of(path);
    exclude_ext
        .iter()
        .any(|excluded| excluded.trim_start_matches('.') == ext)
}

/// Remote key of `path` relative to `root`, always `/`-separated
pub fn remote_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .context(format!("{:?} is not under {:?}", path, root))?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

/// Collect regular files under a directory recursively. Symlinks are skipped.
pub fn collect_files<'a>(
    path: &'a Path,
) -> Pin<Box<dyn Future<Output = Result<Vec<(PathBuf, u64)>>> + Send + 'a>> {
    Box::pin(async move {
        let mut files = Vec::new();

        let mut entries = fs::read_dir(path)
            .await
            .context(format!("Failed to read directory {:?}", path))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_file() {
                let metadata = entry.metadata().await?;
                files.push((path, metadata.len()));
            } else if file_type.is_dir() {
                let sub_files = collect_files(&path).await?;
                files.extend(sub_files);
            }
        }

        files.sort();
        Ok(files)
    })
}

async fn upload_file(client: &Client, path: &Path, key: &str, no_md5: bool) -> Result<u64> {
    let content_type = content_type_for_extension(&extension_of(path));
    let data = fs::read(path)
        .await
        .context(format!("Failed to read {:?}", path))?;
    let size = data.len() as u64;

    let digest = (!no_md5).then(|| md5::compute(&data));
    let receipt = client
        .upload(key, data, digest.as_ref().map(|d| &d[..]), Some(content_type.as_str()))
        .await
        .context(format!("Failed to upload to {}", client.url(key)))?;

    info!("Uploaded to {} ({} bytes)", receipt.url, size);
    Ok(size)
}

/// Upload every regular file under `root` to its root-relative key.
///
/// Individual failures are logged and counted, not returned.
pub async fn upload_dir(client: &Client, root: &Path, opts: &UploadOptions) -> Result<UploadSummary> {
    let files: Vec<(PathBuf, String)> = collect_files(root)
        .await?
        .into_iter()
        .filter(|(path, _)| !is_excluded(path, &opts.exclude_ext))
        .map(|(path, _)| -> Result<(PathBuf, String)> {
            let key = remote_key(root, &path)?;
            Ok((path, key))
        })
        .collect::<Result<_>>()?;

    let mut summary = UploadSummary::default();

    if opts.dry_run {
        for (path, key) in &files {
            println!(
                "{} ({})",
                client.url(key),
                content_type_for_extension(&extension_of(path))
            );
        }
        return Ok(summary);
    }

    let pb = if opts.progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green/blue} {pos}/{len} files")?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let workers = opts.workers.max(1);
    let mut uploads = stream::iter(files)
        .map(|(path, key)| async move {
            let result = upload_file(client, &path, &key, opts.no_md5).await;
            (key, result)
        })
        .buffer_unordered(workers);

    while let Some((key, result)) = uploads.next().await {
        match result {
            Ok(size) => {
                summary.uploaded += 1;
                summary.bytes += size;
            }
            Err(e) => {
                summary.failed += 1;
                error!("{}: {:#}", key, e);
            }
        }
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(summary)
}

/// Predicate keeping keys that start with any of `except` (leading `/` ignored)
pub fn except_filter(except: &[String]) -> impl Fn(&str) -> bool + Send + Sync + '_ {
    move |key: &str| {
        except
            .iter()
            .any(|prefix| key.starts_with(prefix.trim_start_matches('/')))
    }
}

pub fn cmd_init(path: &Path) -> Result<()> {
    config::write_yaml(path, &Config::template())?;
    println!("Created config file: {}", path.display());
    Ok(())
}

pub async fn cmd_upload(client: &Client, root: &Path, opts: &UploadOptions) -> Result<()> {
    let summary = upload_dir(client, root, opts).await?;
    if opts.dry_run {
        return Ok(());
    }

    println!(
        "Uploaded {} files ({})",
        summary.uploaded,
        format_bytes(summary.bytes)
    );
    if summary.failed > 0 {
        anyhow::bail!("{} uploads failed", summary.failed);
    }
    Ok(())
}

pub async fn cmd_rm(client: &Client, prefix: &str, except: &[String]) -> Result<()> {
    let keep = except_filter(except);
    let (outcome, result) = client.delete_recursive(prefix, &[&keep]).await;

    for key in &outcome.undeleted {
        println!("Not deleted: {}", key);
    }
    result.context(format!("Failed to delete {}", prefix))?;

    if outcome.deleted.is_empty() {
        warn!("No objects deleted under {}", prefix);
    } else {
        println!("Deleted {} objects", outcome.deleted.len());
    }
    Ok(())
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
