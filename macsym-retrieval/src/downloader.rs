//! The chunked, retrying HTTP downloader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{ACCEPT_RANGES, RANGE};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use std::sync::Arc;

use macsym_common::{Credentials, DownloadConfig};

use crate::chunk::{merge_chunks, plan_chunks, ChunkInfo};
use crate::error::{RetrievalError, RetrievalErrorKind};
use crate::progress::{format_size, DownloadProgress, ProgressTracker};

/// Callback invoked with a progress snapshot after every chunk completion.
pub type ProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Downloads symbol archives over HTTP.
///
/// Large files transfer as concurrent byte-range chunks bounded by a
/// semaphore, each chunk retrying with exponential backoff before the whole
/// transfer fails. Servers that do not support ranges (or do not declare a
/// size) fall back to a single streamed GET.
pub struct Downloader {
    client: Client,
    chunk_size: u64,
    max_concurrent_chunks: usize,
    max_retries: u32,
    credentials: Option<Credentials>,
    progress: Option<ProgressCallback>,
}

impl Downloader {
    /// Creates a downloader from the transfer configuration and the
    /// credentials of the selected source tier.
    pub fn new(
        config: &DownloadConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RetrievalError::new(RetrievalErrorKind::Http, e))?;

        Ok(Downloader {
            client,
            chunk_size: config.chunk_size.max(1),
            max_concurrent_chunks: config.max_concurrent_chunks.max(1),
            max_retries: config.max_chunk_retries.max(1),
            credentials,
            progress: None,
        })
    }

    /// Installs a progress callback.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// HEAD request learning the archive's total size and whether the
    /// server honors byte ranges.
    ///
    /// Unauthorized (401) and missing (404) archives are classified errors
    /// so the pipeline can report them distinctly.
    pub async fn fetch_metadata(&self, url: &str) -> Result<(u64, bool), RetrievalError> {
        let request = with_auth(self.client.head(url), &self.credentials);
        let response = request.send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(RetrievalError::new(
                    RetrievalErrorKind::Unauthorized,
                    format!("HTTP 401 for {url}"),
                ))
            }
            StatusCode::NOT_FOUND => {
                return Err(RetrievalError::new(
                    RetrievalErrorKind::NotFound,
                    format!("HTTP 404 for {url}"),
                ))
            }
            status if !status.is_success() => {
                return Err(RetrievalError::new(
                    RetrievalErrorKind::Http,
                    format!("HTTP {status} for {url}"),
                ))
            }
            _ => {}
        }

        let total_size = response.content_length().unwrap_or(0);
        let supports_range = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        Ok((total_size, supports_range))
    }

    /// Downloads `url` to `target`.
    ///
    /// Skips the transfer when the target file already exists. Chunk temp
    /// files live in a `<target>.parts` directory and are merged strictly by
    /// chunk index only after every chunk succeeded.
    pub async fn download_file(&self, url: &str, target: &Path) -> Result<(), RetrievalError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if target.exists() {
            tracing::info!(path = %target.display(), "archive already on disk, skipping download");
            return Ok(());
        }

        let (total_size, supports_range) = self.fetch_metadata(url).await?;
        if total_size == 0 || !supports_range {
            tracing::info!(url, "size unknown or ranges unsupported, using simple download");
            return self.simple_download(url, target).await;
        }

        let chunks = plan_chunks(total_size, self.chunk_size);
        tracing::info!(
            url,
            size = %format_size(total_size as f64),
            chunks = chunks.len(),
            "starting chunked download"
        );

        let temp_dir = parts_dir(target);
        tokio::fs::create_dir_all(&temp_dir).await?;

        let result = self
            .fetch_chunks(url, target, &temp_dir, total_size, chunks)
            .await;

        if result.is_err() {
            // No partial output: the final file is only written by the merge.
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        }

        result
    }

    async fn fetch_chunks(
        &self,
        url: &str,
        target: &Path,
        temp_dir: &Path,
        total_size: u64,
        chunks: Vec<ChunkInfo>,
    ) -> Result<(), RetrievalError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_chunks));
        let mut tracker = ProgressTracker::new(
            url,
            &target.file_name().unwrap_or_default().to_string_lossy(),
            total_size,
            chunks.len(),
        );

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let client = self.client.clone();
            let credentials = self.credentials.clone();
            let url = url.to_owned();
            let temp_dir = temp_dir.to_path_buf();
            let semaphore = Arc::clone(&semaphore);
            let max_retries = self.max_retries;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                fetch_chunk_with_retry(&client, &url, &credentials, chunk, &temp_dir, max_retries)
                    .await
            });
        }

        let mut completed = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let chunk = match joined {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(error)) => {
                    tasks.abort_all();
                    return Err(error);
                }
                Err(join_error) => {
                    tasks.abort_all();
                    return Err(RetrievalError::new(RetrievalErrorKind::Io, join_error));
                }
            };

            let progress = tracker.complete_chunk(chunk.size);
            tracing::info!(
                chunk = chunk.index,
                done = %format!("{}/{}", progress.chunks_completed, progress.total_chunks),
                percent = %format!("{:.1}%", progress.percent()),
                speed = %format!("{}/s", format_size(progress.speed)),
                eta = %format!("{:.0}s", progress.eta),
                "chunk completed"
            );
            if let Some(callback) = &self.progress {
                callback(&progress);
            }
            completed.push(chunk);
        }

        merge_chunks(&mut completed, target)?;
        let _ = tokio::fs::remove_dir_all(temp_dir).await;

        tracing::info!(path = %target.display(), "download completed");
        Ok(())
    }

    /// Single streamed GET for servers without range support.
    async fn simple_download(&self, url: &str, target: &Path) -> Result<(), RetrievalError> {
        let request = with_auth(self.client.get(url), &self.credentials);
        let mut response = request.send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(target).await?;
        while let Some(bytes) = response.chunk().await? {
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        Ok(())
    }
}

fn with_auth(
    request: reqwest::RequestBuilder,
    credentials: &Option<Credentials>,
) -> reqwest::RequestBuilder {
    match credentials {
        Some(credentials) => {
            request.basic_auth(&credentials.username, Some(&credentials.password))
        }
        None => request,
    }
}

fn parts_dir(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".parts");
    target.with_file_name(name)
}

async fn fetch_chunk_with_retry(
    client: &Client,
    url: &str,
    credentials: &Option<Credentials>,
    mut chunk: ChunkInfo,
    temp_dir: &Path,
    max_retries: u32,
) -> Result<ChunkInfo, RetrievalError> {
    let mut delay = Duration::from_secs(2);

    for attempt in 1..=max_retries {
        match fetch_chunk(client, url, credentials, &mut chunk, temp_dir).await {
            Ok(()) => return Ok(chunk),
            Err(error) if attempt < max_retries => {
                tracing::warn!(
                    chunk = chunk.index,
                    attempt,
                    %error,
                    "chunk failed, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
            }
            Err(error) => return Err(error),
        }
    }

    unreachable!("retry loop always returns")
}

async fn fetch_chunk(
    client: &Client,
    url: &str,
    credentials: &Option<Credentials>,
    chunk: &mut ChunkInfo,
    temp_dir: &Path,
) -> Result<(), RetrievalError> {
    let range = format!("bytes={}-{}", chunk.byte_start, chunk.byte_end);
    let request = with_auth(client.get(url), credentials).header(RANGE, range);
    let mut response = request.send().await?;

    let status = response.status();
    if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
        return Err(RetrievalError::new(
            RetrievalErrorKind::Http,
            format!("HTTP {status} for chunk {}", chunk.index),
        ));
    }

    let path = temp_dir.join(format!("chunk_{:06}.tmp", chunk.index));
    let mut file = tokio::fs::File::create(&path).await?;
    while let Some(bytes) = response.chunk().await? {
        file.write_all(&bytes).await?;
    }
    file.flush().await?;

    chunk.temp_file = Some(path);
    chunk.completed = true;
    Ok(())
}
