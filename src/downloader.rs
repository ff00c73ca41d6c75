//! URL downloader for presigned export links
//!
//! Streams the remote file to `{output_dir}/{filename}`. An existing target is
//! reused as-is. Failures are logged and reported as `None`, never raised.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

pub struct Downloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            show_progress: true,
        }
    }

    /// Disable the terminal progress bar (tests, scheduled runs without a tty)
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Download `url` into `output_dir/filename`, skipping when the file is already there
    pub async fn download(&self, url: &str, output_dir: &Path, filename: &str) -> Option<PathBuf> {
        let path = output_dir.join(filename);
        if path.exists() {
            info!("{:?} already existed, skipping download", path);
            return Some(path);
        }

        info!("Downloading files");
        let part = path.with_extension("part");
        match self.fetch_to(url, output_dir, &part, &path).await {
            Ok(bytes) => {
                info!("Downloaded successfully: {} bytes to {:?}", bytes, path);
                Some(path)
            }
            Err(e) => {
                error!("Download failed... {:#}", e);
                if let Err(e) = tokio::fs::remove_file(&part).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {:?}: {}", part, e);
                    }
                }
                None
            }
        }
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match total {
            Some(len) => {
                let pb = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} - {msg}")
                {
                    pb.set_style(style.progress_chars("█▓▒░  "));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        }
    }

    /// Stream into a `.part` file and rename once complete, so an aborted
    /// transfer never leaves a file that later runs would take as finished
    async fn fetch_to(&self, url: &str, output_dir: &Path, part: &Path, path: &Path) -> Result<u64> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .context(format!("Failed to create directory: {:?}", output_dir))?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Download failed with status: {}", status);
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .context(format!("Failed to create file: {:?}", part))?;

        let pb = self.progress_bar(response.content_length());
        if let Some(name) = path.file_name() {
            pb.set_message(name.to_string_lossy().to_string());
        }

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.context("Failed to read download body")? {
            file.write_all(&chunk)
                .await
                .context(format!("Failed to write {:?}", part))?;
            written += chunk.len() as u64;
            pb.set_position(written);
        }
        file.flush().await?;
        drop(file);
        pb.finish_and_clear();

        tokio::fs::rename(part, path)
            .await
            .context(format!("Failed to move {:?} into place", part))?;

        debug!("Wrote {} bytes to {:?}", written, path);
        Ok(written)
    }
}
