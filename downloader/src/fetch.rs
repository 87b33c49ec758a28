/// External fetch invocation (`yt-dlp` in audio-extraction mode).
///
/// The tool's stdout/stderr are forwarded to tracing at debug level.
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use discog_shared::errors::FetchError;
use discog_shared::models::CredentialSelection;

use crate::metadata::push_cookie_args;

/// One fetch of a release, playlist, track or song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub output_dir: PathBuf,
    /// Manifest used as `--download-archive`.
    pub archive: Option<PathBuf>,
    pub credential: Option<CredentialSelection>,
    /// Expand playlists (`--yes-playlist`).
    pub expand_playlist: bool,
}

/// Fixed tool flags shared by every fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub audio_format: String,
    pub audio_quality: String,
    pub concurrent_fragments: u32,
    pub rate_limit: String,
    pub external_downloader: String,
    pub downloader_args: String,
    pub output_template: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            audio_format: "mp3".to_string(),
            audio_quality: "0".to_string(),
            concurrent_fragments: 8,
            rate_limit: "2M".to_string(),
            external_downloader: "aria2c".to_string(),
            downloader_args: "aria2c:-x16 -s16 -k1M".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
        }
    }
}

/// Performs the actual download of a request.
#[async_trait]
pub trait FetchTool: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), FetchError>;
}

/// Fetch tool backed by the `yt-dlp` binary.
pub struct YtDlpFetcher {
    binary: String,
    options: FetchOptions,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            options: FetchOptions::default(),
        }
    }

    pub fn build_args(&self, request: &FetchRequest) -> Vec<String> {
        let o = &self.options;
        let mut args = Vec::new();
        push_cookie_args(&mut args, request.credential);
        if request.expand_playlist {
            args.push("--yes-playlist".to_string());
        }
        args.extend([
            "--ignore-errors".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            o.audio_format.clone(),
            "--audio-quality".to_string(),
            o.audio_quality.clone(),
            "--embed-metadata".to_string(),
            "--embed-thumbnail".to_string(),
            "--concurrent-fragments".to_string(),
            o.concurrent_fragments.to_string(),
            "--limit-rate".to_string(),
            o.rate_limit.clone(),
            "--downloader".to_string(),
            o.external_downloader.clone(),
        ]);
        if let Some(archive) = &request.archive {
            args.push("--download-archive".to_string());
            args.push(archive.to_string_lossy().to_string());
        }
        args.extend([
            "--downloader-args".to_string(),
            o.downloader_args.clone(),
            "--output".to_string(),
            request
                .output_dir
                .join(&o.output_template)
                .to_string_lossy()
                .to_string(),
            request.url.clone(),
        ]);
        args
    }
}

#[async_trait]
impl FetchTool for YtDlpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), FetchError> {
        info!("Downloading: {}", request.url);

        let mut child = Command::new(&self.binary)
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FetchError::SpawnFailed {
                program: self.binary.clone(),
                reason: e.to_string(),
            })?;

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "yt_dlp", "{}", line);
                }
            })
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "yt_dlp", "stderr: {}", line);
                }
            })
        });

        let status = child.wait().await?;
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        if status.success() {
            info!("Finished: {}", request.url);
            Ok(())
        } else {
            Err(FetchError::Exited(status.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FetchRequest {
        FetchRequest {
            url: "https://www.youtube.com/playlist?list=OLAK5uy_abcdefghijk".to_string(),
            output_dir: PathBuf::from("out/Hits"),
            archive: Some(PathBuf::from("out/Hits/tracks.txt")),
            credential: Some(CredentialSelection::Firefox),
            expand_playlist: true,
        }
    }

    #[test]
    fn test_release_args() {
        let args = YtDlpFetcher::new("yt-dlp").build_args(&request());

        assert_eq!(&args[..3], ["--cookies-from-browser", "firefox", "--yes-playlist"]);
        let pos = args.iter().position(|a| a == "--download-archive").unwrap();
        assert_eq!(args[pos + 1], "out/Hits/tracks.txt");
        let pos = args.iter().position(|a| a == "--output").unwrap();
        assert_eq!(args[pos + 1], "out/Hits/%(title)s.%(ext)s");
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/playlist?list=OLAK5uy_abcdefghijk");
        for flag in ["--ignore-errors", "--extract-audio", "--embed-metadata", "--embed-thumbnail"] {
            assert!(args.iter().any(|a| a == flag), "missing {}", flag);
        }
        let pos = args.iter().position(|a| a == "--downloader-args").unwrap();
        assert_eq!(args[pos + 1], "aria2c:-x16 -s16 -k1M");
    }

    #[test]
    fn test_song_args() {
        let mut req = request();
        req.archive = None;
        req.credential = None;
        req.expand_playlist = false;
        let args = YtDlpFetcher::new("yt-dlp").build_args(&req);

        assert_eq!(args[0], "--ignore-errors");
        assert!(!args.iter().any(|a| a == "--yes-playlist"));
        assert!(!args.iter().any(|a| a == "--download-archive"));
        assert!(!args.iter().any(|a| a == "--cookies-from-browser"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let fetcher = YtDlpFetcher::new("/nonexistent/discog-yt-dlp");
        let err = fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::SpawnFailed { .. }));
    }
}
