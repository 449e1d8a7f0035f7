use anyhow::Context;
use chrono::Duration;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

use super::{AudioExtractor, SourceProbe};
use crate::config::{AppConfig, Config};
use crate::{utils, Result};
use async_trait::async_trait;

/// Extraction delegate backed by yt-dlp
pub struct YtDlpExtractor {
    yt_dlp_path: String,
    audio_format: String,
    audio_quality: String,
    segment_minutes: u32,
    workspace: Workspace,
}

/// Staging directory the delegate downloads into before placement
enum Workspace {
    Ephemeral(TempDir),
    Pinned(PathBuf),
}

impl Workspace {
    fn prepare(app: &AppConfig) -> Result<Self> {
        if app.keep_work_files {
            let base = app
                .work_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            let dir = base.join(format!("tube-batch-{}", std::process::id()));
            fs_err::create_dir_all(&dir)?;
            tracing::info!("Keeping extraction work files in {}", dir.display());
            return Ok(Workspace::Pinned(dir));
        }

        let tmp = match &app.work_dir {
            Some(base) => TempDir::new_in(base),
            None => TempDir::new(),
        }
        .context("Failed to create work directory")?;

        Ok(Workspace::Ephemeral(tmp))
    }

    fn path(&self) -> &Path {
        match self {
            Workspace::Ephemeral(tmp) => tmp.path(),
            Workspace::Pinned(dir) => dir,
        }
    }
}

impl YtDlpExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            yt_dlp_path: config.extraction.yt_dlp_path.clone(),
            audio_format: config.extraction.audio_format.clone(),
            audio_quality: config.extraction.audio_quality.clone(),
            segment_minutes: config.extraction.segment_minutes,
            workspace: Workspace::prepare(&config.app)?,
        })
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> Result<bool> {
        let output = Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Ok(matches!(output, Ok(out) if out.status.success()))
    }

    /// Probe source metadata using yt-dlp
    async fn probe_source(&self, url: &str) -> Result<SourceProbe> {
        tracing::debug!("Probing source metadata for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--no-playlist", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed to probe the source: {}", error);
        }

        let info: Value = serde_json::from_slice(&output.stdout)?;

        Ok(parse_probe(&info))
    }

    /// Download the requested section as an audio file named after `label`
    async fn download_section(
        &self,
        url: &str,
        label: &str,
        start_minute: f64,
    ) -> Result<PathBuf> {
        let output_path = self
            .workspace
            .path()
            .join(format!("{}.{}", label, self.audio_format));
        let section = section_spec(start_minute, self.segment_minutes);

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--output", &output_path.to_string_lossy(),
                "--extract-audio",
                "--audio-format", &self.audio_format,
                "--audio-quality", &self.audio_quality,
                "--download-sections", &section,
                "--force-keyframes-at-cuts",
                "--no-playlist",
                "--newline",
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed to download audio: {}", error);
        }

        if !output_path.exists() {
            anyhow::bail!(
                "yt-dlp reported success but produced no file at {}",
                output_path.display()
            );
        }

        Ok(output_path)
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract_audio(&self, url: &str, label: &str, start_minute: &str) -> Result<PathBuf> {
        if !self.check_availability().await? {
            anyhow::bail!(
                "yt-dlp is not available. Please install it: https://github.com/yt-dlp/yt-dlp"
            );
        }

        let url = utils::validate_and_normalize_url(url)?;
        let start = parse_start_minute(start_minute)?;
        let probe = self.probe_source(&url).await?;

        match (&probe.title, &probe.duration) {
            (Some(title), Some(duration)) => tracing::info!(
                "Extracting \"{}\" ({}) from minute {}",
                title,
                utils::format_duration(duration.num_seconds() as f64),
                start
            ),
            (Some(title), None) => tracing::info!("Extracting \"{}\" from minute {}", title, start),
            _ => tracing::info!("Extracting {} from minute {}", url, start),
        }

        self.download_section(&url, label, start).await
    }
}

fn parse_probe(info: &Value) -> SourceProbe {
    let title = info["title"].as_str().map(|s| s.to_string());
    let duration = info["duration"].as_f64().map(|d| Duration::seconds(d as i64));

    SourceProbe { title, duration }
}

/// Parse the table's start_minute value as non-negative fractional minutes
fn parse_start_minute(raw: &str) -> Result<f64> {
    let minutes: f64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid start_minute {:?}", raw))?;

    if !minutes.is_finite() || minutes < 0.0 {
        anyhow::bail!("invalid start_minute {:?}", raw);
    }

    Ok(minutes)
}

/// Build the yt-dlp --download-sections argument for one clip.
/// The float cast saturates at `u64::MAX`, so the add must too.
fn section_spec(start_minute: f64, segment_minutes: u32) -> String {
    let start_secs = (start_minute * 60.0).round() as u64;
    let end_secs = start_secs.saturating_add(u64::from(segment_minutes) * 60);

    format!("*{}-{}", format_hms(start_secs), format_hms(end_secs))
}

fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
