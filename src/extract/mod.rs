use async_trait::async_trait;
use chrono::Duration;
use std::path::PathBuf;

use crate::Result;

pub mod ytdlp;

pub use ytdlp::YtDlpExtractor;

/// Metadata probed from a media source before download
#[derive(Debug, Clone)]
pub struct SourceProbe {
    /// Title or description of the media
    pub title: Option<String>,

    /// Duration of the media if available
    pub duration: Option<Duration>,
}

/// The external extraction capability consumed by the batch run.
///
/// Implementations fetch the media at `url` and produce an audio file named
/// after `label`, starting at `start_minute` minutes into the media. The
/// returned path stays valid until the caller moves the file away.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, url: &str, label: &str, start_minute: &str) -> Result<PathBuf>;
}
