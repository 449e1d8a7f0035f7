use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Extraction delegate settings
    pub extraction: ExtractionConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Path or name of the yt-dlp binary
    pub yt_dlp_path: String,

    /// Audio format produced per clip (mp3, m4a, ...)
    pub audio_format: String,

    /// yt-dlp audio quality (0 best .. 9 worst)
    pub audio_quality: String,

    /// Length of the extracted segment, in minutes from start_minute
    pub segment_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base directory for extraction work files (system temp dir if unset)
    pub work_dir: Option<PathBuf>,

    /// Keep the work directory after the run instead of deleting it
    pub keep_work_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                audio_format: "mp3".to_string(),
                audio_quality: "5".to_string(),
                segment_minutes: 10,
            },
            app: AppConfig {
                work_dir: None,
                keep_work_files: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tube-batch").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.extraction.yt_dlp_path.is_empty() {
            anyhow::bail!("yt-dlp path must not be empty");
        }

        if self.extraction.audio_format.is_empty() {
            anyhow::bail!("Audio format must not be empty");
        }

        if self.extraction.segment_minutes == 0 {
            anyhow::bail!("Segment length must be at least one minute");
        }

        Ok(())
    }
}
