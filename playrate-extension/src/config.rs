use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// URL substring that marks a video-watch page.
    #[serde(default = "default_watch_fragment")]
    pub watch_fragment: String,
    /// Stylesheet resource injected into qualifying pages.
    #[serde(default = "default_stylesheet")]
    pub stylesheet: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Interval between injection/self-initiation attempts.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Attempts before a poll gives up silently.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-request transport timeout.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            watch_fragment: default_watch_fragment(),
            stylesheet: default_stylesheet(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_watch_fragment() -> String {
    "youtube.com/watch".to_string()
}

fn default_stylesheet() -> String {
    "styles/content-style.css".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    15
}

fn default_response_timeout_ms() -> u64 {
    250
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl ConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Like `load`, but a missing file means defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).context("Failed to parse config file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
            Err(err) => Err(err).context(format!("Failed to read config file: {}", path)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.watch_fragment.is_empty() {
            anyhow::bail!("site.watch_fragment must not be empty");
        }
        if self.poll.interval_ms == 0 {
            anyhow::bail!("poll.interval_ms must be greater than zero");
        }
        if self.poll.max_attempts == 0 {
            anyhow::bail!("poll.max_attempts must be greater than zero");
        }
        if self.poll.response_timeout_ms == 0 {
            anyhow::bail!("poll.response_timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete_and_valid() {
        let config = ConfigFile::default();
        assert_eq!(config.site.watch_fragment, "youtube.com/watch");
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.poll.max_attempts, 15);
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: ConfigFile = toml::from_str(
            r#"
            [poll]
            interval_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.poll.interval_ms, 50);
        assert_eq!(config.poll.max_attempts, 15);
        assert_eq!(config.site.watch_fragment, "youtube.com/watch");
    }

    #[test]
    fn load_reads_a_file_and_errors_on_a_missing_one() {
        let path = std::env::temp_dir().join("playrate-config-load-test.toml");
        fs::write(&path, "[site]\nwatch_fragment = \"example.com/video\"\n").unwrap();
        let config = ConfigFile::load(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.site.watch_fragment, "example.com/video");
        assert_eq!(config.poll.max_attempts, 15);

        assert!(ConfigFile::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn validate_rejects_zero_bounds() {
        let mut config = ConfigFile::default();
        config.poll.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.site.watch_fragment.clear();
        assert!(config.validate().is_err());
    }
}
