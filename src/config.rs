//! Configuration loader and validator for the viral engagement bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub platform: Platform,
    pub search: Search,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub retry: Retry,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub queue_file: String,
    pub state_file: String,
}

/// External platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub base_url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_cookie: Option<String>,
    pub target_username: String,
}

/// Discovery query for engagement/like/follow candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Search {
    pub query: String,
}

/// Throttles, daily ceilings, and per-cycle caps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Limits {
    pub max_qps: usize,
    pub window_ms: u64,
    pub daily_likes: u32,
    pub daily_follows: u32,
    pub item_delay_ms: u64,
    pub mentions_per_cycle: usize,
    pub engagements_per_cycle: usize,
    pub likes_per_cycle: u32,
    pub follows_per_cycle: u32,
    pub stale_post_hours: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_qps: 200,
            window_ms: 1000,
            daily_likes: 30,
            daily_follows: 20,
            item_delay_ms: 2500,
            mentions_per_cycle: 3,
            engagements_per_cycle: 2,
            likes_per_cycle: 5,
            follows_per_cycle: 3,
            stale_post_hours: 1.5,
        }
    }
}

/// Retry policy for idempotent platform reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Retry {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn queue_path(&self) -> PathBuf {
        Path::new(&self.app.data_dir).join(&self.app.queue_file)
    }

    pub fn state_path(&self) -> PathBuf {
        Path::new(&self.app.data_dir).join(&self.app.state_file)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.queue_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.queue_file must be non-empty"));
    }
    if cfg.app.state_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.state_file must be non-empty"));
    }

    if cfg.platform.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.base_url must be non-empty"));
    }
    if cfg.platform.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.api_key must be non-empty"));
    }
    if cfg.platform.target_username.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "platform.target_username must be non-empty",
        ));
    }

    if cfg.search.query.trim().is_empty() {
        return Err(ConfigError::Invalid("search.query must be non-empty"));
    }

    if cfg.limits.max_qps == 0 {
        return Err(ConfigError::Invalid("limits.max_qps must be > 0"));
    }
    if cfg.limits.window_ms == 0 {
        return Err(ConfigError::Invalid("limits.window_ms must be > 0"));
    }
    if cfg.limits.stale_post_hours <= 0.0 {
        return Err(ConfigError::Invalid("limits.stale_post_hours must be > 0"));
    }

    Ok(())
}

/// Returns a complete example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  queue_file: "twitter-queue.json"
  state_file: "twitter-viral-state.json"

platform:
  base_url: "https://api.twitterapi.io"
  api_key: "YOUR_API_KEY"
  login_cookie: "YOUR_LOGIN_COOKIE"
  target_username: "your_handle"

search:
  query: "(autonomous agents OR AI agents) min_faves:50 -is:retweet lang:en"

limits:
  max_qps: 200
  window_ms: 1000
  daily_likes: 30
  daily_follows: 20
  item_delay_ms: 2500
  mentions_per_cycle: 3
  engagements_per_cycle: 2
  likes_per_cycle: 5
  follows_per_cycle: 3
  stale_post_hours: 1.5

retry:
  max_retries: 3
  base_delay_ms: 1000
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.limits.daily_likes, 30);
        assert_eq!(cfg.retry.max_retries, 3);
    }

    #[test]
    fn limits_and_retry_default_when_omitted() {
        let cfg: Config = serde_yaml::from_str(
            r#"app:
  data_dir: "./data"
  queue_file: "q.json"
  state_file: "s.json"
platform:
  base_url: "https://api.example.test"
  api_key: "k"
  target_username: "u"
search:
  query: "rust"
"#,
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.limits, Limits::default());
        assert_eq!(cfg.retry, Retry::default());
        assert_eq!(cfg.platform.login_cookie, None);
    }

    #[test]
    fn invalid_api_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.platform.api_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("platform.api_key")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_limits() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.limits.max_qps = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.limits.window_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.platform.target_username, "your_handle");
        assert!(cfg.queue_path().ends_with("twitter-queue.json"));
    }
}
