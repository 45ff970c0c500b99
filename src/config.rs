//! Configuration loader and validator for the booru→Pleroma relay.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable carrying the Pleroma access token.
pub const API_KEY_ENV: &str = "PLEROMA_API_KEY";

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

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
///
/// Every section falls back to the built-in deployment defaults, so an empty
/// file (or no file at all) yields a runnable configuration once the API key
/// is provided through the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub danbooru: Danbooru,
    pub pleroma: Pleroma,
}

/// Relay loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    /// JSON file holding the last published post id.
    pub state_file: String,
    /// Polling interval; also the minimum post age and the cycle timeout.
    pub interval_secs: u64,
    /// Pause between two published posts.
    pub post_interval_secs: u64,
    /// Posts requested per source page.
    pub page_limit: u32,
    /// Prefix for post permalinks in the status body.
    pub permalink_base: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            state_file: "state.json".into(),
            interval_secs: 60 * 60,
            post_interval_secs: 10,
            page_limit: 100,
            permalink_base: "//booru.eientei.org".into(),
        }
    }
}

impl App {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval_secs)
    }
}

/// Image board (source) settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Danbooru {
    pub url: String,
    pub login: String,
    pub api_key: String,
    pub tags: Vec<String>,
}

impl Default for Danbooru {
    fn default() -> Self {
        Self {
            url: "https://booru.eientei.org".into(),
            login: String::new(),
            api_key: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Pleroma (sink) settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Pleroma {
    pub url: String,
    pub api_key: String,
}

impl Default for Pleroma {
    fn default() -> Self {
        Self {
            url: "https://eientei.org".into(),
            api_key: String::new(),
        }
    }
}

/// Load configuration and validate it.
/// - If `path` is given, the file must exist.
/// - If `path` is None, `config.yaml` in the current working directory is used
///   when present, otherwise the built-in defaults.
///
/// `PLEROMA_API_KEY`, when set and non-empty, overrides `pleroma.api_key`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(path) => parse(&fs::read_to_string(path)?)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                parse(&fs::read_to_string(default_path)?)?
            } else {
                Config::default()
            }
        }
    };
    apply_env(&mut cfg, std::env::var(API_KEY_ENV).ok());
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(content: &str) -> Result<Config, ConfigError> {
    // serde_yaml rejects an empty document; treat it as "all defaults".
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

fn apply_env(cfg: &mut Config, api_key: Option<String>) {
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        cfg.pleroma.api_key = key;
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.state_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.state_file must be non-empty"));
    }
    if cfg.app.interval_secs == 0 {
        return Err(ConfigError::Invalid("app.interval_secs must be > 0"));
    }
    if cfg.app.post_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.post_interval_secs must be > 0"));
    }
    if cfg.app.page_limit == 0 {
        return Err(ConfigError::Invalid("app.page_limit must be > 0"));
    }

    if Url::parse(&cfg.danbooru.url).is_err() {
        return Err(ConfigError::Invalid("danbooru.url must be an absolute URL"));
    }
    if Url::parse(&cfg.pleroma.url).is_err() {
        return Err(ConfigError::Invalid("pleroma.url must be an absolute URL"));
    }
    if cfg.pleroma.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "pleroma.api_key must be non-empty (set PLEROMA_API_KEY)",
        ));
    }

    Ok(())
}

/// Returns an example YAML file spelling out the defaults.
pub fn example() -> &'static str {
    r#"app:
  state_file: "state.json"
  interval_secs: 3600
  post_interval_secs: 10
  page_limit: 100
  permalink_base: "//booru.eientei.org"

danbooru:
  url: "https://booru.eientei.org"
  login: ""
  api_key: ""
  tags: []

pleroma:
  url: "https://eientei.org"
  api_key: "YOUR_PLEROMA_ACCESS_TOKEN"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn example_matches_defaults() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();

        let mut expected = Config::default();
        expected.pleroma.api_key = "YOUR_PLEROMA_ACCESS_TOKEN".into();
        assert_eq!(cfg, expected);
        assert_eq!(cfg.app.interval(), Duration::from_secs(3600));
        assert_eq!(cfg.app.post_interval(), Duration::from_secs(10));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = parse("danbooru:\n  tags: [\"rating:s\"]\n").unwrap();
        assert_eq!(cfg.danbooru.tags, vec!["rating:s".to_string()]);
        assert_eq!(cfg.danbooru.url, "https://booru.eientei.org");
        assert_eq!(cfg.app.page_limit, 100);

        assert_eq!(parse("   \n").unwrap(), Config::default());
    }

    #[test]
    fn env_key_overrides_file() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        apply_env(&mut cfg, Some("from-env".into()));
        assert_eq!(cfg.pleroma.api_key, "from-env");

        apply_env(&mut cfg, Some("  ".into()));
        assert_eq!(cfg.pleroma.api_key, "from-env");

        apply_env(&mut cfg, None);
        assert_eq!(cfg.pleroma.api_key, "from-env");
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let cfg = Config::default();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("PLEROMA_API_KEY")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_intervals() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.interval_secs = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("app.interval_secs")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.post_interval_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.page_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_urls() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.danbooru.url = "booru.eientei.org".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("danbooru.url")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.pleroma.url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.state_file, "state.json");
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let td = tempdir().unwrap();
        let p = td.path().join("nope.yaml");
        assert!(matches!(load(Some(&p)), Err(ConfigError::Io(_))));
    }
}
