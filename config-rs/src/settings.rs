// config-rs/src/settings.rs
// Layered application settings: TOML file, then .env, then environment overrides

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the optional TOML settings file
pub const CONFIG_PATH_VAR: &str = "ITSM_ASSIST_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Settings shared by every component of the change-assist stack
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ticketing instance base URL, without a trailing slash
    pub snow_url: String,
    /// Secret path holding the ticketing credential pair
    pub snow_tag: String,
    pub vault_url: String,
    pub vault_token: Option<String>,
    pub vault_mount: String,
    pub kb_similarity_threshold_score: f32,
    pub kb_top_k: usize,
    /// Remote search service; the in-memory index is used when unset
    pub kb_search_url: Option<String>,
    /// Search service holding knowledge articles; in-memory when unset
    pub kb_articles_search_url: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,
    pub request_timeout_secs: u64,
    pub traversal_max_depth: usize,
    pub traversal_max_nodes: usize,
    pub attachment_dir: PathBuf,
    pub api_version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            snow_url: String::new(),
            snow_tag: "servicenow".to_string(),
            vault_url: "http://localhost:8200".to_string(),
            vault_token: None,
            vault_mount: "secret".to_string(),
            kb_similarity_threshold_score: 0.5,
            kb_top_k: 4,
            kb_search_url: None,
            kb_articles_search_url: None,
            llm_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 30,
            traversal_max_depth: 25,
            traversal_max_nodes: 500,
            attachment_dir: PathBuf::from("static"),
            api_version: "v1".to_string(),
        }
    }
}

impl AppConfig {
    /// Load settings for the running process.
    ///
    /// Reads `.env` into the environment, then the TOML file named by
    /// `ITSM_ASSIST_CONFIG` (if any), then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file = env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        Self::from_sources(file.as_deref(), |key| env::var(key).ok())
    }

    /// Build settings from an optional file and an arbitrary variable lookup
    pub fn from_sources<F>(file: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(&lookup)?;
        config.normalize();
        config.validate()?;

        log::debug!(
            "Loaded configuration: snow_url={}, threshold={}, top_k={}",
            config.snow_url,
            config.kb_similarity_threshold_score,
            config.kb_top_k
        );

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SNOW_URL") {
            self.snow_url = v;
        }
        if let Some(v) = lookup("SNOW_TAG") {
            self.snow_tag = v;
        }
        if let Some(v) = lookup("VAULT_ADDR") {
            self.vault_url = v;
        }
        if let Some(v) = lookup("VAULT_TOKEN") {
            self.vault_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("VAULT_MOUNT") {
            self.vault_mount = v;
        }
        if let Some(v) = lookup("KB_SIMILARITY_THRESHOLD") {
            self.kb_similarity_threshold_score = parse_value("KB_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("KB_TOP_K") {
            self.kb_top_k = parse_value("KB_TOP_K", &v)?;
        }
        if let Some(v) = lookup("KB_SEARCH_URL") {
            self.kb_search_url = Some(v).filter(|u| !u.is_empty());
        }
        if let Some(v) = lookup("KB_ARTICLES_SEARCH_URL") {
            self.kb_articles_search_url = Some(v).filter(|u| !u.is_empty());
        }
        if let Some(v) = lookup("LLM_API_URL") {
            self.llm_api_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = lookup("ITSM_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_value("ITSM_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TRAVERSAL_MAX_DEPTH") {
            self.traversal_max_depth = parse_value("TRAVERSAL_MAX_DEPTH", &v)?;
        }
        if let Some(v) = lookup("TRAVERSAL_MAX_NODES") {
            self.traversal_max_nodes = parse_value("TRAVERSAL_MAX_NODES", &v)?;
        }
        if let Some(v) = lookup("ATTACHMENT_DIR") {
            self.attachment_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("API_VERSION") {
            self.api_version = v;
        }
        Ok(())
    }

    fn normalize(&mut self) {
        while self.snow_url.ends_with('/') {
            self.snow_url.pop();
        }
    }

    /// Check invariants that the rest of the stack relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snow_url.is_empty() {
            return Err(ConfigError::MissingValue("SNOW_URL".to_string()));
        }
        if !(0.0..=1.0).contains(&self.kb_similarity_threshold_score) {
            return Err(ConfigError::InvalidValue(format!(
                "kb_similarity_threshold_score must be within [0, 1], got {}",
                self.kb_similarity_threshold_score
            )));
        }
        if self.kb_top_k == 0 {
            return Err(ConfigError::InvalidValue("kb_top_k must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{}={}", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_required_url() {
        let config =
            AppConfig::from_sources(None, lookup_from(&[("SNOW_URL", "https://acme.service-now.com/")]))
                .unwrap();

        assert_eq!(config.snow_url, "https://acme.service-now.com");
        assert_eq!(config.kb_similarity_threshold_score, 0.5);
        assert_eq!(config.snow_tag, "servicenow");
        assert_eq!(config.traversal_max_depth, 25);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let err = AppConfig::from_sources(None, lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue(ref v) if v == "SNOW_URL"));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = AppConfig::from_sources(
            None,
            lookup_from(&[("SNOW_URL", "https://x"), ("KB_SIMILARITY_THRESHOLD", "1.5")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_unparseable_number() {
        let err = AppConfig::from_sources(
            None,
            lookup_from(&[("SNOW_URL", "https://x"), ("KB_TOP_K", "many")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v) if v.contains("KB_TOP_K")));
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "snow_url = \"https://file.example.com\"\nkb_top_k = 7\nkb_similarity_threshold_score = 0.3"
        )
        .unwrap();

        let config = AppConfig::from_sources(
            Some(file.path()),
            lookup_from(&[
                ("KB_SIMILARITY_THRESHOLD", "0.75"),
                ("VAULT_TOKEN", ""),
                ("KB_ARTICLES_SEARCH_URL", "http://search:8080/kb"),
            ]),
        )
        .unwrap();

        assert_eq!(config.snow_url, "https://file.example.com");
        assert_eq!(config.kb_top_k, 7);
        assert_eq!(config.kb_similarity_threshold_score, 0.75);
        assert!(config.vault_token.is_none());
        assert!(config.kb_search_url.is_none());
        assert_eq!(config.kb_articles_search_url.as_deref(), Some("http://search:8080/kb"));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_sources(Some(Path::new("/nonexistent/itsm.toml")), lookup_from(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
