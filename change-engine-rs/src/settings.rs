use std::path::PathBuf;
use std::time::Duration;

use config_rs::AppConfig;

/// Tunables shared by the engines
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub call_timeout: Duration,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub attachment_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            top_k: 4,
            call_timeout: Duration::from_secs(30),
            max_depth: 25,
            max_nodes: 500,
            attachment_dir: PathBuf::from("static"),
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            similarity_threshold: config.kb_similarity_threshold_score,
            top_k: config.kb_top_k,
            call_timeout: config.request_timeout(),
            max_depth: config.traversal_max_depth,
            max_nodes: config.traversal_max_nodes,
            attachment_dir: config.attachment_dir.clone(),
        }
    }
}
