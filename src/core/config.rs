use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

#[cfg(not(target_arch = "wasm32"))]
const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the story generation backend, e.g. "https://api.example.com".
    #[serde(default)]
    pub backend_endpoint: String,

    #[serde(default = "default_data")]
    pub data_folder: String,

    /// Stop on a failed stage instead of asking whether to retry.
    #[serde(default)]
    pub unattended: bool,

    #[serde(default = "default_quiz_size")]
    pub quiz_size: usize,

    /// Per-request timeout. Unset means a stalled stage waits indefinitely.
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_endpoint: String::new(),
            data_folder: default_data(),
            unattended: false,
            quiz_size: default_quiz_size(),
            request_timeout_seconds: None,
        }
    }
}

fn default_data() -> String {
    "data".to_string()
}
fn default_quiz_size() -> usize {
    crate::services::quiz::DEFAULT_QUIZ_SIZE
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Failed to parse config.yml")
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        Self::from_yaml(&content)
    }

    /// Like `load`, but a missing file yields the defaults so first-run
    /// setup can fill them in.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_or_default() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            Self::load()
        } else {
            Ok(Self::default())
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(CONFIG_FILE, content).context("Failed to write config.yml")?;
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_folder)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_yaml("backend_endpoint: http://localhost:3000\n").unwrap();
        assert_eq!(config.backend_endpoint, "http://localhost:3000");
        assert_eq!(config.data_folder, "data");
        assert_eq!(config.quiz_size, 5);
        assert!(!config.unattended);
        assert_eq!(config.request_timeout_seconds, None);
    }

    #[test]
    fn test_explicit_values() {
        let yaml = "backend_endpoint: https://stories.example\n\
                    data_folder: /tmp/lh\n\
                    unattended: true\n\
                    quiz_size: 3\n\
                    request_timeout_seconds: 90\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.data_folder, "/tmp/lh");
        assert!(config.unattended);
        assert_eq!(config.quiz_size, 3);
        assert_eq!(config.request_timeout_seconds, Some(90));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(Config::from_yaml("quiz_size: [not a number").is_err());
    }
}
