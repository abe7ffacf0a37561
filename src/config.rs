//! Configuration management with YAML support

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classifier::{Classifier, ClassifierKind, RELATED_THRESHOLD, SAME_TASK_THRESHOLD};
use crate::error::{Result, TaskTrailError};
use crate::ingest::Blacklist;
use crate::model::DEFAULT_RECENT_CAPACITY;
use crate::notify::DEFAULT_EVENT_CAPACITY;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Same-task classifier selection and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub strategy: ClassifierKind,

    #[serde(default = "default_same_task_threshold")]
    pub same_task_threshold: f64,

    #[serde(default = "default_related_threshold")]
    pub related_threshold: f64,
}

/// A query dropped when entered on a matching URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBlacklistEntry {
    pub query: String,
    pub url: String,
}

/// Search model behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_recent_capacity")]
    pub recently_accessed_capacity: usize,

    #[serde(default = "default_url_blacklist")]
    pub url_blacklist: Vec<String>,

    #[serde(default = "default_query_blacklist")]
    pub query_blacklist: Vec<QueryBlacklistEntry>,
}

/// Ingestion runtime tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/tasktrail/tasktrail.db".to_string()
}

fn default_same_task_threshold() -> f64 {
    SAME_TASK_THRESHOLD
}

fn default_related_threshold() -> f64 {
    RELATED_THRESHOLD
}

fn default_recent_capacity() -> usize {
    DEFAULT_RECENT_CAPACITY
}

fn default_url_blacklist() -> Vec<String> {
    vec![
        "google\\.mail".to_string(),
        "www\\.google\\.com/(search|url)".to_string(),
        "^chrome".to_string(),
        "bing\\.com".to_string(),
    ]
}

fn default_query_blacklist() -> Vec<QueryBlacklistEntry> {
    vec![QueryBlacklistEntry {
        query: "Search".to_string(),
        url: "news\\.yahoo\\.com".to_string(),
    }]
}

fn default_chunk_size() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: ClassifierKind::default(),
            same_task_threshold: default_same_task_threshold(),
            related_threshold: default_related_threshold(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            recently_accessed_capacity: default_recent_capacity(),
            url_blacklist: default_url_blacklist(),
            query_blacklist: default_query_blacklist(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            flush_interval_ms: default_flush_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ModelConfig {
    /// Compile the configured URL and query patterns
    pub fn blacklist(&self) -> Result<Blacklist> {
        let queries: Vec<(&str, &str)> = self
            .query_blacklist
            .iter()
            .map(|entry| (entry.query.as_str(), entry.url.as_str()))
            .collect();
        let urls: Vec<&str> = self.url_blacklist.iter().map(String::as_str).collect();

        Blacklist::new(&urls, &queries)
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./tasktrail.yaml (current directory)
    /// 3. ~/.config/tasktrail/tasktrail.yaml
    pub fn load(path: &str) -> Result<Self> {
        let mut search_paths = vec![
            PathBuf::from(shellexpand::tilde(path).to_string()),
            PathBuf::from("tasktrail.yaml"),
        ];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("tasktrail").join("tasktrail.yaml"));
        }

        for search_path in &search_paths {
            if search_path.exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                config.validate()?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    fn validate(&self) -> Result<()> {
        let ClassifierConfig {
            same_task_threshold,
            related_threshold,
            ..
        } = self.classifier;

        if !(0.0..=1.0).contains(&same_task_threshold) || !(0.0..=1.0).contains(&related_threshold)
        {
            return Err(TaskTrailError::Config(format!(
                "classifier thresholds must lie in [0, 1] (same_task {}, related {})",
                same_task_threshold, related_threshold
            )));
        }
        if self.ingest.chunk_size == 0 {
            return Err(TaskTrailError::Config("ingest.chunk_size must be positive".into()));
        }
        Ok(())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    /// Build the configured classifier
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.classifier.strategy).with_thresholds(
            self.classifier.same_task_threshold,
            self.classifier.related_threshold,
        )
    }
}
