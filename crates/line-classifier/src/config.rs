use std::path::PathBuf;

use crate::error::AppError;
use crate::llm::DEFAULT_MODEL;
use crate::loader::HierarchyFormat;

/// Which classifier the runner builds.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Structured generation against an OpenAI-compatible endpoint.
    Llm,
    /// Similarity search over a LanceDB index at `lancedb_path`.
    Vector { lancedb_path: String },
}

/// Runner configuration loaded explicitly from environment variables.
///
/// OpenAI connection settings are read separately by `OpenAiClientConfig::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub strategy: Strategy,
    pub model: String,
    pub temperature: f32,
    /// Redis connection URL. `None` disables fingerprint caching.
    pub redis_url: Option<String>,
    /// Hierarchy table; the built-in sample hierarchy is used when absent.
    pub hierarchy_path: Option<PathBuf>,
    pub hierarchy_format: HierarchyFormat,
    /// One line item per line; the labelled sample items are used when absent.
    pub line_items_path: Option<PathBuf>,
    pub force_reindex: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `CLASSIFIER`: `llm` (default) or `vector`
    /// - `CLASSIFIER_MODEL`, `CLASSIFIER_TEMPERATURE`: generation settings
    /// - `LANCEDB_PATH`: required for `vector`
    /// - `REDIS_URL`: optional
    /// - `HIERARCHY_PATH`, `HIERARCHY_FORMAT` (`levels` or `links`): optional
    /// - `LINE_ITEMS_PATH`: optional
    /// - `FORCE_REINDEX`: `1`/`true` to rebuild the index unconditionally
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let classifier = var("CLASSIFIER").map(|v| v.to_ascii_lowercase());
        let strategy = match classifier.as_deref() {
            None | Some("llm") => Strategy::Llm,
            Some("vector") => Strategy::Vector {
                lancedb_path: var("LANCEDB_PATH").ok_or_else(|| {
                    AppError::Config(
                        "LANCEDB_PATH environment variable is required for CLASSIFIER=vector"
                            .to_string(),
                    )
                })?,
            },
            Some(other) => {
                return Err(AppError::Config(format!(
                    "unknown CLASSIFIER '{other}' (expected 'llm' or 'vector')"
                )))
            }
        };

        let temperature = match var("CLASSIFIER_TEMPERATURE") {
            Some(t) => t.parse::<f32>().map_err(|e| {
                AppError::Config(format!("invalid CLASSIFIER_TEMPERATURE '{t}': {e}"))
            })?,
            None => 0.0,
        };

        let hierarchy_format = match var("HIERARCHY_FORMAT") {
            Some(f) => f.parse()?,
            None => HierarchyFormat::default(),
        };

        let force_reindex = match var("FORCE_REINDEX").map(|v| v.to_ascii_lowercase()) {
            None => false,
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(AppError::Config(format!(
                        "invalid FORCE_REINDEX '{v}' (expected true or false)"
                    )))
                }
            },
        };

        Ok(Self {
            strategy,
            model: var("CLASSIFIER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            redis_url: var("REDIS_URL"),
            hierarchy_path: var("HIERARCHY_PATH").map(PathBuf::from),
            hierarchy_format,
            line_items_path: var("LINE_ITEMS_PATH").map(PathBuf::from),
            force_reindex,
        })
    }
}
