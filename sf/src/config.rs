//! StoryForge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default endpoint for the `anthropic` provider
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default endpoint for the `openai` provider
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Main StoryForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Feedback loop thresholds
    pub workflow: WorkflowConfig,

    /// Story validation scoring
    pub validation: ValidationConfig,

    /// Task decomposition settings
    pub decomposition: DecompositionConfig,

    /// Where finished backlogs are written
    pub storage: StorageConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key environment variable is set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        debug!(api_key_env = %self.llm.api_key_env, "Config::validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.workflow.max_iterations == 0 {
            return Err(eyre::eyre!("workflow.max-iterations must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path must load or fail
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .storyforge.yml
        let local_config = PathBuf::from(".storyforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/storyforge/storyforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("storyforge").join("storyforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".storyforge.yml")];
                if let Some(dir) = dirs::config_dir() {
                    paths.push(dir.join("storyforge").join("storyforge.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("anthropic" or "openai")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL; left at the Anthropic default, `openai` uses its own endpoint
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
            temperature: 0.3,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(api_key_env = %self.api_key_env, "LlmConfig::get_api_key: called");
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("Environment variable {} is not set", self.api_key_env))
    }
}

/// Feedback loop thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Generation attempts before the loop must accept or escalate
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Score that accepts regardless of status
    #[serde(rename = "fast-path-score")]
    pub fast_path_score: f64,

    /// Score that accepts once iterations are exhausted
    #[serde(rename = "salvage-score")]
    pub salvage_score: f64,

    /// Score drop (vs previous pass) that stops iterating
    #[serde(rename = "degradation-margin")]
    pub degradation_margin: f64,

    /// Score that still accepts after a degradation stop
    #[serde(rename = "degradation-accept-score")]
    pub degradation_accept_score: f64,

    /// Minimum score worth another generation attempt
    #[serde(rename = "retry-floor")]
    pub retry_floor: f64,

    /// Append template stories for uncovered non-functional requirements
    #[serde(rename = "fill-coverage-gaps")]
    pub fill_coverage_gaps: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            fast_path_score: 85.0,
            salvage_score: 70.0,
            degradation_margin: 10.0,
            degradation_accept_score: 60.0,
            retry_floor: 50.0,
            fill_coverage_gaps: false,
        }
    }
}

/// Story validation scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum score for Approved
    #[serde(rename = "approve-score")]
    pub approve_score: f64,

    /// Minimum score for NeedsRevision
    #[serde(rename = "revise-score")]
    pub revise_score: f64,

    /// Approved requires strictly fewer structural issues than this
    #[serde(rename = "max-approve-issues")]
    pub max_approve_issues: usize,

    /// Points subtracted per structural issue
    #[serde(rename = "penalty-per-issue")]
    pub penalty_per_issue: f64,

    /// Cap on the structural penalty
    #[serde(rename = "max-penalty")]
    pub max_penalty: f64,

    /// Semantic score used when the scoring call fails
    #[serde(rename = "degraded-score")]
    pub degraded_score: f64,

    /// Semantic score used when the model omits or garbles the score
    #[serde(rename = "missing-score")]
    pub missing_score: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            approve_score: 80.0,
            revise_score: 60.0,
            max_approve_issues: 3,
            penalty_per_issue: 2.0,
            max_penalty: 30.0,
            degraded_score: 60.0,
            missing_score: 70.0,
        }
    }
}

/// Task decomposition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Stories per model call
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Issue batch calls concurrently
    pub parallel: bool,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            batch_size: 7,
            parallel: false,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Results are only returned, never written
    #[default]
    None,
    /// One JSON document per project
    Json,
    /// SQLite database with project/story/task tables
    Sqlite,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which sink to use
    pub backend: StorageBackend,

    /// Directory holding the JSON documents or `storyforge.db`
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/storyforge on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("storyforge"))
            .unwrap_or_else(|| PathBuf::from(".storyforge"));

        Self {
            backend: StorageBackend::None,
            path,
        }
    }
}

/// Prompt template overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory searched for `<name>.pmt` before the embedded templates
    pub dir: Option<PathBuf>,
}
