// Configuration loading and parsing (aiact.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Provider names accepted in `analysis.provider_order`.
pub const KNOWN_PROVIDERS: &[&str] = &["deepseek", "gemini", "google_search"];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub deepseek: ModelEndpoint,
    pub gemini: ModelEndpoint,
    pub google_search: SearchConfig,
    pub classification: ClassificationConfig,
    pub credentials: CredentialsConfig,
    pub db_path: PathBuf,
}

// ---------------------------------------------------------------------------
// aiact.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire aiact.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AiactFile {
    analysis: AnalysisConfig,
    deepseek: ModelEndpoint,
    gemini: ModelEndpoint,
    google_search: SearchConfig,
    classification: ClassificationConfig,
    #[serde(default)]
    database: DatabaseSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub provider_order: Vec<String>,
    pub enforce_rule_floor: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Connection settings for a chat-style model API.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub results: u32,
}

/// Score thresholds for the keyword classifier. A tier is assigned once its
/// best-matching category reaches the threshold.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    pub unacceptable_threshold: f64,
    pub high_threshold: f64,
    pub limited_threshold: f64,
    pub floor_min_confidence: f64,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub deepseek_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,
}

impl CredentialsConfig {
    /// Fill every missing (or blank) key from `lookup`, which is queried with
    /// the conventional environment variable name for that key.
    pub fn fill_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let slots: [(&mut Option<String>, &str); 4] = [
            (&mut self.deepseek_api_key, "DEEPSEEK_API_KEY"),
            (&mut self.gemini_api_key, "GEMINI_API_KEY"),
            (&mut self.google_api_key, "GOOGLE_API_KEY"),
            (&mut self.google_search_engine_id, "GOOGLE_SEARCH_ENGINE_ID"),
        ];
        for (slot, var) in slots {
            if !slot.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                *slot = lookup(var).filter(|v| !v.trim().is_empty());
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/aiact.toml` and (optionally)
/// `config/credentials.toml`, both relative to `base_dir`. Credentials not
/// present in the file are read from the environment.
///
/// This does not copy defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    load_config_with(base_dir, |var| std::env::var(var).ok())
}

/// Same as `load_config_from`, with an explicit credential lookup instead of
/// the process environment.
pub fn load_config_with(
    base_dir: &Path,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- aiact.toml (required) ---
    let main_path = config_dir.join("aiact.toml");
    let main_text = read_file(&main_path)?;
    let file: AiactFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials: CredentialsConfig = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };
    let credentials = credentials.fill_from(env_lookup);

    let db_path = resolve_db_path(base_dir, file.database.path.as_deref());

    let config = Config {
        analysis: file.analysis,
        deepseek: file.deepseek,
        gemini: file.gemini,
        google_search: file.google_search,
        classification: file.classification,
        credentials,
        db_path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to `base_dir` (or the current
/// working directory), copying default config files first.
pub fn load_config(base_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let base = match base_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
            path: PathBuf::from("."),
        })?,
    };
    let copied = ensure_config_files(&base)?;
    for path in &copied {
        tracing::info!("initialized {} from defaults", path.display());
    }
    load_config_from(&base)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Relative database paths are anchored at `base_dir`. With no path set the
/// platform data directory is used.
fn resolve_db_path(base_dir: &Path, configured: Option<&str>) -> PathBuf {
    match configured.map(str::trim).filter(|p| !p.is_empty()) {
        Some(":memory:") => PathBuf::from(":memory:"),
        Some(p) => {
            let path = PathBuf::from(p);
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        }
        None => directories::ProjectDirs::from("eu", "aiact", "aiact")
            .map(|dirs| dirs.data_dir().join("aiact.db"))
            .unwrap_or_else(|| base_dir.join("aiact.db")),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validation(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    // Provider order
    let order = &config.analysis.provider_order;
    if order.is_empty() {
        return Err(validation(
            "analysis.provider_order",
            "must list at least one provider",
        ));
    }
    for (i, name) in order.iter().enumerate() {
        if !KNOWN_PROVIDERS.contains(&name.as_str()) {
            return Err(validation(
                "analysis.provider_order",
                format!("unknown provider `{name}`, expected one of {KNOWN_PROVIDERS:?}"),
            ));
        }
        if order[..i].contains(name) {
            return Err(validation(
                "analysis.provider_order",
                format!("provider `{name}` listed more than once"),
            ));
        }
    }

    if config.analysis.max_tokens == 0 {
        return Err(validation("analysis.max_tokens", "must be > 0"));
    }
    let t = config.analysis.temperature;
    if t.is_nan() || !(0.0..=2.0).contains(&t) {
        return Err(validation(
            "analysis.temperature",
            format!("must be between 0.0 and 2.0 inclusive, got {t}"),
        ));
    }

    // Timeouts must be positive
    let timeouts: &[(&str, u64)] = &[
        ("deepseek.timeout_secs", config.deepseek.timeout_secs),
        ("gemini.timeout_secs", config.gemini.timeout_secs),
        ("google_search.timeout_secs", config.google_search.timeout_secs),
    ];
    for (name, val) in timeouts {
        if *val == 0 {
            return Err(validation(name, "must be > 0"));
        }
    }
    if config.google_search.results == 0 || config.google_search.results > 10 {
        return Err(validation(
            "google_search.results",
            format!("must be between 1 and 10, got {}", config.google_search.results),
        ));
    }

    // Classification thresholds
    let c = &config.classification;
    let thresholds: &[(&str, f64)] = &[
        ("classification.unacceptable_threshold", c.unacceptable_threshold),
        ("classification.high_threshold", c.high_threshold),
        ("classification.limited_threshold", c.limited_threshold),
    ];
    for (name, val) in thresholds {
        if !val.is_finite() || *val <= 0.0 {
            return Err(validation(name, format!("must be a finite number > 0, got {val}")));
        }
    }
    if c.limited_threshold > c.high_threshold {
        return Err(validation(
            "classification.limited_threshold",
            format!(
                "must not exceed high_threshold ({} > {})",
                c.limited_threshold, c.high_threshold
            ),
        ));
    }
    if c.high_threshold > c.unacceptable_threshold {
        return Err(validation(
            "classification.high_threshold",
            format!(
                "must not exceed unacceptable_threshold ({} > {})",
                c.high_threshold, c.unacceptable_threshold
            ),
        ));
    }
    if c.floor_min_confidence.is_nan() || !(0.0..=1.0).contains(&c.floor_min_confidence) {
        return Err(validation(
            "classification.floor_min_confidence",
            format!("must be between 0.0 and 1.0 inclusive, got {}", c.floor_min_confidence),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
