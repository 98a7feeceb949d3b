use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Effective configuration, resolved from defaults, an optional TOML
/// file (`fenestra.toml` or `config/fenestra.toml`), `FENESTRA_*`
/// environment overrides, and programmatic overrides, in that order.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
    pub summary: SummaryConfig,
    pub segmentation: SegmentationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    /// Explicit artifact location; checked first during acquisition and
    /// used as the training output path when set.
    pub artifact_path: Option<PathBuf>,
    /// Default local artifact location.
    pub local_artifact_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SummaryConfig {
    /// Model identifier passed to the hosted summarization endpoint.
    pub model: String,
    pub endpoint: String,
    /// Optional credential; tried only after anonymous access fails.
    pub token: Option<SecretString>,
    /// Upper bounds; per-input dynamic lengths stay within them.
    pub max_length: usize,
    pub min_length: usize,
    pub num_beams: usize,
    pub no_repeat_ngram: usize,
    pub sampling: bool,
    pub top_p: f64,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub max_input_chars: usize,
    /// Whether the model family expects a "summarize: " task prefix.
    /// Resolved once at load time: explicit setting wins, otherwise
    /// derived from the model identifier.
    pub task_prefix: bool,
}

#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    pub clusters: usize,
    pub seed: u64,
    pub max_iterations: u64,
    pub tolerance: f64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub artifact_path: Option<PathBuf>,
    pub summary_model: Option<String>,
    pub clusters: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://fenestra.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            artifact_path: None,
            local_artifact_path: PathBuf::from("instance/price_model.json"),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: "t5-small".to_string(),
            endpoint: "https://api-inference.huggingface.co".to_string(),
            token: None,
            max_length: 140,
            min_length: 60,
            num_beams: 4,
            no_repeat_ngram: 3,
            sampling: false,
            top_p: 0.9,
            temperature: 0.8,
            timeout_secs: 30,
            max_input_chars: 2000,
            task_prefix: true,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { clusters: 3, seed: 42, max_iterations: 300, tolerance: 1e-4 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            pricing: PricingConfig::default(),
            summary: SummaryConfig::default(),
            segmentation: SegmentationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Model families named like T5 expect the "summarize: " task prefix.
fn derive_task_prefix(model: &str) -> bool {
    model.to_ascii_lowercase().contains("t5")
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut task_prefix_override = None;

        let maybe_path = resolve_config_path(options.config_path.as_deref());
        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch, &mut task_prefix_override);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("fenestra.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides(&mut task_prefix_override)?;
        config.apply_overrides(options.overrides);

        config.summary.task_prefix =
            task_prefix_override.unwrap_or_else(|| derive_task_prefix(&config.summary.model));

        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch, task_prefix_override: &mut Option<bool>) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(artifact_path) = pricing.artifact_path {
                self.pricing.artifact_path = Some(PathBuf::from(artifact_path));
            }
            if let Some(local_artifact_path) = pricing.local_artifact_path {
                self.pricing.local_artifact_path = PathBuf::from(local_artifact_path);
            }
        }

        if let Some(summary) = patch.summary {
            if let Some(model) = summary.model {
                self.summary.model = model;
            }
            if let Some(endpoint) = summary.endpoint {
                self.summary.endpoint = endpoint;
            }
            if let Some(summary_token_value) = summary.token {
                self.summary.token = Some(summary_token_value.into());
            }
            if let Some(max_length) = summary.max_length {
                self.summary.max_length = max_length;
            }
            if let Some(min_length) = summary.min_length {
                self.summary.min_length = min_length;
            }
            if let Some(num_beams) = summary.num_beams {
                self.summary.num_beams = num_beams;
            }
            if let Some(no_repeat_ngram) = summary.no_repeat_ngram {
                self.summary.no_repeat_ngram = no_repeat_ngram;
            }
            if let Some(sampling) = summary.sampling {
                self.summary.sampling = sampling;
            }
            if let Some(top_p) = summary.top_p {
                self.summary.top_p = top_p;
            }
            if let Some(temperature) = summary.temperature {
                self.summary.temperature = temperature;
            }
            if let Some(timeout_secs) = summary.timeout_secs {
                self.summary.timeout_secs = timeout_secs;
            }
            if let Some(max_input_chars) = summary.max_input_chars {
                self.summary.max_input_chars = max_input_chars;
            }
            if let Some(task_prefix) = summary.task_prefix {
                *task_prefix_override = Some(task_prefix);
            }
        }

        if let Some(segmentation) = patch.segmentation {
            if let Some(clusters) = segmentation.clusters {
                self.segmentation.clusters = clusters;
            }
            if let Some(seed) = segmentation.seed {
                self.segmentation.seed = seed;
            }
            if let Some(max_iterations) = segmentation.max_iterations {
                self.segmentation.max_iterations = max_iterations;
            }
            if let Some(tolerance) = segmentation.tolerance {
                self.segmentation.tolerance = tolerance;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(
        &mut self,
        task_prefix_override: &mut Option<bool>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FENESTRA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FENESTRA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FENESTRA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FENESTRA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FENESTRA_PRICE_MODEL_PATH") {
            self.pricing.artifact_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("FENESTRA_SUMMARY_MODEL") {
            self.summary.model = value;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_ENDPOINT") {
            self.summary.endpoint = value;
        }
        let summary_token =
            read_env("FENESTRA_SUMMARY_TOKEN").or_else(|| read_env("HF_TOKEN"));
        if let Some(value) = summary_token {
            self.summary.token = Some(value.into());
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_MAX_LEN") {
            self.summary.max_length = parse_usize("FENESTRA_SUMMARY_MAX_LEN", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_MIN_LEN") {
            self.summary.min_length = parse_usize("FENESTRA_SUMMARY_MIN_LEN", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_NUM_BEAMS") {
            self.summary.num_beams = parse_usize("FENESTRA_SUMMARY_NUM_BEAMS", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_NO_REPEAT_NGRAM") {
            self.summary.no_repeat_ngram =
                parse_usize("FENESTRA_SUMMARY_NO_REPEAT_NGRAM", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_SAMPLING") {
            self.summary.sampling = parse_flag("FENESTRA_SUMMARY_SAMPLING", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_TOP_P") {
            self.summary.top_p = parse_f64("FENESTRA_SUMMARY_TOP_P", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_TEMPERATURE") {
            self.summary.temperature = parse_f64("FENESTRA_SUMMARY_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_TIMEOUT_SECS") {
            self.summary.timeout_secs = parse_u64("FENESTRA_SUMMARY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_MAX_INPUT_CHARS") {
            self.summary.max_input_chars =
                parse_usize("FENESTRA_SUMMARY_MAX_INPUT_CHARS", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SUMMARY_TASK_PREFIX") {
            *task_prefix_override = Some(parse_flag("FENESTRA_SUMMARY_TASK_PREFIX", &value)?);
        }

        if let Some(value) = read_env("FENESTRA_SEGMENTATION_CLUSTERS") {
            self.segmentation.clusters = parse_usize("FENESTRA_SEGMENTATION_CLUSTERS", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SEGMENTATION_SEED") {
            self.segmentation.seed = parse_u64("FENESTRA_SEGMENTATION_SEED", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SEGMENTATION_MAX_ITERATIONS") {
            self.segmentation.max_iterations =
                parse_u64("FENESTRA_SEGMENTATION_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("FENESTRA_SEGMENTATION_TOLERANCE") {
            self.segmentation.tolerance = parse_f64("FENESTRA_SEGMENTATION_TOLERANCE", &value)?;
        }

        let log_level =
            read_env("FENESTRA_LOGGING_LEVEL").or_else(|| read_env("FENESTRA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FENESTRA_LOGGING_FORMAT").or_else(|| read_env("FENESTRA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(artifact_path) = overrides.artifact_path {
            self.pricing.artifact_path = Some(artifact_path);
        }
        if let Some(summary_model) = overrides.summary_model {
            self.summary.model = summary_model;
        }
        if let Some(clusters) = overrides.clusters {
            self.segmentation.clusters = clusters;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_pricing(&self.pricing)?;
        validate_summary(&self.summary)?;
        validate_segmentation(&self.segmentation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("fenestra.toml"), PathBuf::from("config/fenestra.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if let Some(path) = &pricing.artifact_path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "pricing.artifact_path must not be empty when set".to_string(),
            ));
        }
    }
    if pricing.local_artifact_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "pricing.local_artifact_path must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_summary(summary: &SummaryConfig) -> Result<(), ConfigError> {
    if summary.model.trim().is_empty() {
        return Err(ConfigError::Validation("summary.model must not be empty".to_string()));
    }
    if !summary.endpoint.starts_with("http://") && !summary.endpoint.starts_with("https://") {
        return Err(ConfigError::Validation(
            "summary.endpoint must start with http:// or https://".to_string(),
        ));
    }
    if summary.max_length == 0 || summary.min_length == 0 {
        return Err(ConfigError::Validation(
            "summary.max_length and summary.min_length must be greater than zero".to_string(),
        ));
    }
    if summary.num_beams == 0 {
        return Err(ConfigError::Validation(
            "summary.num_beams must be at least 1".to_string(),
        ));
    }
    if summary.no_repeat_ngram == 0 {
        return Err(ConfigError::Validation(
            "summary.no_repeat_ngram must be at least 1".to_string(),
        ));
    }
    if !(summary.top_p > 0.0 && summary.top_p <= 1.0) {
        return Err(ConfigError::Validation(
            "summary.top_p must be in range (0, 1]".to_string(),
        ));
    }
    if !(summary.temperature > 0.0 && summary.temperature.is_finite()) {
        return Err(ConfigError::Validation(
            "summary.temperature must be a positive number".to_string(),
        ));
    }
    if summary.timeout_secs == 0 || summary.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "summary.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if summary.max_input_chars < 256 {
        return Err(ConfigError::Validation(
            "summary.max_input_chars must be at least 256".to_string(),
        ));
    }
    Ok(())
}

fn validate_segmentation(segmentation: &SegmentationConfig) -> Result<(), ConfigError> {
    if segmentation.clusters == 0 {
        return Err(ConfigError::Validation(
            "segmentation.clusters must be at least 1".to_string(),
        ));
    }
    if segmentation.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "segmentation.max_iterations must be greater than zero".to_string(),
        ));
    }
    if !(segmentation.tolerance > 0.0 && segmentation.tolerance.is_finite()) {
        return Err(ConfigError::Validation(
            "segmentation.tolerance must be a positive number".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Accepts the original tooling's flag spellings: 1/0, true/false, yes/no.
fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    pricing: Option<PricingPatch>,
    summary: Option<SummaryPatch>,
    segmentation: Option<SegmentationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    artifact_path: Option<String>,
    local_artifact_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryPatch {
    model: Option<String>,
    endpoint: Option<String>,
    token: Option<String>,
    max_length: Option<usize>,
    min_length: Option<usize>,
    num_beams: Option<usize>,
    no_repeat_ngram: Option<usize>,
    sampling: Option<bool>,
    top_p: Option<f64>,
    temperature: Option<f64>,
    timeout_secs: Option<u64>,
    max_input_chars: Option<usize>,
    task_prefix: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentationPatch {
    clusters: Option<usize>,
    seed: Option<u64>,
    max_iterations: Option<u64>,
    tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_and_resolve_the_task_prefix() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.summary.model == "t5-small", "default model should be t5-small")?;
        ensure(config.summary.task_prefix, "t5 family should get the task prefix")?;
        ensure(config.segmentation.clusters == 3, "default cluster count should be 3")?;
        ensure(!config.summary.sampling, "sampling should default to off")?;
        Ok(())
    }

    #[test]
    fn env_overrides_reach_every_section() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FENESTRA_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("FENESTRA_SUMMARY_MODEL", "facebook/bart-large-cnn");
        env::set_var("FENESTRA_SUMMARY_SAMPLING", "yes");
        env::set_var("FENESTRA_SEGMENTATION_CLUSTERS", "4");
        env::set_var("FENESTRA_PRICE_MODEL_PATH", "/tmp/artifact.json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.database.url == "sqlite://from-env.db", "database url from env")?;
            ensure(config.summary.model == "facebook/bart-large-cnn", "model from env")?;
            ensure(config.summary.sampling, "sampling flag should accept `yes`")?;
            ensure(
                !config.summary.task_prefix,
                "bart family should not get the task prefix",
            )?;
            ensure(config.segmentation.clusters == 4, "cluster count from env")?;
            ensure(
                config.pricing.artifact_path.as_deref()
                    == Some(std::path::Path::new("/tmp/artifact.json")),
                "artifact path from env",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "FENESTRA_DATABASE_URL",
            "FENESTRA_SUMMARY_MODEL",
            "FENESTRA_SUMMARY_SAMPLING",
            "FENESTRA_SEGMENTATION_CLUSTERS",
            "FENESTRA_PRICE_MODEL_PATH",
        ]);
        result
    }

    #[test]
    fn explicit_task_prefix_beats_the_model_family_heuristic() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FENESTRA_SUMMARY_MODEL", "facebook/bart-large-cnn");
        env::set_var("FENESTRA_SUMMARY_TASK_PREFIX", "true");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.summary.task_prefix, "explicit task prefix should win")
        })();

        clear_vars(&["FENESTRA_SUMMARY_MODEL", "FENESTRA_SUMMARY_TASK_PREFIX"]);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_FENESTRA_SUMMARY_TOKEN", "hf-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("fenestra.toml");
            fs::write(
                &path,
                r#"
[summary]
token = "${TEST_FENESTRA_SUMMARY_TOKEN}"
model = "sshleifer/distilbart-cnn-12-6"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.summary.token.as_ref().ok_or("token should be set")?;
            ensure(
                token.expose_secret() == "hf-from-env",
                "token should be interpolated from the environment",
            )?;
            ensure(config.logging.level == "warn", "log level should come from the file")?;
            ensure(!config.summary.task_prefix, "distilbart should not get the prefix")?;
            Ok(())
        })();

        clear_vars(&["TEST_FENESTRA_SUMMARY_TOKEN"]);
        result
    }

    #[test]
    fn precedence_is_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FENESTRA_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("fenestra.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[segmentation]
clusters = 5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "programmatic override should win over file and env",
            )?;
            ensure(config.segmentation.clusters == 5, "file should win over defaults")?;
            Ok(())
        })();

        clear_vars(&["FENESTRA_DATABASE_URL"]);
        result
    }

    #[test]
    fn out_of_range_decoding_knobs_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FENESTRA_SUMMARY_TOP_P", "1.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            let mentions_top_p = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("top_p")
            );
            ensure(mentions_top_p, "validation failure should mention summary.top_p")
        })();

        clear_vars(&["FENESTRA_SUMMARY_TOP_P"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FENESTRA_LOG_LEVEL", "debug");
        env::set_var("FENESTRA_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.logging.level == "debug", "log level from alias env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "log format from alias env var",
            )?;
            Ok(())
        })();

        clear_vars(&["FENESTRA_LOG_LEVEL", "FENESTRA_LOG_FORMAT"]);
        result
    }

    #[test]
    fn credential_is_not_leaked_by_debug_output() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HF_TOKEN", "hf-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            ensure(
                !debug.contains("hf-secret-value"),
                "debug output should not contain the summary credential",
            )?;
            ensure(config.summary.token.is_some(), "HF_TOKEN alias should be honored")?;
            Ok(())
        })();

        clear_vars(&["HF_TOKEN"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("required file is absent");
        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
