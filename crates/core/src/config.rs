use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub escalation: EscalationConfig,
    pub resolution: ResolutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EscalationConfig {
    pub sla_hours: i64,
}

#[derive(Clone, Debug)]
pub struct ResolutionConfig {
    pub min_notes_len: usize,
    pub require_escalated: bool,
    pub block_duplicate_refunds: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
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
    pub sla_hours: Option<i64>,
    pub require_escalated: Option<bool>,
    pub block_duplicate_refunds: Option<bool>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://cookhouse.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            escalation: EscalationConfig { sla_hours: 24 },
            resolution: ResolutionConfig {
                min_notes_len: 10,
                require_escalated: true,
                block_duplicate_refunds: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cookhouse.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(escalation) = patch.escalation {
            if let Some(sla_hours) = escalation.sla_hours {
                self.escalation.sla_hours = sla_hours;
            }
        }

        if let Some(resolution) = patch.resolution {
            if let Some(min_notes_len) = resolution.min_notes_len {
                self.resolution.min_notes_len = min_notes_len;
            }
            if let Some(require_escalated) = resolution.require_escalated {
                self.resolution.require_escalated = require_escalated;
            }
            if let Some(block_duplicate_refunds) = resolution.block_duplicate_refunds {
                self.resolution.block_duplicate_refunds = block_duplicate_refunds;
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

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COOKHOUSE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COOKHOUSE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("COOKHOUSE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COOKHOUSE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("COOKHOUSE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COOKHOUSE_ESCALATION_SLA_HOURS") {
            self.escalation.sla_hours = parse_value("COOKHOUSE_ESCALATION_SLA_HOURS", &value)?;
        }

        if let Some(value) = read_env("COOKHOUSE_RESOLUTION_MIN_NOTES_LEN") {
            self.resolution.min_notes_len =
                parse_value("COOKHOUSE_RESOLUTION_MIN_NOTES_LEN", &value)?;
        }
        if let Some(value) = read_env("COOKHOUSE_RESOLUTION_REQUIRE_ESCALATED") {
            self.resolution.require_escalated =
                parse_value("COOKHOUSE_RESOLUTION_REQUIRE_ESCALATED", &value)?;
        }
        if let Some(value) = read_env("COOKHOUSE_RESOLUTION_BLOCK_DUPLICATE_REFUNDS") {
            self.resolution.block_duplicate_refunds =
                parse_value("COOKHOUSE_RESOLUTION_BLOCK_DUPLICATE_REFUNDS", &value)?;
        }

        let log_level =
            read_env("COOKHOUSE_LOGGING_LEVEL").or_else(|| read_env("COOKHOUSE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COOKHOUSE_LOGGING_FORMAT").or_else(|| read_env("COOKHOUSE_LOG_FORMAT"));
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
        if let Some(sla_hours) = overrides.sla_hours {
            self.escalation.sla_hours = sla_hours;
        }
        if let Some(require_escalated) = overrides.require_escalated {
            self.resolution.require_escalated = require_escalated;
        }
        if let Some(block_duplicate_refunds) = overrides.block_duplicate_refunds {
            self.resolution.block_duplicate_refunds = block_duplicate_refunds;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_escalation(&self.escalation)?;
        validate_resolution(&self.resolution)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cookhouse.toml"), PathBuf::from("config/cookhouse.toml")]
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

fn validate_escalation(escalation: &EscalationConfig) -> Result<(), ConfigError> {
    if !(1..=720).contains(&escalation.sla_hours) {
        return Err(ConfigError::Validation(
            "escalation.sla_hours must be in range 1..=720".to_string(),
        ));
    }
    Ok(())
}

fn validate_resolution(resolution: &ResolutionConfig) -> Result<(), ConfigError> {
    if resolution.min_notes_len == 0 {
        return Err(ConfigError::Validation(
            "resolution.min_notes_len must be greater than zero".to_string(),
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

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    escalation: Option<EscalationPatch>,
    resolution: Option<ResolutionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EscalationPatch {
    sla_hours: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolutionPatch {
    min_notes_len: Option<usize>,
    require_escalated: Option<bool>,
    block_duplicate_refunds: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
