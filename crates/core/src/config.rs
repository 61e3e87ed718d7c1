use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub lookup: LookupConfig,
    pub retriever: RetrieverConfig,
    pub audit: AuditConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// External information-lookup collaborator (perishability evidence). When
/// disabled the refund handler simply treats nothing as perishable.
#[derive(Clone, Debug)]
pub struct LookupConfig {
    pub enabled: bool,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetrieverConfig {
    pub policy_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub log_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
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
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub policy_dir: Option<PathBuf>,
    pub audit_log_path: Option<PathBuf>,
    pub lookup_enabled: Option<bool>,
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
                url: "sqlite://redress.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "http://localhost:11434/v1".to_string(),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            lookup: LookupConfig {
                enabled: false,
                api_key: None,
                base_url: "https://api.tavily.com".to_string(),
                timeout_secs: 10,
            },
            retriever: RetrieverConfig {
                policy_dir: PathBuf::from("policies"),
                chunk_size: 500,
                chunk_overlap: 50,
                top_k: 2,
            },
            audit: AuditConfig { log_path: PathBuf::from("action_log.jsonl") },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("redress.toml"));
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

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(lookup) = patch.lookup {
            if let Some(enabled) = lookup.enabled {
                self.lookup.enabled = enabled;
            }
            if let Some(lookup_api_key_value) = lookup.api_key {
                self.lookup.api_key = Some(secret_value(lookup_api_key_value));
            }
            if let Some(base_url) = lookup.base_url {
                self.lookup.base_url = base_url;
            }
            if let Some(timeout_secs) = lookup.timeout_secs {
                self.lookup.timeout_secs = timeout_secs;
            }
        }

        if let Some(retriever) = patch.retriever {
            if let Some(policy_dir) = retriever.policy_dir {
                self.retriever.policy_dir = policy_dir;
            }
            if let Some(chunk_size) = retriever.chunk_size {
                self.retriever.chunk_size = chunk_size;
            }
            if let Some(chunk_overlap) = retriever.chunk_overlap {
                self.retriever.chunk_overlap = chunk_overlap;
            }
            if let Some(top_k) = retriever.top_k {
                self.retriever.top_k = top_k;
            }
        }

        if let Some(audit) = patch.audit {
            if let Some(log_path) = audit.log_path {
                self.audit.log_path = log_path;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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
        if let Some(value) = read_env("REDRESS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REDRESS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("REDRESS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REDRESS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REDRESS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REDRESS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("REDRESS_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("REDRESS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("REDRESS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("REDRESS_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REDRESS_LOOKUP_ENABLED") {
            self.lookup.enabled = parse_bool("REDRESS_LOOKUP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("REDRESS_LOOKUP_API_KEY") {
            self.lookup.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("REDRESS_LOOKUP_BASE_URL") {
            self.lookup.base_url = value;
        }

        if let Some(value) = read_env("REDRESS_POLICY_DIR") {
            self.retriever.policy_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("REDRESS_AUDIT_LOG_PATH") {
            self.audit.log_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("REDRESS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REDRESS_SERVER_PORT") {
            self.server.port = parse_u16("REDRESS_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("REDRESS_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("REDRESS_LOG_FORMAT") {
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
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(policy_dir) = overrides.policy_dir {
            self.retriever.policy_dir = policy_dir;
        }
        if let Some(audit_log_path) = overrides.audit_log_path {
            self.audit.log_path = audit_log_path;
        }
        if let Some(lookup_enabled) = overrides.lookup_enabled {
            self.lookup.enabled = lookup_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation("llm.timeout_secs must be at least 1".to_string()));
        }

        if self.lookup.enabled && self.lookup.api_key.is_none() {
            return Err(ConfigError::Validation(
                "lookup.api_key is required when lookup.enabled is true".to_string(),
            ));
        }

        if self.retriever.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "retriever.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.retriever.chunk_overlap >= self.retriever.chunk_size {
            return Err(ConfigError::Validation(
                "retriever.chunk_overlap must be smaller than retriever.chunk_size".to_string(),
            ));
        }
        if self.retriever.top_k == 0 {
            return Err(ConfigError::Validation("retriever.top_k must be at least 1".to_string()));
        }

        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("logging.level must not be empty".to_string()));
        }

        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("redress.toml"), PathBuf::from("config/redress.toml")]
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    lookup: Option<LookupPatch>,
    retriever: Option<RetrieverPatch>,
    audit: Option<AuditPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupPatch {
    enabled: Option<bool>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrieverPatch {
    policy_dir: Option<PathBuf>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AuditPatch {
    log_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().expect("default config is valid");
    }

    #[test]
    fn loads_patch_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("redress.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\n\n[retriever]\nchunk_size = 200\nchunk_overlap = 20\ntop_k = 3\n\n[logging]\nformat = \"json\""
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.retriever.chunk_size, 200);
        assert_eq!(config.retriever.top_k, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_model: Some("gpt-4o-mini".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn rejects_overlap_larger_than_chunk() {
        let mut config = AppConfig::default();
        config.retriever.chunk_size = 50;
        config.retriever.chunk_overlap = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_enabled_lookup_without_key() {
        let mut config = AppConfig::default();
        config.lookup.enabled = true;
        config.lookup.api_key = None;
        assert!(config.validate().is_err());
    }
}
