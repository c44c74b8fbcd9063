use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub token_secret: SecretString,
    pub token_ttl_secs: u64,
    /// Promote the first registered user to admin so a fresh install is
    /// operable without fixtures.
    pub bootstrap_admin: bool,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub base_url: String,
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<String>,
    pub callback_url: Option<String>,
    pub currency: String,
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
    pub token_secret: Option<String>,
    pub gateway_enabled: Option<bool>,
    pub gateway_secret_key: Option<String>,
    pub gateway_webhook_secret: Option<String>,
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
                url: "sqlite://segmint.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig {
                token_secret: String::new().into(),
                token_ttl_secs: 8 * 60 * 60,
                bootstrap_admin: true,
            },
            gateway: GatewayConfig {
                enabled: false,
                base_url: "https://api.paystack.co".to_string(),
                secret_key: None,
                webhook_secret: None,
                callback_url: None,
                currency: "GHS".to_string(),
            },
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    gateway: Option<GatewayPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    token_secret: Option<String>,
    token_ttl_secs: Option<u64>,
    bootstrap_admin: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    callback_url: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("segmint.toml"));
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(token_secret) = auth.token_secret {
                self.auth.token_secret = secret_value(token_secret);
            }
            if let Some(token_ttl_secs) = auth.token_ttl_secs {
                self.auth.token_ttl_secs = token_ttl_secs;
            }
            if let Some(bootstrap_admin) = auth.bootstrap_admin {
                self.auth.bootstrap_admin = bootstrap_admin;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(enabled) = gateway.enabled {
                self.gateway.enabled = enabled;
            }
            if let Some(base_url) = gateway.base_url {
                self.gateway.base_url = base_url;
            }
            if let Some(secret_key) = gateway.secret_key {
                self.gateway.secret_key = Some(secret_value(secret_key));
            }
            if let Some(webhook_secret) = gateway.webhook_secret {
                self.gateway.webhook_secret = Some(webhook_secret);
            }
            if let Some(callback_url) = gateway.callback_url {
                self.gateway.callback_url = Some(callback_url);
            }
            if let Some(currency) = gateway.currency {
                self.gateway.currency = currency;
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
        if let Some(value) = read_env("SEGMINT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SEGMINT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SEGMINT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SEGMINT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SEGMINT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SEGMINT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SEGMINT_SERVER_PORT") {
            self.server.port = parse_u16("SEGMINT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SEGMINT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SEGMINT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SEGMINT_AUTH_TOKEN_SECRET") {
            self.auth.token_secret = secret_value(value);
        }
        if let Some(value) = read_env("SEGMINT_AUTH_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = parse_u64("SEGMINT_AUTH_TOKEN_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("SEGMINT_AUTH_BOOTSTRAP_ADMIN") {
            self.auth.bootstrap_admin = parse_bool("SEGMINT_AUTH_BOOTSTRAP_ADMIN", &value)?;
        }

        if let Some(value) = read_env("SEGMINT_GATEWAY_ENABLED") {
            self.gateway.enabled = parse_bool("SEGMINT_GATEWAY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SEGMINT_GATEWAY_BASE_URL") {
            self.gateway.base_url = value;
        }
        if let Some(value) = read_env("SEGMINT_GATEWAY_SECRET_KEY") {
            self.gateway.secret_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SEGMINT_GATEWAY_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(value);
        }
        if let Some(value) = read_env("SEGMINT_GATEWAY_CALLBACK_URL") {
            self.gateway.callback_url = Some(value);
        }
        if let Some(value) = read_env("SEGMINT_GATEWAY_CURRENCY") {
            self.gateway.currency = value;
        }

        let log_level = read_env("SEGMINT_LOGGING_LEVEL").or_else(|| read_env("SEGMINT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SEGMINT_LOGGING_FORMAT").or_else(|| read_env("SEGMINT_LOG_FORMAT"));
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
        if let Some(token_secret) = overrides.token_secret {
            self.auth.token_secret = secret_value(token_secret);
        }
        if let Some(enabled) = overrides.gateway_enabled {
            self.gateway.enabled = enabled;
        }
        if let Some(secret_key) = overrides.gateway_secret_key {
            self.gateway.secret_key = Some(secret_value(secret_key));
        }
        if let Some(webhook_secret) = overrides.gateway_webhook_secret {
            self.gateway.webhook_secret = Some(webhook_secret);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_gateway(&self.gateway)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("segmint.toml"), PathBuf::from("config/segmint.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    if auth.token_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.token_secret is required; set it in segmint.toml or SEGMINT_AUTH_TOKEN_SECRET"
                .to_string(),
        ));
    }

    if auth.token_ttl_secs == 0 || auth.token_ttl_secs > 30 * 24 * 60 * 60 {
        return Err(ConfigError::Validation(
            "auth.token_ttl_secs must be in range 1..=2592000 (30 days)".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.enabled {
        let missing = gateway
            .secret_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "gateway.secret_key is required when the payment gateway is enabled".to_string(),
            ));
        }
    }

    if !gateway.base_url.starts_with("http://") && !gateway.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "gateway.base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(callback_url) = &gateway.callback_url {
        if !callback_url.starts_with("http://") && !callback_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "gateway.callback_url must start with http:// or https://".to_string(),
            ));
        }
    }

    match gateway.currency.as_str() {
        "GHS" | "USD" | "EUR" | "NGN" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "gateway.currency `{other}` is not supported (expected GHS|USD|EUR|NGN)"
        ))),
    }
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
