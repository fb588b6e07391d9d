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
    pub webhook: WebhookConfig,
    pub shopify: ShopifyConfig,
    pub cors: CorsConfig,
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
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub shared_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct ShopifyConfig {
    pub store: Option<String>,
    pub api_key: Option<String>,
    pub password: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub api_version: String,
    pub base_url: Option<String>,
    pub webhook_base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CorsConfig {
    pub allowed_domain: Option<String>,
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
    pub server_port: Option<u16>,
    pub webhook_shared_secret: Option<String>,
    pub shopify_store: Option<String>,
    pub shopify_api_key: Option<String>,
    pub shopify_password: Option<String>,
    pub shopify_access_token: Option<String>,
    pub shopify_base_url: Option<String>,
    pub cors_allowed_domain: Option<String>,
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
                url: "sqlite://fitsync.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 9292,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            webhook: WebhookConfig { shared_secret: String::new().into() },
            shopify: ShopifyConfig {
                store: None,
                api_key: None,
                password: None,
                access_token: None,
                api_version: "2024-01".to_string(),
                base_url: None,
                webhook_base_url: None,
                timeout_secs: 10,
                max_retries: 2,
            },
            cors: CorsConfig::default(),
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

impl ShopifyConfig {
    /// True when enough is configured to talk to the Admin API.
    pub fn is_configured(&self) -> bool {
        let has_target = self.store.is_some() || self.base_url.is_some();
        let has_basic = self.api_key.is_some() && self.password.is_some();
        has_target && (has_basic || self.access_token.is_some())
    }

    /// Admin API root, e.g. `https://my-store.myshopify.com/admin/api/2024-01`.
    pub fn admin_api_url(&self) -> Option<String> {
        let base = match (&self.base_url, &self.store) {
            (Some(base_url), _) => base_url.trim_end_matches('/').to_string(),
            (None, Some(store)) => format!("https://{store}.myshopify.com"),
            (None, None) => return None,
        };
        Some(format!("{base}/admin/api/{}", self.api_version))
    }
}

impl CorsConfig {
    pub fn allowed_origin(&self) -> Option<String> {
        self.allowed_domain.as_ref().map(|domain| format!("https://{domain}"))
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("fitsync.toml"));
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
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(shared_secret) = webhook.shared_secret {
                self.webhook.shared_secret = secret_value(shared_secret);
            }
        }

        if let Some(shopify) = patch.shopify {
            if let Some(store) = shopify.store {
                self.shopify.store = Some(store);
            }
            if let Some(api_key) = shopify.api_key {
                self.shopify.api_key = Some(api_key);
            }
            if let Some(password) = shopify.password {
                self.shopify.password = Some(secret_value(password));
            }
            if let Some(access_token) = shopify.access_token {
                self.shopify.access_token = Some(secret_value(access_token));
            }
            if let Some(api_version) = shopify.api_version {
                self.shopify.api_version = api_version;
            }
            if let Some(base_url) = shopify.base_url {
                self.shopify.base_url = Some(base_url);
            }
            if let Some(webhook_base_url) = shopify.webhook_base_url {
                self.shopify.webhook_base_url = Some(webhook_base_url);
            }
            if let Some(timeout_secs) = shopify.timeout_secs {
                self.shopify.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = shopify.max_retries {
                self.shopify.max_retries = max_retries;
            }
        }

        if let Some(cors) = patch.cors {
            if let Some(allowed_domain) = cors.allowed_domain {
                self.cors.allowed_domain = Some(allowed_domain);
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
        if let Some(value) = read_env("FITSYNC_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FITSYNC_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FITSYNC_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FITSYNC_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FITSYNC_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FITSYNC_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FITSYNC_SERVER_PORT") {
            self.server.port = parse_u16("FITSYNC_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FITSYNC_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("FITSYNC_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("FITSYNC_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FITSYNC_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let shared_secret =
            read_env("FITSYNC_WEBHOOK_SHARED_SECRET").or_else(|| read_env("SHARED_SECRET"));
        if let Some(value) = shared_secret {
            self.webhook.shared_secret = secret_value(value);
        }

        let store = read_env("FITSYNC_SHOPIFY_STORE").or_else(|| read_env("SHOPIFY_STORE"));
        if let Some(value) = store {
            self.shopify.store = Some(value);
        }
        let api_key = read_env("FITSYNC_SHOPIFY_API_KEY").or_else(|| read_env("SHOPIFY_API"));
        if let Some(value) = api_key {
            self.shopify.api_key = Some(value);
        }
        let password =
            read_env("FITSYNC_SHOPIFY_PASSWORD").or_else(|| read_env("SHOPIFY_SECRET"));
        if let Some(value) = password {
            self.shopify.password = Some(secret_value(value));
        }
        if let Some(value) = read_env("FITSYNC_SHOPIFY_ACCESS_TOKEN") {
            self.shopify.access_token = Some(secret_value(value));
        }
        let api_version =
            read_env("FITSYNC_SHOPIFY_API_VERSION").or_else(|| read_env("SHOPIFY_API_VERSION"));
        if let Some(value) = api_version {
            self.shopify.api_version = value;
        }
        if let Some(value) = read_env("FITSYNC_SHOPIFY_BASE_URL") {
            self.shopify.base_url = Some(value);
        }
        if let Some(value) = read_env("FITSYNC_SHOPIFY_WEBHOOK_BASE_URL") {
            self.shopify.webhook_base_url = Some(value);
        }
        if let Some(value) = read_env("FITSYNC_SHOPIFY_TIMEOUT_SECS") {
            self.shopify.timeout_secs = parse_u64("FITSYNC_SHOPIFY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FITSYNC_SHOPIFY_MAX_RETRIES") {
            self.shopify.max_retries = parse_u32("FITSYNC_SHOPIFY_MAX_RETRIES", &value)?;
        }

        let domain = read_env("FITSYNC_CORS_ALLOWED_DOMAIN").or_else(|| read_env("DOMAIN"));
        if let Some(value) = domain {
            self.cors.allowed_domain = Some(value);
        }

        let log_level =
            read_env("FITSYNC_LOGGING_LEVEL").or_else(|| read_env("FITSYNC_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FITSYNC_LOGGING_FORMAT").or_else(|| read_env("FITSYNC_LOG_FORMAT"));
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
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(shared_secret) = overrides.webhook_shared_secret {
            self.webhook.shared_secret = secret_value(shared_secret);
        }
        if let Some(store) = overrides.shopify_store {
            self.shopify.store = Some(store);
        }
        if let Some(api_key) = overrides.shopify_api_key {
            self.shopify.api_key = Some(api_key);
        }
        if let Some(password) = overrides.shopify_password {
            self.shopify.password = Some(secret_value(password));
        }
        if let Some(access_token) = overrides.shopify_access_token {
            self.shopify.access_token = Some(secret_value(access_token));
        }
        if let Some(base_url) = overrides.shopify_base_url {
            self.shopify.base_url = Some(base_url);
        }
        if let Some(allowed_domain) = overrides.cors_allowed_domain {
            self.cors.allowed_domain = Some(allowed_domain);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_webhook(&self.webhook)?;
        validate_shopify(&self.shopify)?;
        validate_cors(&self.cors)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("fitsync.toml"), PathBuf::from("config/fitsync.toml")]
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

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.health_check_port == server.port {
        return Err(ConfigError::Validation(
            "server.health_check_port must differ from server.port".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> Result<(), ConfigError> {
    if webhook.shared_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "webhook.shared_secret is required. Use the app's API secret key from the \
             Shopify partner dashboard"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_shopify(shopify: &ShopifyConfig) -> Result<(), ConfigError> {
    let any_set = shopify.store.is_some()
        || shopify.base_url.is_some()
        || shopify.api_key.is_some()
        || shopify.password.is_some()
        || shopify.access_token.is_some();
    if any_set && !shopify.is_configured() {
        return Err(ConfigError::Validation(
            "shopify requires `store` (or `base_url`) plus either `api_key` and `password` \
             or `access_token`"
                .to_string(),
        ));
    }

    if let Some(store) = &shopify.store {
        let valid = !store.is_empty()
            && store.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if !valid {
            return Err(ConfigError::Validation(
                "shopify.store must be the bare shop handle (e.g. `my-store`, not a URL)"
                    .to_string(),
            ));
        }
    }

    for (key, url) in [
        ("shopify.base_url", &shopify.base_url),
        ("shopify.webhook_base_url", &shopify.webhook_base_url),
    ] {
        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if shopify.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("shopify.api_version must not be empty".to_string()));
    }

    if shopify.timeout_secs == 0 || shopify.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "shopify.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_cors(cors: &CorsConfig) -> Result<(), ConfigError> {
    if let Some(domain) = &cors.allowed_domain {
        if domain.trim().is_empty() || domain.contains("://") || domain.contains('/') {
            return Err(ConfigError::Validation(
                "cors.allowed_domain must be a bare host name (e.g. `shop.example.com`)"
                    .to_string(),
            ));
        }
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    webhook: Option<WebhookPatch>,
    shopify: Option<ShopifyPatch>,
    cors: Option<CorsPatch>,
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
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    shared_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ShopifyPatch {
    store: Option<String>,
    api_key: Option<String>,
    password: Option<String>,
    access_token: Option<String>,
    api_version: Option<String>,
    base_url: Option<String>,
    webhook_base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CorsPatch {
    allowed_domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
