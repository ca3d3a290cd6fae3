use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::models::{Address, TaxBasedOn, TaxOriginAddressType};
use crate::retry::RetryPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_COMPANY_CODE: &str = "DEFAULT";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_RATE_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_APPLICATION_NAME: &str = "stateset-avatax";

pub const SANDBOX_BASE_URL: &str = "https://sandbox-rest.avatax.com";
pub const PRODUCTION_BASE_URL: &str = "https://rest.avatax.com";

/// Avalara account and behaviour settings.
///
/// Built once at startup and handed by reference to the mapper, the client
/// and the provider.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AvalaraConfig {
    /// Avalara account identifier
    #[serde(default)]
    pub account_id: String,

    /// License key paired with the account
    #[serde(default)]
    pub license_key: String,

    /// Company code transactions are recorded under
    #[serde(default = "default_company_code")]
    #[validate(length(min = 1, max = 25))]
    pub company_code: String,

    /// Use the sandbox environment instead of production
    #[serde(default = "default_true_bool")]
    pub use_sandbox: bool,

    /// Commit transactions when orders are placed
    #[serde(default)]
    pub commit_transactions: bool,

    /// Validate US and Canadian destination addresses before tax calls
    #[serde(default)]
    pub validate_addresses: bool,

    #[serde(default)]
    pub tax_origin_address_type: TaxOriginAddressType,

    /// Warehouse or shipping origin address
    #[serde(default)]
    pub shipping_origin_address: Option<Address>,

    /// Store default tax address, also the fallback destination
    #[serde(default)]
    pub default_tax_address: Option<Address>,

    #[serde(default)]
    pub tax_based_on: TaxBasedOn,

    /// Tax orders picked up at a pickup point by the pickup address
    #[serde(default = "default_true_bool")]
    pub tax_based_on_pickup_point_address: bool,

    /// Tax electronic services to EU consumers at the billing address
    #[serde(default)]
    pub eu_vat_rules_enabled: bool,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Lifetime of cached tax rates
    #[serde(default = "default_rate_cache_ttl_secs")]
    #[validate(range(min = 1, max = 86400))]
    pub rate_cache_ttl_secs: u64,

    /// Timeout of a single provider call
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Attempts for idempotent provider calls
    #[serde(default = "default_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub retry_attempts: u32,

    /// Base URL override, mostly for tests
    #[serde(default)]
    #[validate(custom = "validate_base_url")]
    pub base_url: Option<String>,

    /// Reported to the provider in the client identification header
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Transaction log database
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

impl Default for AvalaraConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            license_key: String::new(),
            company_code: default_company_code(),
            use_sandbox: true,
            commit_transactions: false,
            validate_addresses: false,
            tax_origin_address_type: TaxOriginAddressType::default(),
            shipping_origin_address: None,
            default_tax_address: None,
            tax_based_on: TaxBasedOn::default(),
            tax_based_on_pickup_point_address: true,
            eu_vat_rules_enabled: false,
            default_currency: default_currency(),
            rate_cache_ttl_secs: DEFAULT_RATE_CACHE_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_url: None,
            application_name: default_application_name(),
            database_url: default_database_url(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl AvalaraConfig {
    /// Config with credentials set and everything else defaulted.
    pub fn with_credentials(account_id: impl Into<String>, license_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            license_key: license_key.into(),
            ..Self::default()
        }
    }

    /// Both credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.account_id.trim().is_empty() && !self.license_key.trim().is_empty()
    }

    pub fn base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url.as_str(),
            None if self.use_sandbox => SANDBOX_BASE_URL,
            None => PRODUCTION_BASE_URL,
        }
    }

    pub fn rate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.retry_attempts)
    }

    /// Ship-from address selected by `tax_origin_address_type`.
    pub fn origin_address(&self) -> Option<&Address> {
        match self.tax_origin_address_type {
            TaxOriginAddressType::ShippingOrigin => self
                .shipping_origin_address
                .as_ref()
                .or(self.default_tax_address.as_ref()),
            TaxOriginAddressType::DefaultTaxAddress => self.default_tax_address.as_ref(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn validate_base_url(url: &str) -> Result<(), ValidationError> {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => Err(ValidationError::new("invalid_base_url")),
    }
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_company_code() -> String {
    DEFAULT_COMPANY_CODE.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_rate_cache_ttl_secs() -> u64 {
    DEFAULT_RATE_CACHE_TTL_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_application_name() -> String {
    DEFAULT_APPLICATION_NAME.to_string()
}

fn default_database_url() -> String {
    "sqlite://avatax.db?mode=rwc".to_string()
}

fn default_true_bool() -> bool {
    true
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_avatax={},avatax_cli={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads the Avalara configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables prefixed with `AVATAX__`
pub fn load_config() -> Result<AvalaraConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &str) -> Result<AvalaraConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(config_dir).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir
        );
    }

    let config = Config::builder()
        .set_default("company_code", DEFAULT_COMPANY_CODE)?
        .set_default("use_sandbox", true)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(Environment::with_prefix("AVATAX").separator("__"))
        .build()?;

    let avalara_config: AvalaraConfig = config.try_deserialize()?;

    avalara_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if !avalara_config.is_configured() {
        info!("Avalara credentials are not set; tax calls will report a configuration error");
    }

    info!("Configuration loaded successfully");
    Ok(avalara_config)
}
