use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "PLN";
const DEFAULT_INVOICE_SERIES_PREFIX: &str = "FV";
const DEFAULT_INVOICE_DOCUMENT_DIR: &str = "invoices";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://sandbox.przelewy24.pl";
const DEV_DEFAULT_GATEWAY_CRC_KEY: &str = "dev_crc_key_not_for_production_use_0001";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default = "default_false_bool")]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u32,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u32,

    /// Settlement currency (ISO 4217)
    #[serde(default = "default_currency")]
    pub currency: String,

    /// VAT rate applied when deriving net amounts from gross totals
    /// (as decimal, e.g., 0.23 for 23%)
    #[serde(default = "default_vat_rate")]
    #[validate(custom = "validate_vat_rate")]
    pub vat_rate: f64,

    /// Invoice number series prefix (`FV` for faktura VAT)
    #[serde(default = "default_invoice_series_prefix")]
    pub invoice_series_prefix: String,

    /// Directory where rendered invoice documents are stored
    #[serde(default = "default_invoice_document_dir")]
    pub invoice_document_dir: String,

    /// Seller block printed on invoice documents
    #[serde(default = "default_seller_name")]
    pub seller_name: String,
    #[serde(default = "default_seller_address")]
    pub seller_address: String,
    #[serde(default = "default_seller_nip")]
    pub seller_nip: String,

    /// Allow settling transactions without a verified gateway callback.
    /// Development and test convenience; refused in production.
    #[serde(default = "default_false_bool")]
    pub allow_simulated_settlement: bool,

    /// Points credited to a referrer per qualifying referral
    #[serde(default = "default_referral_reward_points")]
    pub referral_reward_points: i32,

    /// Points needed for one course fee waiver
    #[serde(default = "default_referral_fee_waiver_threshold")]
    #[validate(custom = "validate_fee_waiver_threshold")]
    pub referral_fee_waiver_threshold: i32,

    /// Payment gateway base URL
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Gateway merchant id
    #[serde(default = "default_gateway_merchant_id")]
    pub gateway_merchant_id: i64,

    /// Gateway point-of-sale id (defaults to the merchant id)
    #[serde(default)]
    pub gateway_pos_id: Option<i64>,

    /// Gateway REST API key (Basic auth secret)
    #[serde(default = "default_gateway_api_key")]
    pub gateway_api_key: String,

    /// Gateway CRC key used for request and callback signatures
    #[serde(default = "default_gateway_crc_key")]
    pub gateway_crc_key: String,

    /// URL the gateway redirects the payer back to
    #[serde(default = "default_gateway_return_url")]
    pub gateway_return_url: String,

    /// URL the gateway delivers settlement callbacks to
    #[serde(default = "default_gateway_status_url")]
    pub gateway_status_url: String,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a configuration with built-in defaults; used by tests.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            currency: default_currency(),
            vat_rate: default_vat_rate(),
            invoice_series_prefix: default_invoice_series_prefix(),
            invoice_document_dir: default_invoice_document_dir(),
            seller_name: default_seller_name(),
            seller_address: default_seller_address(),
            seller_nip: default_seller_nip(),
            allow_simulated_settlement: false,
            referral_reward_points: default_referral_reward_points(),
            referral_fee_waiver_threshold: default_referral_fee_waiver_threshold(),
            gateway_base_url: default_gateway_base_url(),
            gateway_merchant_id: default_gateway_merchant_id(),
            gateway_pos_id: None,
            gateway_api_key: default_gateway_api_key(),
            gateway_crc_key: default_gateway_crc_key(),
            gateway_return_url: default_gateway_return_url(),
            gateway_status_url: default_gateway_status_url(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// VAT rate as a `Decimal` for money math. Validation keeps `vat_rate`
    /// finite and inside [0, 1], so the fallback is unreachable in practice.
    pub fn vat_rate_decimal(&self) -> Decimal {
        Decimal::try_from(self.vat_rate).unwrap_or_else(|_| dec!(0.23))
    }

    /// Gateway POS id, falling back to the merchant id.
    pub fn gateway_pos_id(&self) -> i64 {
        self.gateway_pos_id.unwrap_or(self.gateway_merchant_id)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.gateway_crc_key.trim() == DEV_DEFAULT_GATEWAY_CRC_KEY {
            let mut err = ValidationError::new("gateway_crc_key_default_dev");
            err.message = Some(
                "The bundled development gateway CRC key must not be used outside development. Set APP__GATEWAY_CRC_KEY to the key issued by the gateway."
                    .into(),
            );
            errors.add("gateway_crc_key", err);
        }

        if self.is_production() && self.allow_simulated_settlement {
            let mut err = ValidationError::new("allow_simulated_settlement_in_production");
            err.message =
                Some("Simulated settlement bypasses gateway verification and must stay disabled in production".into());
            errors.add("allow_simulated_settlement", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_false_bool() -> bool {
    false
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u32 {
    20
}

fn default_api_max_page_size() -> u32 {
    100
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_vat_rate() -> f64 {
    0.23 // Polish standard VAT rate
}

fn default_invoice_series_prefix() -> String {
    DEFAULT_INVOICE_SERIES_PREFIX.to_string()
}

fn default_invoice_document_dir() -> String {
    DEFAULT_INVOICE_DOCUMENT_DIR.to_string()
}

fn default_seller_name() -> String {
    "EduPay Sp. z o.o.".to_string()
}

fn default_seller_address() -> String {
    "ul. Szkolna 17, 00-950 Warszawa".to_string()
}

fn default_seller_nip() -> String {
    "5250008318".to_string()
}

fn default_referral_reward_points() -> i32 {
    1
}

fn default_referral_fee_waiver_threshold() -> i32 {
    3
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_gateway_merchant_id() -> i64 {
    100_000
}

fn default_gateway_api_key() -> String {
    "dev_api_key".to_string()
}

fn default_gateway_crc_key() -> String {
    DEV_DEFAULT_GATEWAY_CRC_KEY.to_string()
}

fn default_gateway_return_url() -> String {
    "http://localhost:8080/payment/return".to_string()
}

fn default_gateway_status_url() -> String {
    "http://localhost:8080/api/v1/checkout/callback".to_string()
}

fn validate_vat_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("vat_rate");
        err.message = Some("vat_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_fee_waiver_threshold(threshold: i32) -> Result<(), ValidationError> {
    if threshold <= 0 {
        let mut err = ValidationError::new("referral_fee_waiver_threshold");
        err.message = Some("referral_fee_waiver_threshold must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("edupay_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP_*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://edupay.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder =
            builder.add_source(File::with_name(&format!("{}/docker", CONFIG_DIR)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
