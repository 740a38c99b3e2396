use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

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
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// How long an approved reservation holds its units
    #[serde(default = "default_reservation_hold_days")]
    #[validate(range(min = 1))]
    pub reservation_hold_days: i64,

    /// How long a NEW lead stays open before the sweep expires it
    #[serde(default = "default_lead_ttl_days")]
    #[validate(range(min = 1))]
    pub lead_ttl_days: i64,

    /// Absolute cart lifetime, counted from creation
    #[serde(default = "default_cart_ttl_hours")]
    #[validate(range(min = 1))]
    pub cart_ttl_hours: i64,

    /// How long a Pending order waits for payment before units are released
    #[serde(default = "default_order_payment_window_hours")]
    #[validate(range(min = 1))]
    pub order_payment_window_hours: i64,

    /// Carts of CLOSED or EXPIRED leads are kept this long for follow-up
    #[serde(default = "default_closed_lead_cart_grace_days")]
    #[validate(range(min = 0))]
    pub closed_lead_cart_grace_days: i64,

    /// Accepted difference between the amount a provider reports and the order total
    #[serde(default = "default_payment_amount_tolerance")]
    #[validate(custom = "validate_payment_amount_tolerance")]
    pub payment_amount_tolerance: Decimal,
}

impl AppConfig {
    /// Creates a new configuration with every tunable at its default
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            reservation_hold_days: default_reservation_hold_days(),
            lead_ttl_days: default_lead_ttl_days(),
            cart_ttl_hours: default_cart_ttl_hours(),
            order_payment_window_hours: default_order_payment_window_hours(),
            closed_lead_cart_grace_days: default_closed_lead_cart_grace_days(),
            payment_amount_tolerance: default_payment_amount_tolerance(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn reservation_hold(&self) -> chrono::Duration {
        chrono::Duration::days(self.reservation_hold_days)
    }

    pub fn lead_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.lead_ttl_days)
    }

    pub fn cart_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cart_ttl_hours)
    }

    pub fn order_payment_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.order_payment_window_hours)
    }

    pub fn closed_lead_cart_grace(&self) -> chrono::Duration {
        chrono::Duration::days(self.closed_lead_cart_grace_days)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
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

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_reservation_hold_days() -> i64 {
    2
}

fn default_lead_ttl_days() -> i64 {
    3
}

fn default_cart_ttl_hours() -> i64 {
    24
}

fn default_order_payment_window_hours() -> i64 {
    24
}

fn default_closed_lead_cart_grace_days() -> i64 {
    7
}

fn default_payment_amount_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_level");
            err.message = Some("log_level must be one of trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

fn validate_payment_amount_tolerance(tolerance: &Decimal) -> Result<(), ValidationError> {
    if tolerance.is_sign_negative() {
        let mut err = ValidationError::new("payment_amount_tolerance");
        err.message = Some("payment_amount_tolerance must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stockroom_api={},stockroom_cli={}", level, level);
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

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://stockroom.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
