use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub environment: Environment,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub admin_bootstrap_secret: Option<String>,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub lightning_settings: LightningSettings,
    pub oracle_settings: OracleSettings,
    pub game_settings: GameSettings,
    pub cache_settings: CacheSettings,
}

impl Settings {
    /// Fail-fast production check (spec.md §6: "startup MUST fail fast if
    /// LNBITS_WEBHOOK_SECRET, REDIS_URL, or LNBITS_API_KEY is unset"),
    /// extended to the rest of the Lightning credential set so a production
    /// deploy never silently falls back to a mock adapter.
    pub fn validate_production(&self) -> Result<(), anyhow::Error> {
        if self.environment != Environment::Production {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.database_url.as_deref().unwrap_or("").is_empty() {
            missing.push("DATABASE_URL");
        }
        if self.redis_url.as_deref().unwrap_or("").is_empty() {
            missing.push("REDIS_URL");
        }
        if self.lightning_settings.lnbits_url.is_empty() {
            missing.push("LNBITS_URL");
        }
        if self.lightning_settings.api_key.is_empty() {
            missing.push("LNBITS_API_KEY");
        }
        if self.lightning_settings.admin_key.is_empty() {
            missing.push("LNBITS_ADMIN_KEY");
        }
        if self.lightning_settings.webhook_secret.is_empty() {
            missing.push("LNBITS_WEBHOOK_SECRET");
        }
        if self.lightning_settings.mock_enabled {
            missing.push("LIGHTNING_MOCK_ENABLED (must be disabled in production)");
        }
        if self.oracle_settings.mock_enabled {
            missing.push("ORACLE_MOCK_ENABLED (must be disabled in production)");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "refusing to start in production: missing or invalid settings: {}",
                missing.join(", ")
            ))
        }
    }
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub mode: String,
    pub cache: String,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub foreign_keys: bool,
    pub wal_autocheckpoint: Option<u32>,
    pub temp_store: String,
    pub mmap_size: Option<u64>,
    pub page_size: Option<u32>,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 12,
            read_min_connections: 2,
            write_max_connections: 5,
            write_min_connections: 1,
            idle_timeout_secs: 600,   // 10 minutes
            acquire_timeout_secs: 15, // 15 seconds
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            mode: "ReadWriteCreate".to_string(),
            cache: "Shared".to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 1000000,
            foreign_keys: true,
            wal_autocheckpoint: Some(1000),
            temp_store: "Memory".to_string(),
            mmap_size: Some(268435456), // 256MB
            page_size: Some(4096),
        }
    }
}

impl SqliteConfigSerde {
    pub fn development() -> Self {
        Self {
            busy_timeout_ms: 10000,
            cache_size: 100000,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            synchronous: "FULL".to_string(),
            cache_size: 2000000,
            wal_autocheckpoint: Some(10000),
            mmap_size: Some(1073741824), // 1GB
            ..Default::default()
        }
    }

    pub fn testing() -> Self {
        Self {
            mode: "Memory".to_string(),
            journal_mode: "MEMORY".to_string(),
            synchronous: "OFF".to_string(),
            temp_store: "Memory".to_string(),
            busy_timeout_ms: 1000,
            cache_size: 10000,
            wal_autocheckpoint: None,
            mmap_size: None,
            page_size: None,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    /// CORS allow-list base origin; `startup::cors_layer` appends localhost
    /// origins outside production.
    pub frontend_url: String,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("9990"),
            frontend_url: String::from("http://localhost:5173"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightningSettings {
    /// Base URL of the LNbits instance fronting the arcade's Lightning wallet.
    pub lnbits_url: String,
    pub api_key: String,
    pub admin_key: String,
    pub webhook_secret: String,
    /// Per-call deadline for Lightning Adapter calls (spec.md §5, default 10s).
    pub api_timeout_ms: u64,
    /// LNURL-pay resolution deadline (spec.md §5, default 5s).
    pub lnurl_timeout_ms: u64,
    /// Use `MockLnClient` instead of `LnbitsClient`. Only honored in debug
    /// builds or with the `e2e-testing` feature; refused otherwise.
    pub mock_enabled: bool,
    pub mock_auto_accept_secs: Option<u64>,
}

impl Default for LightningSettings {
    fn default() -> Self {
        LightningSettings {
            lnbits_url: String::from("http://localhost:5000"),
            api_key: String::new(),
            admin_key: String::new(),
            webhook_secret: String::new(),
            api_timeout_ms: 10_000,
            lnurl_timeout_ms: 5_000,
            mock_enabled: true,
            mock_auto_accept_secs: Some(2),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleSettings {
    pub base_url: String,
    /// Cache TTL for the memoized BTC/USD rate.
    pub cache_ttl_secs: u64,
    /// Fallback BTC/USD rate used after `max_consecutive_failures` upstream
    /// failures in a row (spec.md §6 `BTC_FALLBACK_PRICE`).
    pub fallback_price: f64,
    pub max_consecutive_failures: u32,
    pub mock_enabled: bool,
}

impl Default for OracleSettings {
    fn default() -> Self {
        OracleSettings {
            base_url: String::from("http://localhost:9800"),
            cache_ttl_secs: 30,
            fallback_price: 65_000.0,
            max_consecutive_failures: 3,
            mock_enabled: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSettings {
    /// USD price of one attempt (spec.md §6 `ATTEMPT_COST_USD`).
    pub attempt_cost_usd: f64,
    /// Fixed sats price of a tournament buy-in entry (`payments::buy_in`,
    /// distinct from the USD-priced per-attempt debit).
    pub buy_in_sats: i64,
    /// Whether `/game/submit` without an `attempt_id` (the legacy
    /// best-score-only path, spec.md §4.5) is accepted.
    pub allow_legacy_submit: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            attempt_cost_usd: 0.01,
            buy_in_sats: 1_000,
            allow_legacy_submit: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            max_entries: crate::infra::cache::DEFAULT_CACHE_MAX_ENTRIES,
            sweep_interval_secs: crate::infra::cache::DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
        }
    }
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}
pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    /// Get the default config file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    /// Get the config directory path
    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);

        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        let file_settings = match File::open(absolute_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to map config to settings: {}", e))?
            }
            Err(err) => return Err(anyhow!("Failed to find file: {}", err)),
        };
        file_settings
    } else {
        let default_path = T::default_config_path();
        match File::open(&default_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read default config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to parse default config: {}", e))?
            }
            Err(_) => {
                // Create default settings
                let default_settings = T::default();

                // Create config directory if it doesn't exist
                fs::create_dir_all(T::config_directory())
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

                let toml_content = toml::to_string(&default_settings)
                    .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

                let mut file = fs::File::create(&default_path)
                    .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
                file.write_all(toml_content.as_bytes())
                    .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

                default_settings
            }
        }
    };

    settings.apply_cli_overrides(&cli_settings);

    Ok(settings)
}

/// Applies environment-variable overrides on top of the TOML-loaded
/// `Settings`, matching spec.md §6's configuration-by-environment surface.
/// Kept as a standalone pass (rather than folded into `apply_cli_overrides`)
/// since env vars are deployment secrets, not developer-facing CLI flags.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = env::var("ENVIRONMENT") {
        settings.environment = match v.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };
    }
    if let Ok(v) = env::var("DATABASE_URL") {
        settings.database_url = Some(v);
    }
    if let Ok(v) = env::var("REDIS_URL") {
        settings.redis_url = Some(v);
    }
    if let Ok(v) = env::var("FRONTEND_URL") {
        settings.api_settings.frontend_url = v;
    }
    if let Ok(v) = env::var("LNBITS_URL") {
        settings.lightning_settings.lnbits_url = v;
    }
    if let Ok(v) = env::var("LNBITS_API_KEY") {
        settings.lightning_settings.api_key = v;
    }
    if let Ok(v) = env::var("LNBITS_ADMIN_KEY") {
        settings.lightning_settings.admin_key = v;
    }
    if let Ok(v) = env::var("LNBITS_WEBHOOK_SECRET") {
        settings.lightning_settings.webhook_secret = v;
    }
    if let Ok(Ok(ms)) = env::var("LIGHTNING_API_TIMEOUT").map(|v| v.parse()) {
        settings.lightning_settings.api_timeout_ms = ms;
    }
    if let Ok(Ok(usd)) = env::var("ATTEMPT_COST_USD").map(|v| v.parse()) {
        settings.game_settings.attempt_cost_usd = usd;
    }
    if let Ok(Ok(price)) = env::var("BTC_FALLBACK_PRICE").map(|v| v.parse()) {
        settings.oracle_settings.fallback_price = price;
    }
    if let Ok(Ok(max)) = env::var("DB_POOL_MAX").map(|v| v.parse()) {
        settings.db_settings.read_max_connections = max;
    }
    if let Ok(Ok(ms)) = env::var("DB_IDLE_TIMEOUT_MS").map(|v: String| v.parse::<u64>()) {
        settings.db_settings.idle_timeout_secs = ms / 1000;
    }
    if let Ok(Ok(ms)) = env::var("DB_CONNECT_TIMEOUT_MS").map(|v: String| v.parse::<u64>()) {
        settings.db_settings.acquire_timeout_secs = ms / 1000;
    }
    if let Ok(v) = env::var("ADMIN_BOOTSTRAP_SECRET") {
        settings.admin_bootstrap_secret = Some(v);
    }
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}: {}",
                OffsetDateTime::now_utc().format(&Iso8601::DEFAULT).unwrap(),
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    if let Some(level) = &level {
        match level.as_ref() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    } else {
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| String::from(""));
        match rust_log.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    }
}
