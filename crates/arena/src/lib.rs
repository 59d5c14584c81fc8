pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use config::{apply_env_overrides, get_settings, setup_logger, ConfigurableSettings, Settings};
pub use startup::Application;
