//! Configuration management for the rally-point service
//!
//! Loading from a TOML file or environment variables, validation, and
//! default values.

pub mod app;

pub use app::{
    validate_config, AmqpSettings, AppConfig, RatingConfig, ReadyCheckConfig, ServiceSettings,
};
