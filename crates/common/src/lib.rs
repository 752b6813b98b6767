//! Shared configuration model and error types for throttlegate.

pub mod config;
pub mod error;

pub use config::{
    AdminConfig, AppConfig, ByIpConfig, LimitHandlerConfig, LimitsConfig, RuleConfig, ServerConfig,
};
pub use error::{ThrottleError, ThrottleResult};
