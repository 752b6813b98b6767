pub mod config;
pub mod health;
pub mod metrics;
pub mod reset;
pub mod run;
pub mod stats;
