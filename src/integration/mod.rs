//! Integration layer: configuration and the production orchestrator

pub mod config;
pub mod orchestrator;

pub use config::{
    BackendProfile, BackendSettings, ConfigError, ProductionConfig, StudioConfig, PROFILES,
};
pub use orchestrator::{produce, ProductionEvent, ProductionHandle, ProductionState, Producer};
