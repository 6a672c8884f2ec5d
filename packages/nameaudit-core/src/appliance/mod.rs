//! Appliance REST API access.
//!
//! Provides the authenticated HTTP client for the appliance and the settings
//! it is configured from.

mod client;
pub mod config;

pub use client::{
    classify_response, platform_label, ApplianceApi, ApplianceClient, ApplianceInfo,
    ClientOptions, Device, ResponseContext, DEFAULT_TIMEOUT,
};
pub use config::{load_settings, AuditSettings, ConfigSource};
