//! Nameaudit Core Library
//!
//! This crate provides the core functionality behind the `nameaudit` tool:
//! - Credential management (host to API key file in the home directory)
//! - Appliance REST client (authenticated requests, status classification, probes)
//! - Device search filters (regex name match over a lookback window)
//! - Report pipeline (one search page streamed as CSV-ready records)
//!
//! # Example
//!
//! ```no_run
//! use nameaudit_core::{auth, report, search, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = auth::CredentialStore::open_default()?;
//!     let params = search::SearchParams::default();
//!
//!     let report = report::run_report(
//!         &store,
//!         "192.168.0.16",
//!         None,
//!         &ClientOptions::default(),
//!         &params,
//!         report::ProbeMode::Platform,
//!     )
//!     .await?;
//!
//!     for record in report.records {
//!         println!("{}", record);
//!     }
//!     Ok(())
//! }
//! ```

pub mod appliance;
pub mod auth;
pub mod error;
pub mod report;
pub mod search;

// Re-export commonly used types
pub use appliance::{ApplianceApi, ApplianceClient, ApplianceInfo, ClientOptions, Device};
pub use auth::{CredentialStore, KeySource};
pub use error::{AuditError, ErrorKind};
pub use report::{ProbeMode, Report, ReportPipeline, ReportRecord, RunFailure, RunState, RunStep};
pub use search::{MatchOperator, SearchFilter, SearchParams};
