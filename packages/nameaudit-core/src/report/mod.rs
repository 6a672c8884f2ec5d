//! Non-compliant device report pipeline.
//!
//! A run resolves a credential, optionally probes the appliance, issues one
//! device search and streams the returned page as report records. Paging
//! through larger result sets is left to the caller: run again with
//! [`SearchParams::next_page`].

mod record;
mod writer;

pub use record::ReportRecord;
pub use writer::{ReportMetadata, ReportWriter, HEADER_LINE};

use crate::appliance::{ApplianceApi, ApplianceClient, ApplianceInfo, ClientOptions, Device};
use crate::auth::{self, CredentialStore};
use crate::error::AuditError;
use crate::search::{SearchFilter, SearchParams};
use std::fmt;

/// Which introspection call to make before searching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// `GET extrahop/`: platform and firmware
    #[default]
    Platform,
    /// `GET extrahop/version`: firmware only, for older appliances
    Legacy,
    Skip,
}

/// What the probe found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Platform(ApplianceInfo),
    Firmware(String),
    Skipped,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Platform(info) => write!(
                f,
                "{} with firmware version {}",
                info.platform, info.firmware_version
            ),
            ProbeOutcome::Firmware(version) => write!(f, "firmware version {}", version),
            ProbeOutcome::Skipped => write!(f, "not probed"),
        }
    }
}

/// Step of a run that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStep {
    CredentialResolution,
    VersionProbe,
    Search,
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStep::CredentialResolution => write!(f, "credential resolution"),
            RunStep::VersionProbe => write!(f, "version probe"),
            RunStep::Search => write!(f, "device search"),
        }
    }
}

/// Progress of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No usable API key yet; only [`run_report`] passes through here
    Unauthenticated,
    CredentialResolved,
    VersionProbed,
    FilterBuilt,
    Queried,
    Streaming,
    Done,
    Failed(RunStep),
}

/// A run that stopped at `step`
#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {error}")]
pub struct RunFailure {
    pub step: RunStep,
    /// State the run was in when `step` failed
    pub from: RunState,
    #[source]
    pub error: AuditError,
}

/// Result of a successful run
#[derive(Debug)]
pub struct Report {
    pub appliance: ProbeOutcome,
    pub filter: SearchFilter,
    pub records: ReportStream,
}

/// Drives one search against an authenticated appliance
pub struct ReportPipeline<'a, A: ApplianceApi + ?Sized> {
    api: &'a A,
    state: RunState,
}

impl<'a, A: ApplianceApi + ?Sized> ReportPipeline<'a, A> {
    /// Holding an `ApplianceApi` means a credential was already resolved
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            state: RunState::CredentialResolved,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Probe (per `probe`), search with `params`, and return the page as a record stream.
    ///
    /// Each call is a fresh run; at most two requests are made, one after the other.
    pub async fn run(&mut self, params: &SearchParams, probe: ProbeMode) -> Result<Report, RunFailure> {
        let api = self.api;
        self.transition(RunState::CredentialResolved);

        let appliance = match probe {
            ProbeMode::Platform => {
                let info = api
                    .probe_version()
                    .await
                    .map_err(|e| self.fail(RunStep::VersionProbe, e))?;
                tracing::info!(
                    "Appliance at {} is an {} and the firmware version is {}",
                    api.host(),
                    info.platform,
                    info.firmware_version
                );
                ProbeOutcome::Platform(info)
            }
            ProbeMode::Legacy => {
                let version = api
                    .probe_firmware_version()
                    .await
                    .map_err(|e| self.fail(RunStep::VersionProbe, e))?;
                tracing::info!("Appliance version is {}", version);
                ProbeOutcome::Firmware(version)
            }
            ProbeMode::Skip => ProbeOutcome::Skipped,
        };
        self.transition(RunState::VersionProbed);

        let filter = params.to_filter();
        tracing::debug!(
            "Filter constructed for name check: {}",
            serde_json::to_string(&filter).unwrap_or_default()
        );
        self.transition(RunState::FilterBuilt);

        let devices = api
            .search_devices(&filter)
            .await
            .map_err(|e| self.fail(RunStep::Search, e))?;
        self.transition(RunState::Queried);
        tracing::debug!("Search returned {} devices", devices.len());

        self.transition(RunState::Streaming);
        Ok(Report {
            appliance,
            filter,
            records: ReportStream::new(devices),
        })
    }

    fn transition(&mut self, next: RunState) {
        tracing::trace!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, step: RunStep, error: AuditError) -> RunFailure {
        let from = self.state;
        self.transition(RunState::Failed(step));
        RunFailure { step, from, error }
    }
}

/// Resolve the key for `host`, connect and run one report.
///
/// A key passed in `supplied` wins over the credential store. With neither,
/// the run fails at credential resolution with `NotConfigured`.
pub async fn run_report(
    store: &CredentialStore,
    host: &str,
    supplied: Option<&str>,
    options: &ClientOptions,
    params: &SearchParams,
    probe: ProbeMode,
) -> Result<Report, RunFailure> {
    let credential_failure = |error| {
        tracing::trace!(
            "Pipeline state {:?} -> {:?}",
            RunState::Unauthenticated,
            RunState::Failed(RunStep::CredentialResolution)
        );
        RunFailure {
            step: RunStep::CredentialResolution,
            from: RunState::Unauthenticated,
            error,
        }
    };

    let (api_key, source) = auth::resolve_api_key(store, host, supplied)
        .map_err(credential_failure)?
        .ok_or_else(|| credential_failure(AuditError::NotConfigured("API key")))?;
    tracing::debug!("Using API key for {} from {:?}", host, source);

    let client = ApplianceClient::new(host, &api_key, options).map_err(credential_failure)?;
    ReportPipeline::new(&client).run(params, probe).await
}

/// Lazily projects one page of devices into report records, in response order.
#[derive(Debug)]
pub struct ReportStream {
    devices: std::vec::IntoIter<Device>,
    total: usize,
    emitted: usize,
    done: bool,
}

impl ReportStream {
    fn new(devices: Vec<Device>) -> Self {
        Self {
            total: devices.len(),
            devices: devices.into_iter(),
            emitted: 0,
            done: false,
        }
    }

    /// Records produced so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Number of devices in the page
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn state(&self) -> RunState {
        if self.done {
            RunState::Done
        } else {
            RunState::Streaming
        }
    }
}

impl Iterator for ReportStream {
    type Item = ReportRecord;

    fn next(&mut self) -> Option<ReportRecord> {
        match self.devices.next() {
            Some(device) => {
                self.emitted += 1;
                tracing::debug!("Record {} of {}: device {}", self.emitted, self.total, device.id);
                Some(ReportRecord::from(&device))
            }
            None => {
                if !self.done {
                    self.done = true;
                    tracing::info!("Produced a total of {} device records", self.emitted);
                }
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.devices.size_hint()
    }
}

impl ExactSizeIterator for ReportStream {}
