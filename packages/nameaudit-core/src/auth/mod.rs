//! Credential handling for appliance API keys.
//!
//! Provides the on-disk host to API key store and the precedence rules used
//! to pick a key for a run.

mod credentials;

pub use credentials::{default_key_file_path, Credential, CredentialStore, KEY_FILE_NAME};

use crate::error::{AuditError, Result};

/// Where the key for a run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Passed explicitly by the caller
    Supplied,
    /// Found in the credential file
    Stored,
}

/// Pick the API key for `host`.
///
/// A non-empty supplied key always wins. Otherwise the store is consulted and
/// `Ok(None)` is returned when it has nothing, leaving any prompting to the caller.
pub fn resolve_api_key(
    store: &CredentialStore,
    host: &str,
    supplied: Option<&str>,
) -> Result<Option<(String, KeySource)>> {
    if host.trim().is_empty() {
        return Err(AuditError::NotConfigured("appliance host"));
    }

    if let Some(key) = supplied.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(Some((key.to_string(), KeySource::Supplied)));
    }

    Ok(store
        .resolve(host)?
        .map(|key| (key, KeySource::Stored)))
}
