//! Error taxonomy for appliance queries and credential storage.
//!
//! Every failure is terminal for the call that produced it; nothing here is retried.

use std::path::PathBuf;

/// Top-level error type for the core library
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Host or API key missing before any network call was attempted
    #[error("No {0} configured. Supply it on the command line or in the credential file")]
    NotConfigured(&'static str),

    #[error("The API key for {host} contains characters that are not valid in an HTTP header")]
    InvalidApiKey { host: String },

    /// A host or key that the whitespace-separated credential file cannot hold
    #[error("Cannot store a credential for '{host}': {reason}")]
    InvalidCredential { host: String, reason: &'static str },

    #[error("Credential file {path:?} could not be accessed: {source}")]
    CredentialStoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "The API returned an unauthorised / missing API key error (401) for {resource}. \
         Please check your API key in the file {key_file:?}"
    )]
    Auth { resource: String, key_file: PathBuf },

    #[error(
        "The EULA has not been accepted for this appliance (402). \
         Please browse to https://{host}/admin to accept the EULA"
    )]
    License { host: String },

    #[error(
        "The current user has insufficient privileges to perform that operation on {resource} (403)"
    )]
    Permission { resource: String },

    #[error(
        "The requested resource {resource} could not be found (404). \
         Are you specifying the right object ID or endpoint?"
    )]
    NotFound { resource: String },

    #[error("Partial update or ticketing is disabled on the appliance for {resource} (422)")]
    FeatureDisabled { resource: String },

    #[error("Internal Server Error from {resource} ({status})")]
    Server { status: u16, resource: String },

    #[error("Request to {resource} failed with unexpected status {status}")]
    UnknownHttp { status: u16, resource: String },

    #[error("Response from {resource} was not the expected JSON: {source}")]
    MalformedResponse {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request body for {resource} could not be encoded as JSON: {source}")]
    RequestEncoding {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not reach {resource}: {source}")]
    Transport {
        resource: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Flat classification of [`AuditError`], convenient for matching and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConfigured,
    CredentialStoreIo,
    Auth,
    License,
    Permission,
    NotFound,
    FeatureDisabled,
    Server,
    UnknownHttp,
    MalformedResponse,
    RequestEncoding,
    Transport,
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::NotConfigured(_)
            | AuditError::InvalidApiKey { .. }
            | AuditError::InvalidCredential { .. } => ErrorKind::NotConfigured,
            AuditError::CredentialStoreIo { .. } => ErrorKind::CredentialStoreIo,
            AuditError::Auth { .. } => ErrorKind::Auth,
            AuditError::License { .. } => ErrorKind::License,
            AuditError::Permission { .. } => ErrorKind::Permission,
            AuditError::NotFound { .. } => ErrorKind::NotFound,
            AuditError::FeatureDisabled { .. } => ErrorKind::FeatureDisabled,
            AuditError::Server { .. } => ErrorKind::Server,
            AuditError::UnknownHttp { .. } => ErrorKind::UnknownHttp,
            AuditError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            AuditError::RequestEncoding { .. } => ErrorKind::RequestEncoding,
            AuditError::Transport { .. } => ErrorKind::Transport,
        }
    }

    /// HTTP status behind the error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            AuditError::Auth { .. } => Some(401),
            AuditError::License { .. } => Some(402),
            AuditError::Permission { .. } => Some(403),
            AuditError::NotFound { .. } => Some(404),
            AuditError::FeatureDisabled { .. } => Some(422),
            AuditError::Server { status, .. } | AuditError::UnknownHttp { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub(crate) fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditError::CredentialStoreIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = AuditError> = std::result::Result<T, E>;
