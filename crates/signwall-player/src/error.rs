use signwall_shared::MediaId;
use signwall_store::StoreError;
use thiserror::Error;

/// Failures talking to the backend collaborator.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The screen is not part of any group.
    #[error("Screen is not assigned to a group")]
    NotAssigned,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Pairing rejected: {0}")]
    PairingRejected(String),
}

/// Why a synchronization cycle did not apply a fresh schedule.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Screen is not assigned to a group")]
    AssignmentMissing,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Cache error: {0}")]
    Store(#[from] StoreError),

    #[error("No metadata returned for media {0}")]
    MissingMetadata(MediaId),

    #[error("Download of media {media} failed: {source}")]
    Download {
        media: MediaId,
        #[source]
        source: BackendError,
    },
}

/// Why the device could not establish its screen id.
#[derive(Error, Debug)]
pub enum PairingError {
    /// No stored pairing and no code to pair with.
    #[error("Device is not paired; set SIGNWALL_PAIRING_CODE")]
    NotPaired,

    #[error("Pairing code must be {expected} digits")]
    InvalidCode { expected: usize },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Cache error: {0}")]
    Store(#[from] StoreError),
}
