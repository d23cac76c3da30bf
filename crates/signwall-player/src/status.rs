use std::fmt;

use crate::error::SyncError;

/// The last known blocking condition, shown to whoever looks at the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStatus {
    Starting,
    Playing,
    /// The screen belongs to no group. Stays until it is re-paired.
    AssignmentMissing,
    /// The last refresh failed; the previous cache keeps playing.
    RefreshFailed(String),
    /// The group channel dropped; playback continues from cache.
    ChannelDisconnected,
    EmptySchedule,
    /// Pairing was cleared; the device needs a new code.
    Unpaired,
}

impl PlayerStatus {
    /// Status after a failed sync cycle.
    pub fn from_sync_error(error: &SyncError) -> Self {
        match error {
            SyncError::AssignmentMissing => PlayerStatus::AssignmentMissing,
            other => PlayerStatus::RefreshFailed(other.to_string()),
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerStatus::Starting => f.write_str("Initializing..."),
            PlayerStatus::Playing => f.write_str("Playing."),
            PlayerStatus::AssignmentMissing => f.write_str("Error: Screen not assigned to a group."),
            PlayerStatus::RefreshFailed(reason) => {
                write!(f, "Warning: Could not refresh content ({reason}). Playing cached content.")
            }
            PlayerStatus::ChannelDisconnected => {
                f.write_str("Warning: Lost connection to the group. Reconnecting...")
            }
            PlayerStatus::EmptySchedule => f.write_str("No content scheduled."),
            PlayerStatus::Unpaired => f.write_str("Device unpaired. Enter a new pairing code."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    #[test]
    fn sync_errors_map_to_status() {
        assert_eq!(
            PlayerStatus::from_sync_error(&SyncError::AssignmentMissing),
            PlayerStatus::AssignmentMissing
        );

        let status = PlayerStatus::from_sync_error(&SyncError::Backend(BackendError::Status {
            status: 503,
            url: "https://signs.example/api".into(),
        }));
        assert!(matches!(status, PlayerStatus::RefreshFailed(_)));
        assert!(status.to_string().contains("503"));
    }

    #[test]
    fn display_strings() {
        assert_eq!(PlayerStatus::Starting.to_string(), "Initializing...");
        assert_eq!(
            PlayerStatus::AssignmentMissing.to_string(),
            "Error: Screen not assigned to a group."
        );
        assert_eq!(PlayerStatus::EmptySchedule.to_string(), "No content scheduled.");
        assert!(PlayerStatus::Unpaired.to_string().starts_with("Device unpaired."));
    }
}
