//! Engine vocabulary to [`DownloadState`].
//!
//! The download engine reports a richer set of transfer states than the core
//! tracks. Everything past this module sees only the six core states.

use bridge_traits::download::TransferState;
use core_library::DownloadState;

/// Map an engine transfer state onto the core lifecycle.
pub fn map_transfer_state(state: &TransferState) -> DownloadState {
    match state {
        TransferState::Queued | TransferState::Restarting | TransferState::Stopped { .. } => {
            DownloadState::Queued
        }
        TransferState::Downloading {
            downloaded_bytes,
            total_bytes,
        } => DownloadState::in_progress(percent_of(*downloaded_bytes, *total_bytes)),
        TransferState::Completed => DownloadState::Completed,
        TransferState::Failed { .. } => DownloadState::Failed,
        TransferState::Removing => DownloadState::PendingRemoval,
        TransferState::Removed => DownloadState::NotDownloaded,
    }
}

/// Whole percent of `downloaded` over `total`; 0 when the size is unknown.
pub fn percent_of(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let percent = u128::from(downloaded.min(total)) * 100 / u128::from(total);
            percent as u8
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiting_states_map_to_queued() {
        for state in [
            TransferState::Queued,
            TransferState::Restarting,
            TransferState::Stopped {
                reason: "waiting for network".to_string(),
            },
        ] {
            assert_eq!(map_transfer_state(&state), DownloadState::Queued);
        }
    }

    #[test]
    fn test_removal_states() {
        assert_eq!(
            map_transfer_state(&TransferState::Removing),
            DownloadState::PendingRemoval
        );
        assert_eq!(
            map_transfer_state(&TransferState::Removed),
            DownloadState::NotDownloaded
        );
    }

    #[test]
    fn test_downloading_reports_percent() {
        let state = TransferState::Downloading {
            downloaded_bytes: 250,
            total_bytes: Some(1_000),
        };
        assert_eq!(map_transfer_state(&state), DownloadState::InProgress(25));

        let unknown = TransferState::Downloading {
            downloaded_bytes: 4_096,
            total_bytes: None,
        };
        assert_eq!(map_transfer_state(&unknown), DownloadState::InProgress(0));
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(percent_of(2_000, Some(1_000)), 100);
        assert_eq!(percent_of(10, Some(0)), 0);
        assert_eq!(percent_of(u64::MAX, Some(u64::MAX)), 100);
        assert_eq!(percent_of(999, Some(1_000)), 99);
    }
}
