//! Load status of the paginated listing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the listing stands with respect to its remote pages.
///
/// The `Init*` variants describe the first page of a browsing session; the
/// plain ones describe every page after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    /// Nothing requested yet
    #[default]
    Idle,
    Loading,
    Success,
    Failed,
    InitEmpty,
    InitSuccess,
    InitFailed,
}

impl NetworkState {
    /// Every state except `Loading`.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::InitEmpty | Self::InitSuccess | Self::InitFailed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::InitFailed)
    }

    pub fn shows_empty_state(&self) -> bool {
        matches!(self, Self::InitEmpty)
    }

    pub fn shows_retry(&self) -> bool {
        self.is_failure()
    }

    /// Swipe-to-delete is offered only while the last page load succeeded.
    pub fn allows_swipe_actions(&self) -> bool {
        matches!(self, Self::Success | Self::InitSuccess)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::InitEmpty => "init_empty",
            Self::InitSuccess => "init_success",
            Self::InitFailed => "init_failed",
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_loading_is_unsettled() {
        use NetworkState::*;
        for state in [Idle, Success, Failed, InitEmpty, InitSuccess, InitFailed] {
            assert!(state.is_settled(), "{state} should be settled");
        }
        assert!(!Loading.is_settled());
    }

    #[test]
    fn test_affordances() {
        assert!(NetworkState::InitEmpty.shows_empty_state());
        assert!(!NetworkState::Success.shows_empty_state());

        assert!(NetworkState::Failed.shows_retry());
        assert!(NetworkState::InitFailed.shows_retry());

        assert!(NetworkState::InitSuccess.allows_swipe_actions());
        assert!(NetworkState::Success.allows_swipe_actions());
        assert!(!NetworkState::InitEmpty.allows_swipe_actions());
        assert!(!NetworkState::Failed.allows_swipe_actions());
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_string(&NetworkState::InitEmpty).unwrap();
        assert_eq!(json, "\"init_empty\"");
    }
}
