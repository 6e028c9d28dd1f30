//! Error types for Reprise Core

use crate::cooldown::CooldownStatus;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Quality selection errors
    #[error("No cached representation data, manifest must be re-fetched")]
    NoCachedData,

    #[error("No representation matches the requested quality")]
    NoMatchingQuality,

    #[error("Selected representation {quality} has no usable URL")]
    InvalidUrl { quality: u32 },

    #[error("Duplicate representation id {id} in representation set")]
    DuplicateRepresentation { id: u32 },

    // Permission errors
    #[error("Quality {label} requires a VIP subscription")]
    RequiresVip { label: String },

    #[error("Quality {label} requires login")]
    RequiresLogin { label: String },

    // Admission errors
    #[error("Playback attempts suspended: {0}")]
    CoolingDown(CooldownStatus),

    // Recovery errors
    #[error("Recovery budget exhausted after {retries} retries and {cdn_switches} CDN switches")]
    GaveUp { retries: u32, cdn_switches: u32 },

    #[error("Request superseded by generation {current}")]
    Superseded { current: u64 },

    // Collaborator errors
    #[error("Failed to fetch representations: {0}")]
    Fetch(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a fetch error from any displayable cause
    pub fn fetch(msg: impl std::fmt::Display) -> Self {
        Error::Fetch(msg.to_string())
    }

    /// Returns true if the condition can be resolved inside the engine
    /// by re-fetching or retrying, without involving the user
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoCachedData
                | Error::NoMatchingQuality
                | Error::InvalidUrl { .. }
                | Error::Fetch(_)
                | Error::Superseded { .. }
        )
    }

    /// Returns true if this error should be shown to the user
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Error::RequiresVip { .. }
                | Error::RequiresLogin { .. }
                | Error::GaveUp { .. }
                | Error::CoolingDown(_)
        )
    }

    /// Returns the error code for event reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoCachedData => "NO_CACHED_DATA",
            Error::NoMatchingQuality => "NO_MATCHING_QUALITY",
            Error::InvalidUrl { .. } => "INVALID_URL",
            Error::DuplicateRepresentation { .. } => "DUPLICATE_REPRESENTATION",
            Error::RequiresVip { .. } => "REQUIRES_VIP",
            Error::RequiresLogin { .. } => "REQUIRES_LOGIN",
            Error::CoolingDown(_) => "COOLING_DOWN",
            Error::GaveUp { .. } => "GAVE_UP",
            Error::Superseded { .. } => "SUPERSEDED",
            Error::Fetch(_) => "FETCH",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_selection_errors_are_recoverable() {
        assert!(Error::NoCachedData.is_recoverable());
        assert!(Error::NoMatchingQuality.is_recoverable());
        assert!(Error::InvalidUrl { quality: 80 }.is_recoverable());
        assert!(!Error::NoCachedData.is_user_visible());
    }

    #[test]
    fn test_permission_errors_are_user_visible() {
        let vip = Error::RequiresVip { label: "4K".into() };
        assert!(!vip.is_recoverable());
        assert!(vip.is_user_visible());
        assert_eq!(vip.error_code(), "REQUIRES_VIP");
        assert_eq!(vip.to_string(), "Quality 4K requires a VIP subscription");
    }

    #[test]
    fn test_cooling_down_is_not_recoverable() {
        let err = Error::CoolingDown(CooldownStatus::GlobalCooldown {
            remaining: Duration::from_secs(90),
        });
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "COOLING_DOWN");
    }
}
