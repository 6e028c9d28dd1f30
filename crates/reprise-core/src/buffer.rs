//! Buffer policy for the player's load control
//!
//! Handles:
//! - Buffer windows per network class
//! - Start and rebuffer thresholds
//! - Profile validation for user overrides

use crate::{types::NetworkClass, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Buffering parameters handed to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferProfile {
    /// Buffer the player always tries to keep (ms)
    pub min_buffer_ms: u32,
    /// Buffer ceiling (ms)
    pub max_buffer_ms: u32,
    /// Buffer required before playback starts (ms)
    pub buffer_for_playback_ms: u32,
    /// Buffer required to resume after a stall (ms)
    pub buffer_for_playback_after_rebuffer_ms: u32,
}

impl BufferProfile {
    /// Low start latency. Rebuffering is cheap to recover from on fast links.
    pub const UNMETERED: BufferProfile = BufferProfile {
        min_buffer_ms: 15_000,
        max_buffer_ms: 50_000,
        buffer_for_playback_ms: 2_500,
        buffer_for_playback_after_rebuffer_ms: 5_000,
    };

    /// Deeper windows and higher thresholds to avoid repeated stalls on cellular.
    pub const METERED: BufferProfile = BufferProfile {
        min_buffer_ms: 25_000,
        max_buffer_ms: 60_000,
        buffer_for_playback_ms: 5_000,
        buffer_for_playback_after_rebuffer_ms: 10_000,
    };

    /// Check the ordering constraints the player's load control relies on
    pub fn validate(&self) -> Result<()> {
        if self.min_buffer_ms > self.max_buffer_ms {
            return Err(Error::InvalidConfig(format!(
                "min_buffer_ms ({}) exceeds max_buffer_ms ({})",
                self.min_buffer_ms, self.max_buffer_ms
            )));
        }
        if self.buffer_for_playback_ms > self.min_buffer_ms {
            return Err(Error::InvalidConfig(format!(
                "buffer_for_playback_ms ({}) exceeds min_buffer_ms ({})",
                self.buffer_for_playback_ms, self.min_buffer_ms
            )));
        }
        if self.buffer_for_playback_after_rebuffer_ms < self.buffer_for_playback_ms {
            return Err(Error::InvalidConfig(format!(
                "buffer_for_playback_after_rebuffer_ms ({}) is below buffer_for_playback_ms ({})",
                self.buffer_for_playback_after_rebuffer_ms, self.buffer_for_playback_ms
            )));
        }
        if self.buffer_for_playback_after_rebuffer_ms > self.min_buffer_ms {
            return Err(Error::InvalidConfig(format!(
                "buffer_for_playback_after_rebuffer_ms ({}) exceeds min_buffer_ms ({})",
                self.buffer_for_playback_after_rebuffer_ms, self.min_buffer_ms
            )));
        }
        Ok(())
    }
}

/// Maps network class to a buffer profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPolicy {
    /// Profile for Wi-Fi and wired links
    pub unmetered: BufferProfile,
    /// Profile for cellular and unknown links
    pub metered: BufferProfile,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            unmetered: BufferProfile::UNMETERED,
            metered: BufferProfile::METERED,
        }
    }
}

impl BufferPolicy {
    /// Resolve the profile for a network class
    pub fn resolve(&self, network: NetworkClass) -> BufferProfile {
        let profile = match network {
            NetworkClass::Unmetered => self.unmetered,
            NetworkClass::Metered => self.metered,
        };

        debug!(
            network = %network,
            min_ms = profile.min_buffer_ms,
            max_ms = profile.max_buffer_ms,
            playback_ms = profile.buffer_for_playback_ms,
            rebuffer_ms = profile.buffer_for_playback_after_rebuffer_ms,
            "Buffer profile resolved"
        );

        profile
    }

    /// Resolve from the platform's "unmetered high-bandwidth" flag
    pub fn resolve_unmetered(&self, unmetered: bool) -> BufferProfile {
        self.resolve(NetworkClass::from_unmetered(unmetered))
    }

    /// Validate both profiles
    pub fn validate(&self) -> Result<()> {
        self.unmetered.validate()?;
        self.metered.validate()?;
        if self.unmetered.buffer_for_playback_ms >= self.metered.buffer_for_playback_ms {
            return Err(Error::InvalidConfig(
                "unmetered buffer_for_playback_ms must be below the metered one".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_valid() {
        let policy = BufferPolicy::default();
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_unmetered_starts_sooner() {
        let policy = BufferPolicy::default();
        let fast = policy.resolve(NetworkClass::Unmetered);
        let slow = policy.resolve(NetworkClass::Metered);
        assert!(fast.buffer_for_playback_ms < slow.buffer_for_playback_ms);
        assert!(fast.min_buffer_ms < slow.min_buffer_ms);
        assert!(fast.max_buffer_ms < slow.max_buffer_ms);
    }

    #[test]
    fn test_rebuffer_threshold_not_below_start() {
        for profile in [BufferProfile::UNMETERED, BufferProfile::METERED] {
            assert!(
                profile.buffer_for_playback_after_rebuffer_ms >= profile.buffer_for_playback_ms
            );
        }
    }

    #[test]
    fn test_resolve_unmetered_flag() {
        let policy = BufferPolicy::default();
        assert_eq!(policy.resolve_unmetered(true), BufferProfile::UNMETERED);
        assert_eq!(policy.resolve_unmetered(false), BufferProfile::METERED);
    }

    #[test]
    fn test_inverted_rebuffer_rejected() {
        let profile = BufferProfile {
            buffer_for_playback_after_rebuffer_ms: 1_000,
            ..BufferProfile::UNMETERED
        };
        assert!(matches!(profile.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_min_above_max_rejected() {
        let profile = BufferProfile {
            min_buffer_ms: 70_000,
            ..BufferProfile::METERED
        };
        assert!(profile.validate().is_err());
    }
}
