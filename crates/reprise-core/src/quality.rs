//! Quality Selector
//!
//! Maps a requested quality tier onto the representations a manifest
//! actually offers:
//! - Exact match, else closest downgrade, else closest upgrade
//! - Highest-bandwidth audio
//! - Entitlement gating (login / VIP tiers)
//! - Start-quality resolution from user preferences

use crate::{
    types::{AudioRepresentation, Entitlement, QualityId, Representation, RepresentationSet},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Known quality tiers
pub struct QualityTier;

impl QualityTier {
    pub const Q8K: QualityId = 127;
    pub const DOLBY_VISION: QualityId = 126;
    pub const HDR: QualityId = 125;
    pub const Q4K: QualityId = 120;
    pub const P1080_60: QualityId = 116;
    pub const P1080_PLUS: QualityId = 112;
    pub const P1080: QualityId = 80;
    pub const P720_60: QualityId = 74;
    pub const P720: QualityId = 64;
    pub const P480: QualityId = 32;
    pub const P360: QualityId = 16;

    /// All known tiers, highest first
    pub const LADDER: [QualityId; 11] = [127, 126, 125, 120, 116, 112, 80, 74, 64, 32, 16];

    /// Tiers at or above this need a VIP subscription
    pub const VIP_THRESHOLD: QualityId = Self::P1080_PLUS;
    /// Tiers at or above this need login
    pub const LOGIN_THRESHOLD: QualityId = Self::P1080;
    /// Fallback when nothing else is permitted
    pub const SAFE_BASELINE: QualityId = Self::P720;
}

/// Human-readable label for a quality id
pub fn quality_label(id: QualityId) -> String {
    let label = match id {
        127 => "8K",
        126 => "Dolby Vision",
        125 => "HDR",
        120 => "4K",
        116 => "1080P60",
        112 => "1080P+",
        80 => "1080P",
        74 => "720P60",
        64 => "720P",
        32 => "480P",
        16 => "360P",
        other => return format!("{}P", other),
    };
    label.to_string()
}

/// Outcome of a successful quality change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityDecision {
    /// URL of the chosen video representation
    pub video_url: String,
    /// URL of the chosen audio representation, if any
    pub audio_url: Option<String>,
    /// Quality id actually selected
    pub quality: QualityId,
    /// Selected quality is strictly lower than the request
    pub was_downgraded: bool,
    /// Alternate endpoints for the chosen video stream
    #[serde(default)]
    pub cdn_alternatives: Vec<String>,
}

impl QualityDecision {
    pub fn has_cdn_alternatives(&self) -> bool {
        !self.cdn_alternatives.is_empty()
    }
}

/// Result of checking a tier against the user's entitlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum QualityPermission {
    Permitted,
    RequiresVip { label: String },
    RequiresLogin { label: String },
}

impl QualityPermission {
    pub fn is_permitted(&self) -> bool {
        matches!(self, QualityPermission::Permitted)
    }

    /// Convert a refusal into the matching error
    pub fn into_result(self) -> Result<()> {
        match self {
            QualityPermission::Permitted => Ok(()),
            QualityPermission::RequiresVip { label } => Err(Error::RequiresVip { label }),
            QualityPermission::RequiresLogin { label } => Err(Error::RequiresLogin { label }),
        }
    }
}

/// User quality preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPreferences {
    /// Always ask for the best tier the account can get
    pub auto_highest: bool,
    /// Let logged-in users start at 1080P
    pub auto_1080p: bool,
    /// Explicit start tier chosen by the user
    pub target: Option<QualityId>,
    /// Default tier on unmetered networks
    pub unmetered_quality: QualityId,
    /// Default tier on metered networks
    pub metered_quality: QualityId,
}

impl Default for QualityPreferences {
    fn default() -> Self {
        Self {
            auto_highest: false,
            auto_1080p: true,
            target: None,
            unmetered_quality: QualityTier::P1080,
            metered_quality: QualityTier::P720,
        }
    }
}

/// Quality selection and permission gating.
///
/// Stateless; every method is a pure function of its arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualitySelector;

impl QualitySelector {
    pub fn new() -> Self {
        Self
    }

    /// Pick the video representation closest to `target`.
    ///
    /// Exact match first, then the highest id below the target, then the
    /// lowest id above it.
    pub fn find_best_video<'a>(
        &self,
        target: QualityId,
        videos: &'a [Representation],
    ) -> Option<&'a Representation> {
        if videos.is_empty() {
            return None;
        }

        if let Some(exact) = videos.iter().find(|v| v.id == target) {
            debug!(quality = target, "Exact quality match");
            return Some(exact);
        }

        if let Some(lower) = videos.iter().filter(|v| v.id <= target).max_by_key(|v| v.id) {
            debug!(quality = lower.id, target, "Downgrading quality");
            return Some(lower);
        }

        if let Some(higher) = videos.iter().filter(|v| v.id > target).min_by_key(|v| v.id) {
            debug!(quality = higher.id, target, "Upgrading quality");
            return Some(higher);
        }

        videos.first()
    }

    /// Highest-bandwidth audio representation
    pub fn find_best_audio<'a>(
        &self,
        audios: &'a [AudioRepresentation],
    ) -> Option<&'a AudioRepresentation> {
        audios.iter().max_by_key(|a| a.bandwidth)
    }

    /// Resolve a quality change request against a representation set
    #[instrument(skip(self, set), fields(available = ?set.quality_ids()))]
    pub fn change_quality(
        &self,
        target: QualityId,
        set: &RepresentationSet,
    ) -> Result<QualityDecision> {
        if set.is_empty() {
            return Err(Error::NoCachedData);
        }

        let video = self
            .find_best_video(target, set.video())
            .ok_or(Error::NoMatchingQuality)?;

        let video_url = video
            .valid_url()
            .ok_or(Error::InvalidUrl { quality: video.id })?
            .to_string();

        let audio_url = self
            .find_best_audio(set.audio())
            .and_then(|a| a.valid_url())
            .map(str::to_string);

        let decision = QualityDecision {
            video_url,
            audio_url,
            quality: video.id,
            was_downgraded: video.id < target,
            cdn_alternatives: video.cdn_alternatives(),
        };

        debug!(
            quality = decision.quality,
            was_downgraded = decision.was_downgraded,
            alternatives = decision.cdn_alternatives.len(),
            "Quality resolved"
        );

        Ok(decision)
    }

    pub fn requires_vip(&self, id: QualityId) -> bool {
        id >= QualityTier::VIP_THRESHOLD
    }

    pub fn requires_login(&self, id: QualityId) -> bool {
        id >= QualityTier::LOGIN_THRESHOLD
    }

    /// Check whether the user may play a tier, independent of availability
    pub fn check_permission(&self, id: QualityId, entitlement: Entitlement) -> QualityPermission {
        if self.requires_vip(id) && !entitlement.vip {
            return QualityPermission::RequiresVip {
                label: quality_label(id),
            };
        }
        if self.requires_login(id) && !entitlement.logged_in {
            return QualityPermission::RequiresLogin {
                label: quality_label(id),
            };
        }
        QualityPermission::Permitted
    }

    /// Highest available tier the user is permitted to play
    pub fn max_available_quality(
        &self,
        available: &[QualityId],
        entitlement: Entitlement,
    ) -> QualityId {
        let mut sorted = available.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        sorted
            .into_iter()
            .find(|&id| self.check_permission(id, entitlement).is_permitted())
            .unwrap_or_else(|| {
                debug!(
                    baseline = QualityTier::SAFE_BASELINE,
                    "No permitted quality, using baseline"
                );
                QualityTier::SAFE_BASELINE
            })
    }

    /// Tier to request when a playback starts
    pub fn initial_start_quality(
        &self,
        prefs: &QualityPreferences,
        entitlement: Entitlement,
    ) -> QualityId {
        if prefs.auto_highest {
            return if entitlement.vip {
                QualityTier::Q4K
            } else if entitlement.logged_in {
                QualityTier::P1080
            } else {
                QualityTier::P720
            };
        }

        if let Some(target) = prefs.target {
            return target;
        }

        if entitlement.vip {
            QualityTier::P1080_60
        } else if entitlement.logged_in && prefs.auto_1080p {
            QualityTier::P1080
        } else if entitlement.logged_in {
            QualityTier::P720
        } else {
            QualityTier::P480
        }
    }

    /// Default tier for the current network class
    pub fn network_default_quality(
        &self,
        prefs: &QualityPreferences,
        unmetered: bool,
    ) -> QualityId {
        if prefs.auto_highest {
            // Downgraded to the best available tier at selection time
            return QualityTier::Q8K;
        }
        if unmetered {
            prefs.unmetered_quality
        } else {
            prefs.metered_quality
        }
    }

    /// Qualities to try, in order, when fetching a manifest for `target`
    pub fn dash_attempt_qualities(&self, target: QualityId) -> Vec<QualityId> {
        if target > QualityTier::P1080 {
            vec![target, QualityTier::P1080]
        } else {
            vec![target]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(ids: &[QualityId]) -> RepresentationSet {
        let video = ids
            .iter()
            .map(|&id| {
                Representation::new(
                    id,
                    id as u64 * 25_000,
                    format!("https://cdn.example.com/{}.m4s", id),
                )
            })
            .collect();
        let audio = vec![
            AudioRepresentation::new(30216, 64_000, "https://cdn.example.com/a64.m4s"),
            AudioRepresentation::new(30280, 192_000, "https://cdn.example.com/a192.m4s"),
            AudioRepresentation::new(30232, 132_000, "https://cdn.example.com/a132.m4s"),
        ];
        RepresentationSet::new(video, audio).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let selector = QualitySelector::new();
        let decision = selector.change_quality(80, &ladder(&[120, 80, 64])).unwrap();
        assert_eq!(decision.quality, 80);
        assert!(!decision.was_downgraded);
        assert_eq!(decision.video_url, "https://cdn.example.com/80.m4s");
    }

    #[test]
    fn test_downgrade_from_8k() {
        let selector = QualitySelector::new();
        let decision = selector.change_quality(127, &ladder(&[120, 80, 64])).unwrap();
        assert_eq!(decision.quality, 120);
        assert!(decision.was_downgraded);
    }

    #[test]
    fn test_upgrade_when_nothing_below() {
        let selector = QualitySelector::new();
        let decision = selector.change_quality(64, &ladder(&[120, 80])).unwrap();
        assert_eq!(decision.quality, 80);
        assert!(!decision.was_downgraded);
    }

    #[test]
    fn test_downgrade_prefers_closest_below() {
        let selector = QualitySelector::new();
        let decision = selector.change_quality(100, &ladder(&[16, 64, 80, 116])).unwrap();
        assert_eq!(decision.quality, 80);
    }

    #[test]
    fn test_audio_highest_bandwidth() {
        let selector = QualitySelector::new();
        let decision = selector.change_quality(64, &ladder(&[64])).unwrap();
        assert_eq!(decision.audio_url.as_deref(), Some("https://cdn.example.com/a192.m4s"));
    }

    #[test]
    fn test_no_audio_is_allowed() {
        let selector = QualitySelector::new();
        let set = RepresentationSet::new(vec![Representation::new(64, 1, "https://a/64")], vec![])
            .unwrap();
        let decision = selector.change_quality(64, &set).unwrap();
        assert_eq!(decision.audio_url, None);
    }

    #[test]
    fn test_empty_set_is_no_cached_data() {
        let selector = QualitySelector::new();
        let result = selector.change_quality(80, &RepresentationSet::empty());
        assert!(matches!(result, Err(Error::NoCachedData)));
    }

    #[test]
    fn test_empty_url_is_invalid() {
        let selector = QualitySelector::new();
        let set = RepresentationSet::new(vec![Representation::new(80, 1, "")], vec![]).unwrap();
        let result = selector.change_quality(80, &set);
        assert!(matches!(result, Err(Error::InvalidUrl { quality: 80 })));
    }

    #[test]
    fn test_decision_carries_cdn_alternatives() {
        let selector = QualitySelector::new();
        let set = RepresentationSet::new(
            vec![Representation::new(80, 1, "https://cdn-a/80").with_backups(["https://cdn-b/80"])],
            vec![],
        )
        .unwrap();
        let decision = selector.change_quality(80, &set).unwrap();
        assert!(decision.has_cdn_alternatives());
        assert_eq!(decision.cdn_alternatives, vec!["https://cdn-b/80".to_string()]);
    }

    #[test]
    fn test_permission_gating() {
        let selector = QualitySelector::new();
        assert_eq!(
            selector.check_permission(120, Entitlement::member()),
            QualityPermission::RequiresVip { label: "4K".into() }
        );
        assert_eq!(
            selector.check_permission(80, Entitlement::guest()),
            QualityPermission::RequiresLogin { label: "1080P".into() }
        );
        assert!(selector.check_permission(64, Entitlement::guest()).is_permitted());
        assert!(selector.check_permission(127, Entitlement::vip()).is_permitted());
    }

    #[test]
    fn test_vip_check_precedes_login_check() {
        let selector = QualitySelector::new();
        assert!(matches!(
            selector.check_permission(112, Entitlement::guest()),
            QualityPermission::RequiresVip { .. }
        ));
    }

    #[test]
    fn test_max_available_quality() {
        let selector = QualitySelector::new();
        let available = [64, 120, 80, 32];
        assert_eq!(selector.max_available_quality(&available, Entitlement::vip()), 120);
        assert_eq!(selector.max_available_quality(&available, Entitlement::member()), 80);
        assert_eq!(selector.max_available_quality(&available, Entitlement::guest()), 64);
        assert_eq!(selector.max_available_quality(&[], Entitlement::guest()), 64);
        assert_eq!(selector.max_available_quality(&[116, 80], Entitlement::guest()), 64);
    }

    #[test]
    fn test_initial_start_quality() {
        let selector = QualitySelector::new();
        let auto = QualityPreferences {
            auto_highest: true,
            ..Default::default()
        };
        assert_eq!(selector.initial_start_quality(&auto, Entitlement::vip()), 120);
        assert_eq!(selector.initial_start_quality(&auto, Entitlement::member()), 80);
        assert_eq!(selector.initial_start_quality(&auto, Entitlement::guest()), 64);

        let explicit = QualityPreferences {
            target: Some(74),
            ..Default::default()
        };
        assert_eq!(selector.initial_start_quality(&explicit, Entitlement::vip()), 74);

        let defaults = QualityPreferences::default();
        assert_eq!(selector.initial_start_quality(&defaults, Entitlement::vip()), 116);
        assert_eq!(selector.initial_start_quality(&defaults, Entitlement::member()), 80);
        assert_eq!(selector.initial_start_quality(&defaults, Entitlement::guest()), 32);

        let no_1080 = QualityPreferences {
            auto_1080p: false,
            ..Default::default()
        };
        assert_eq!(selector.initial_start_quality(&no_1080, Entitlement::member()), 64);
    }

    #[test]
    fn test_network_default_quality() {
        let selector = QualitySelector::new();
        let prefs = QualityPreferences::default();
        assert_eq!(selector.network_default_quality(&prefs, true), 80);
        assert_eq!(selector.network_default_quality(&prefs, false), 64);

        let auto = QualityPreferences {
            auto_highest: true,
            ..Default::default()
        };
        assert_eq!(selector.network_default_quality(&auto, false), 127);
    }

    #[test]
    fn test_dash_attempt_qualities() {
        let selector = QualitySelector::new();
        assert_eq!(selector.dash_attempt_qualities(116), vec![116, 80]);
        assert_eq!(selector.dash_attempt_qualities(80), vec![80]);
        assert_eq!(selector.dash_attempt_qualities(32), vec![32]);
    }

    #[test]
    fn test_quality_labels() {
        assert_eq!(quality_label(127), "8K");
        assert_eq!(quality_label(74), "720P60");
        assert_eq!(quality_label(6), "6P");
    }
}
