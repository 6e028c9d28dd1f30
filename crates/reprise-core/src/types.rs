//! Core types for Reprise

use crate::buffer::BufferPolicy;
use crate::cooldown::CooldownConfig;
use crate::quality::QualityPreferences;
use crate::recovery::RecoveryConfig;
use crate::skip::SkipConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quality rank of a video representation. Higher is better.
pub type QualityId = u32;

/// First non-empty URL among a primary URL and its backups
fn first_valid_url<'a>(url: &'a str, backup_urls: &'a [String]) -> Option<&'a str> {
    if !url.is_empty() {
        return Some(url);
    }
    backup_urls
        .iter()
        .map(String::as_str)
        .find(|u| !u.is_empty())
}

/// Host part of an endpoint URL, used to tell CDN endpoints apart in logs
pub fn endpoint_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// An encoded video stream option in the quality ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    /// Quality rank, unique within a representation set
    pub id: QualityId,
    /// Bandwidth in bits per second
    pub bandwidth: u64,
    /// Primary stream URL
    pub url: String,
    /// Alternate CDN endpoints serving the same stream
    #[serde(default)]
    pub backup_urls: Vec<String>,
    /// Codec label (e.g. "avc1", "hev1", "av01")
    #[serde(default)]
    pub codec: Option<String>,
}

impl Representation {
    /// Create a representation without backups
    pub fn new(id: QualityId, bandwidth: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            bandwidth,
            url: url.into(),
            backup_urls: Vec::new(),
            codec: None,
        }
    }

    /// Attach alternate CDN endpoints
    pub fn with_backups<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backup_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the codec label
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    /// The URL to play: the primary URL, or the first usable backup
    pub fn valid_url(&self) -> Option<&str> {
        first_valid_url(&self.url, &self.backup_urls)
    }

    /// Every usable endpoint other than the one `valid_url` returns
    pub fn cdn_alternatives(&self) -> Vec<String> {
        let primary = self.valid_url();
        let mut seen = HashSet::new();
        self.backup_urls
            .iter()
            .filter(|u| !u.is_empty() && Some(u.as_str()) != primary)
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect()
    }
}

/// An encoded audio stream option. Audio has no quality rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRepresentation {
    /// Identifier from the manifest
    pub id: u32,
    /// Bandwidth in bits per second
    pub bandwidth: u64,
    /// Primary stream URL
    pub url: String,
    /// Alternate CDN endpoints
    #[serde(default)]
    pub backup_urls: Vec<String>,
}

impl AudioRepresentation {
    pub fn new(id: u32, bandwidth: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            bandwidth,
            url: url.into(),
            backup_urls: Vec::new(),
        }
    }

    /// The URL to play: the primary URL, or the first usable backup
    pub fn valid_url(&self) -> Option<&str> {
        first_valid_url(&self.url, &self.backup_urls)
    }
}

/// Video and audio representations for one playable item.
///
/// Replaced wholesale whenever the manifest is fetched again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRepresentationSet")]
pub struct RepresentationSet {
    video: Vec<Representation>,
    audio: Vec<AudioRepresentation>,
}

/// Unchecked wire form of [`RepresentationSet`]
#[derive(Deserialize)]
struct RawRepresentationSet {
    #[serde(default)]
    video: Vec<Representation>,
    #[serde(default)]
    audio: Vec<AudioRepresentation>,
}

impl TryFrom<RawRepresentationSet> for RepresentationSet {
    type Error = Error;

    fn try_from(raw: RawRepresentationSet) -> Result<Self> {
        Self::new(raw.video, raw.audio)
    }
}

impl RepresentationSet {
    /// Build a set, rejecting duplicate video ids
    pub fn new(video: Vec<Representation>, audio: Vec<AudioRepresentation>) -> Result<Self> {
        let mut ids = HashSet::with_capacity(video.len());
        for rep in &video {
            if !ids.insert(rep.id) {
                return Err(Error::DuplicateRepresentation { id: rep.id });
            }
        }
        Ok(Self { video, audio })
    }

    /// Empty set (nothing cached yet)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn video(&self) -> &[Representation] {
        &self.video
    }

    pub fn audio(&self) -> &[AudioRepresentation] {
        &self.audio
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_empty()
    }

    /// Available video quality ids, highest first
    pub fn quality_ids(&self) -> Vec<QualityId> {
        let mut ids: Vec<QualityId> = self.video.iter().map(|r| r.id).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }

    /// Look up a video representation by id
    pub fn video_by_id(&self, id: QualityId) -> Option<&Representation> {
        self.video.iter().find(|r| r.id == id)
    }
}

/// What the current user is entitled to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// User is authenticated
    pub logged_in: bool,
    /// User holds a VIP subscription
    pub vip: bool,
}

impl Entitlement {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn member() -> Self {
        Self {
            logged_in: true,
            vip: false,
        }
    }

    pub fn vip() -> Self {
        Self {
            logged_in: true,
            vip: true,
        }
    }
}

/// Network class used for buffer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    /// Unmetered, high bandwidth (Wi-Fi, Ethernet)
    Unmetered,
    /// Metered or cellular
    Metered,
}

impl NetworkClass {
    pub fn from_unmetered(unmetered: bool) -> Self {
        if unmetered {
            NetworkClass::Unmetered
        } else {
            NetworkClass::Metered
        }
    }

    pub fn is_unmetered(&self) -> bool {
        matches!(self, NetworkClass::Unmetered)
    }
}

impl std::fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkClass::Unmetered => write!(f, "unmetered"),
            NetworkClass::Metered => write!(f, "metered"),
        }
    }
}

/// Connection type reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Ethernet,
    Wifi,
    Cellular4G,
    Cellular5G,
    Cellular3G,
    Unknown,
}

impl From<ConnectionType> for NetworkClass {
    fn from(connection: ConnectionType) -> Self {
        match connection {
            ConnectionType::Ethernet | ConnectionType::Wifi => NetworkClass::Unmetered,
            _ => NetworkClass::Metered,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Circuit breaker thresholds and windows
    pub cooldown: CooldownConfig,
    /// Retry and CDN switch budgets
    pub recovery: RecoveryConfig,
    /// Buffer profiles per network class
    pub buffer: BufferPolicy,
    /// Segment skipping behavior
    pub skip: SkipConfig,
    /// User quality preferences
    pub quality: QualityPreferences,
}

impl EngineConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject settings the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        self.cooldown.validate()?;
        self.buffer.validate()?;
        Ok(())
    }
}
