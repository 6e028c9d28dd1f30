//! Playback error classification and recovery policy
//!
//! Decides one action per player error:
//! - Network errors: switch CDN while alternatives and budget remain, then retry
//! - Decoder errors: one retry on a more compatible codec/quality
//! - Anything else: one plain retry
//!
//! Every path is bounded by the per-attempt [`RecoveryBudget`], so recovery
//! always terminates in [`RecoveryAction::GiveUp`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Retries allowed on the non-network paths within one playback attempt
pub const NON_NETWORK_RETRY_LIMIT: u32 = 1;

/// Structured player error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const UNSPECIFIED: ErrorCode = ErrorCode(1000);
    pub const REMOTE_ERROR: ErrorCode = ErrorCode(1001);
    pub const BEHIND_LIVE_WINDOW: ErrorCode = ErrorCode(1002);
    pub const TIMEOUT: ErrorCode = ErrorCode(1003);
    pub const FAILED_RUNTIME_CHECK: ErrorCode = ErrorCode(1004);

    pub const IO_UNSPECIFIED: ErrorCode = ErrorCode(2000);
    pub const IO_NETWORK_CONNECTION_FAILED: ErrorCode = ErrorCode(2001);
    pub const IO_NETWORK_CONNECTION_TIMEOUT: ErrorCode = ErrorCode(2002);
    pub const IO_INVALID_HTTP_CONTENT_TYPE: ErrorCode = ErrorCode(2003);
    pub const IO_BAD_HTTP_STATUS: ErrorCode = ErrorCode(2004);
    pub const IO_FILE_NOT_FOUND: ErrorCode = ErrorCode(2005);

    pub const PARSING_CONTAINER_MALFORMED: ErrorCode = ErrorCode(3001);
    pub const PARSING_MANIFEST_MALFORMED: ErrorCode = ErrorCode(3002);

    pub const DECODER_INIT_FAILED: ErrorCode = ErrorCode(4001);
    pub const DECODER_QUERY_FAILED: ErrorCode = ErrorCode(4002);
    pub const DECODING_FAILED: ErrorCode = ErrorCode(4003);
    pub const DECODING_FORMAT_EXCEEDS_CAPABILITIES: ErrorCode = ErrorCode(4004);
    pub const DECODING_FORMAT_UNSUPPORTED: ErrorCode = ErrorCode(4005);

    /// Transport failures that another attempt or endpoint may fix
    pub fn is_network(&self) -> bool {
        matches!(
            *self,
            ErrorCode::IO_UNSPECIFIED
                | ErrorCode::IO_NETWORK_CONNECTION_FAILED
                | ErrorCode::IO_NETWORK_CONNECTION_TIMEOUT
                | ErrorCode::IO_BAD_HTTP_STATUS
                | ErrorCode::IO_FILE_NOT_FOUND
        )
    }

    /// Failures the decoding pipeline reported directly
    pub fn is_decoder(&self) -> bool {
        matches!(
            *self,
            ErrorCode::DECODER_INIT_FAILED
                | ErrorCode::DECODER_QUERY_FAILED
                | ErrorCode::DECODING_FAILED
                | ErrorCode::DECODING_FORMAT_EXCEEDS_CAPABILITIES
                | ErrorCode::DECODING_FORMAT_UNSUPPORTED
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error as reported by the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackErrorSignal {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: Option<String>,
    /// Type name of the underlying cause, if the player exposes one
    #[serde(default)]
    pub cause_type: Option<String>,
}

impl PlaybackErrorSignal {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            cause_type: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause_type(mut self, cause_type: impl Into<String>) -> Self {
        self.cause_type = Some(cause_type.into());
        self
    }
}

/// Error class driving the recovery decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Network,
    Decoder,
    Unclassified,
}

/// Best-effort text matching for decoder failures that arrive without a
/// decoder error code. Fuzzy by nature; extend the pattern list as new
/// device-specific messages show up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderHeuristics {
    patterns: Vec<String>,
}

impl Default for DecoderHeuristics {
    fn default() -> Self {
        Self {
            patterns: vec!["decoder".into(), "mediacodec".into(), "renderer".into()],
        }
    }
}

impl DecoderHeuristics {
    /// Add a case-insensitive substring pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into().to_lowercase());
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if the message or cause type name mentions a decoder component
    pub fn matches(&self, message: Option<&str>, cause_type: Option<&str>) -> bool {
        let message = message.unwrap_or_default().to_lowercase();
        let cause = cause_type.unwrap_or_default().to_lowercase();
        self.patterns
            .iter()
            .any(|p| message.contains(p.as_str()) || cause.contains(p.as_str()))
    }
}

/// Classifies player errors
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    heuristics: DecoderHeuristics,
}

impl ErrorClassifier {
    pub fn new(heuristics: DecoderHeuristics) -> Self {
        Self { heuristics }
    }

    /// Decoder code, or decoder-looking message/cause
    pub fn is_decoder_like(&self, signal: &PlaybackErrorSignal) -> bool {
        signal.code.is_decoder()
            || self
                .heuristics
                .matches(signal.message.as_deref(), signal.cause_type.as_deref())
    }

    pub fn classify(&self, signal: &PlaybackErrorSignal) -> ErrorClass {
        if signal.code.is_network() {
            ErrorClass::Network
        } else if self.is_decoder_like(signal) {
            ErrorClass::Decoder
        } else {
            ErrorClass::Unclassified
        }
    }
}

/// What the playback controller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Retry against an alternate CDN endpoint
    SwitchCdn,
    /// Retry the same request after a delay
    RetryNetwork,
    /// Retry with a more broadly compatible codec or lower quality
    RetryDecoderFallback,
    /// Reload once for an unclassified error
    RetryNonNetwork,
    /// Stop and report a non-retryable failure
    GiveUp,
}

impl RecoveryAction {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecoveryAction::GiveUp)
    }

    /// Whether executing the action issues a new network request
    pub fn requires_network(&self) -> bool {
        !self.is_terminal()
    }

    pub fn requests_codec_fallback(&self) -> bool {
        matches!(self, RecoveryAction::RetryDecoderFallback)
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryAction::SwitchCdn => write!(f, "switch_cdn"),
            RecoveryAction::RetryNetwork => write!(f, "retry_network"),
            RecoveryAction::RetryDecoderFallback => write!(f, "retry_decoder_fallback"),
            RecoveryAction::RetryNonNetwork => write!(f, "retry_non_network"),
            RecoveryAction::GiveUp => write!(f, "give_up"),
        }
    }
}

/// Retry and CDN switch counters for one playback attempt.
///
/// Counters only grow; a new item gets a fresh budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryBudget {
    pub retry_count: u32,
    pub max_retries: u32,
    pub cdn_switch_count: u32,
    pub max_cdn_switches: u32,
}

impl RecoveryBudget {
    pub fn new(max_retries: u32, max_cdn_switches: u32) -> Self {
        Self {
            retry_count: 0,
            max_retries,
            cdn_switch_count: 0,
            max_cdn_switches,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn can_switch_cdn(&self) -> bool {
        self.cdn_switch_count < self.max_cdn_switches
    }

    /// Non-network paths get a single attempt, capped by the retry budget
    pub fn can_retry_non_network(&self) -> bool {
        self.retry_count < NON_NETWORK_RETRY_LIMIT.min(self.max_retries)
    }

    /// Charge an issued action against the budget
    pub fn record(&mut self, action: RecoveryAction) {
        match action {
            RecoveryAction::SwitchCdn => {
                self.cdn_switch_count = self.cdn_switch_count.saturating_add(1);
            }
            RecoveryAction::RetryNetwork
            | RecoveryAction::RetryDecoderFallback
            | RecoveryAction::RetryNonNetwork => {
                self.retry_count = self.retry_count.saturating_add(1);
            }
            RecoveryAction::GiveUp => {}
        }
    }
}

impl Default for RecoveryBudget {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Pure recovery decision.
///
/// `is_network` and `is_decoder_like` come from an [`ErrorClassifier`].
pub fn decide_recovery(
    is_network: bool,
    has_cdn_alternatives: bool,
    budget: &RecoveryBudget,
    is_decoder_like: bool,
) -> RecoveryAction {
    if is_network {
        if has_cdn_alternatives && budget.can_switch_cdn() {
            RecoveryAction::SwitchCdn
        } else if budget.can_retry() {
            RecoveryAction::RetryNetwork
        } else {
            RecoveryAction::GiveUp
        }
    } else if !budget.can_retry_non_network() {
        RecoveryAction::GiveUp
    } else if is_decoder_like {
        RecoveryAction::RetryDecoderFallback
    } else {
        RecoveryAction::RetryNonNetwork
    }
}

/// Linear delay before a retry: `step * attempt`, capped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDelay {
    pub step_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self {
            step_ms: 2_000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryDelay {
    /// Delay before executing `action` as the `attempt`-th retry (1-based)
    pub fn delay_for(&self, action: RecoveryAction, attempt: u32) -> Duration {
        match action {
            RecoveryAction::RetryNetwork => {
                let ms = self.step_ms.saturating_mul(attempt as u64).min(self.max_delay_ms);
                Duration::from_millis(ms)
            }
            // Endpoint switches and fallbacks go out immediately
            _ => Duration::ZERO,
        }
    }
}

/// Recovery budgets and pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub max_cdn_switches: u32,
    pub retry_delay: RetryDelay,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_cdn_switches: 2,
            retry_delay: RetryDelay::default(),
        }
    }
}

impl RecoveryConfig {
    /// Fresh budget for a new playback attempt
    pub fn budget(&self) -> RecoveryBudget {
        RecoveryBudget::new(self.max_retries, self.max_cdn_switches)
    }
}

/// Classifier plus decision function
#[derive(Debug, Clone, Default)]
pub struct RecoveryPolicy {
    classifier: ErrorClassifier,
}

impl RecoveryPolicy {
    pub fn new(classifier: ErrorClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Decide how to react to a player error
    pub fn decide(
        &self,
        signal: &PlaybackErrorSignal,
        has_cdn_alternatives: bool,
        budget: &RecoveryBudget,
    ) -> RecoveryAction {
        let class = self.classifier.classify(signal);
        let action = decide_recovery(
            class == ErrorClass::Network,
            has_cdn_alternatives,
            budget,
            class == ErrorClass::Decoder,
        );

        debug!(
            code = %signal.code,
            class = ?class,
            retries = budget.retry_count,
            cdn_switches = budget.cdn_switch_count,
            action = %action,
            "Recovery decided"
        );

        action
    }
}
