//! Reprise Core - Playback resilience engine
//!
//! This crate provides the decision logic behind a streaming player:
//! - Quality selection and entitlement checks over a representation ladder
//! - Buffer profiles per network class
//! - Two-tier cooldown (per-item and global circuit breaker)
//! - Error classification and budgeted recovery with CDN rotation
//! - Segment skipping driven by the play-head position
//! - Cancellable refetch scheduling and engine event emission
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Reprise Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Quality    │  │   Recovery   │  │    Buffer    │           │
//! │  │   Selector   │  │    Policy    │  │    Policy    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │   Session   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Cooldown   │  │    Retry    │  │     Skip     │            │
//! │  │   Manager    │  │  Scheduler  │  │ Coordinator  │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! │                    ┌─────────────┐                              │
//! │                    │    Event    │                              │
//! │                    │   Emitter   │                              │
//! │                    └─────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cooldown manager is shared between sessions behind an `Arc`; every
//! other component is owned by a single [`PlaybackSession`].

pub mod error;
pub mod types;
pub mod clock;
pub mod quality;
pub mod buffer;
pub mod cooldown;
pub mod recovery;
pub mod skip;
pub mod retry;
pub mod events;
pub mod session;

pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use quality::{
    quality_label, QualityDecision, QualityPermission, QualityPreferences, QualitySelector,
    QualityTier,
};
pub use buffer::{BufferPolicy, BufferProfile};
pub use cooldown::{CooldownConfig, CooldownManager, CooldownStatus};
pub use recovery::{
    decide_recovery, ErrorClass, ErrorClassifier, ErrorCode, PlaybackErrorSignal, RecoveryAction,
    RecoveryBudget, RecoveryConfig, RecoveryPolicy, RetryDelay,
};
pub use skip::{SkipConfig, SkipCoordinator, SkipInterval, SkipOutcome};
pub use retry::{RepresentationSource, RetryOutcome, RetryScheduler, RetryTicket};
pub use events::{EngineEvent, EngineEventRecord, EventEmitter};
pub use session::{PlaybackSession, RecoveryPlan, SessionState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine library
pub fn init() {
    tracing::info!(version = VERSION, "Reprise Core initialized");
}
