//! Engine event emission
//!
//! Surfaces decisions to UI collaborators:
//! - Quality decisions and permission refusals
//! - Recovery actions, CDN switches and terminal failures
//! - Cooldown refusals (countdown rendering)
//! - Skip candidates and executed skips
//! - Buffer profile changes

use crate::{
    buffer::BufferProfile,
    cooldown::CooldownStatus,
    recovery::{ErrorCode, RecoveryAction},
    types::{NetworkClass, QualityId, SessionId},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Engine event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A representation was chosen
    QualityDecided {
        item_key: String,
        requested: QualityId,
        quality: QualityId,
        was_downgraded: bool,
    },

    /// Requested tier is blocked by entitlement
    PermissionDenied {
        quality: QualityId,
        reason: String,
    },

    /// Cooldown refused a new attempt
    AdmissionRefused {
        item_key: String,
        status: CooldownStatus,
    },

    /// Recovery action issued for a player error
    RecoveryDecided {
        item_key: String,
        code: ErrorCode,
        action: RecoveryAction,
        retry_count: u32,
        cdn_switch_count: u32,
    },

    /// Playback moved to an alternate endpoint
    CdnSwitched {
        from_host: Option<String>,
        to_host: Option<String>,
    },

    /// Recovery exhausted; shown to the user
    GaveUp {
        item_key: String,
        code: ErrorCode,
    },

    /// Playback reached ready state
    PlaybackReady {
        item_key: String,
        quality: Option<QualityId>,
    },

    /// Buffering reconfigured
    BufferProfileChanged {
        network: NetworkClass,
        profile: BufferProfile,
    },

    /// Skip affordance should be shown
    SkipCandidate {
        interval_id: String,
        label: String,
        seek_to_ms: u64,
    },

    /// Skip affordance should be hidden
    SkipCandidateCleared {
        interval_id: String,
    },

    /// Player seeked past an interval
    SkipExecuted {
        interval_id: String,
        seek_to_ms: u64,
        automatic: bool,
    },

    /// User dismissed the skip affordance
    SkipDismissed {
        interval_id: String,
    },
}

/// Engine event with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEventRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Session ID
    pub session_id: SessionId,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number within the session
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: EngineEvent,
}

struct EmitterState {
    sequence: u64,
    recent: VecDeque<EngineEventRecord>,
}

/// Event emitter.
///
/// Keeps the most recent records for inspection and forwards every record to
/// an optional channel. Emitting never blocks.
pub struct EventEmitter {
    session_id: SessionId,
    state: Mutex<EmitterState>,
    max_recent: usize,
    event_tx: Option<mpsc::UnboundedSender<EngineEventRecord>>,
}

impl EventEmitter {
    /// Create an emitter without a subscriber
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: Mutex::new(EmitterState {
                sequence: 0,
                recent: VecDeque::new(),
            }),
            max_recent: 100,
            event_tx: None,
        }
    }

    /// Create an emitter plus the receiving end of its event channel
    pub fn with_channel(
        session_id: SessionId,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEventRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut emitter = Self::new(session_id);
        emitter.event_tx = Some(tx);
        (emitter, rx)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Emit an event
    pub fn emit(&self, event: EngineEvent) {
        let record = {
            let mut state = self.state.lock();
            state.sequence += 1;

            let record = EngineEventRecord {
                id: Uuid::new_v4(),
                session_id: self.session_id,
                timestamp: Utc::now(),
                sequence: state.sequence,
                event,
            };

            if state.recent.len() >= self.max_recent {
                state.recent.pop_front();
            }
            state.recent.push_back(record.clone());
            record
        };

        debug!(sequence = record.sequence, event = ?record.event, "Engine event");

        if let Some(tx) = &self.event_tx {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(record);
        }
    }

    /// Recent events, oldest first
    pub fn recent(&self) -> Vec<EngineEventRecord> {
        self.state.lock().recent.iter().cloned().collect()
    }

    /// Take and clear the recent events
    pub fn drain(&self) -> Vec<EngineEventRecord> {
        self.state.lock().recent.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_increments() {
        let emitter = EventEmitter::new(SessionId::new());
        emitter.emit(EngineEvent::SkipDismissed { interval_id: "a".into() });
        emitter.emit(EngineEvent::SkipDismissed { interval_id: "b".into() });

        let events = emitter.recent();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[1].session_id, emitter.session_id());
    }

    #[test]
    fn test_recent_is_bounded() {
        let emitter = EventEmitter::new(SessionId::new());
        for i in 0..150 {
            emitter.emit(EngineEvent::SkipCandidateCleared {
                interval_id: i.to_string(),
            });
        }
        let events = emitter.recent();
        assert_eq!(events.len(), 100);
        assert_eq!(events[0].sequence, 51);
    }

    #[tokio::test]
    async fn test_channel_delivery() {
        let (emitter, mut rx) = EventEmitter::with_channel(SessionId::new());
        emitter.emit(EngineEvent::GaveUp {
            item_key: "BV1".into(),
            code: ErrorCode::IO_BAD_HTTP_STATUS,
        });

        let record = rx.recv().await.unwrap();
        assert!(matches!(record.event, EngineEvent::GaveUp { .. }));
        assert!(emitter.drain().len() == 1);
        assert!(emitter.recent().is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let record = EngineEventRecord {
            id: Uuid::nil(),
            session_id: SessionId(Uuid::nil()),
            timestamp: Utc::now(),
            sequence: 7,
            event: EngineEvent::SkipExecuted {
                interval_id: "sp-1".into(),
                seek_to_ms: 40_000,
                automatic: true,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "skip_executed");
        assert_eq!(json["seek_to_ms"], 40_000);
        assert_eq!(json["sequence"], 7);
    }
}
