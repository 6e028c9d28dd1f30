//! Playback Session - per-player orchestrator
//!
//! Coordinates:
//! - Cooldown admission before a load
//! - Quality selection against the current representation set
//! - Error recovery with CDN rotation and budgeted retries
//! - Segment skipping from the position feed
//! - Buffer profile changes on network-class transitions
//! - Engine events

use crate::{
    buffer::BufferProfile,
    cooldown::{CooldownManager, CooldownStatus},
    events::{EngineEvent, EngineEventRecord, EventEmitter},
    quality::{QualityDecision, QualitySelector},
    recovery::{PlaybackErrorSignal, RecoveryAction, RecoveryBudget, RecoveryPolicy},
    retry::{fetch_first_available, RepresentationSource, RetryScheduler, RetryTicket},
    skip::{SkipCoordinator, SkipInterval, SkipOutcome},
    types::*,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Loading,
    Playing,
    Recovering,
    CoolingDown,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Loading => write!(f, "loading"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Recovering => write!(f, "recovering"),
            SessionState::CoolingDown => write!(f, "cooling_down"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// What the player should do in response to an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub action: RecoveryAction,
    /// Wait before executing the action
    pub delay_ms: u64,
    /// Endpoint to switch to (`SwitchCdn`)
    pub endpoint: Option<String>,
    /// Lower-tier decision to fall back to (`RetryDecoderFallback`)
    pub fallback: Option<QualityDecision>,
    /// Set when an active cooldown suppressed a network attempt
    pub blocked_by: Option<CooldownStatus>,
    pub retry_count: u32,
    pub cdn_switch_count: u32,
}

impl RecoveryPlan {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn is_terminal(&self) -> bool {
        self.action.is_terminal()
    }

    /// User-visible error for a terminal plan
    pub fn terminal_error(&self) -> Option<Error> {
        if !self.is_terminal() {
            return None;
        }
        Some(match &self.blocked_by {
            Some(status) => Error::CoolingDown(status.clone()),
            None => Error::GaveUp {
                retries: self.retry_count,
                cdn_switches: self.cdn_switch_count,
            },
        })
    }
}

/// Playback session for a single player
pub struct PlaybackSession {
    /// Unique session ID
    id: SessionId,
    config: EngineConfig,
    entitlement: Entitlement,
    selector: QualitySelector,
    policy: RecoveryPolicy,
    /// Shared across sessions
    cooldown: Arc<CooldownManager>,
    state_tx: watch::Sender<SessionState>,
    item_key: Option<String>,
    representations: RepresentationSet,
    /// Quality asked for by the start or the user, before downgrading
    requested_quality: Option<QualityId>,
    decision: Option<QualityDecision>,
    /// Endpoints already used for the current decision
    tried_endpoints: Vec<String>,
    budget: RecoveryBudget,
    skip: SkipCoordinator,
    network: Option<NetworkClass>,
    buffer_profile: Option<BufferProfile>,
    scheduler: RetryScheduler,
    events: EventEmitter,
}

impl PlaybackSession {
    /// Create a new playback session
    pub fn new(
        config: EngineConfig,
        cooldown: Arc<CooldownManager>,
        entitlement: Entitlement,
    ) -> Self {
        let id = SessionId::new();
        Self::build(id, config, cooldown, entitlement, EventEmitter::new(id))
    }

    /// Create a session whose events are also delivered on a channel
    pub fn with_event_channel(
        config: EngineConfig,
        cooldown: Arc<CooldownManager>,
        entitlement: Entitlement,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEventRecord>) {
        let id = SessionId::new();
        let (events, rx) = EventEmitter::with_channel(id);
        (Self::build(id, config, cooldown, entitlement, events), rx)
    }

    fn build(
        id: SessionId,
        config: EngineConfig,
        cooldown: Arc<CooldownManager>,
        entitlement: Entitlement,
        events: EventEmitter,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);

        Self {
            id,
            entitlement,
            selector: QualitySelector::new(),
            policy: RecoveryPolicy::default(),
            cooldown,
            state_tx,
            item_key: None,
            representations: RepresentationSet::empty(),
            requested_quality: None,
            decision: None,
            tried_endpoints: Vec::new(),
            budget: config.recovery.budget(),
            skip: SkipCoordinator::new(config.skip.clone()),
            network: None,
            buffer_profile: None,
            scheduler: RetryScheduler::new(),
            events,
            config,
        }
    }

    /// Replace the recovery policy (custom decoder heuristics)
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn item_key(&self) -> Option<&str> {
        self.item_key.as_deref()
    }

    pub fn decision(&self) -> Option<&QualityDecision> {
        self.decision.as_ref()
    }

    /// Endpoint the player should currently be using
    pub fn active_endpoint(&self) -> Option<&str> {
        self.tried_endpoints.last().map(String::as_str)
    }

    pub fn representations(&self) -> &RepresentationSet {
        &self.representations
    }

    pub fn budget(&self) -> &RecoveryBudget {
        &self.budget
    }

    pub fn buffer_profile(&self) -> Option<BufferProfile> {
        self.buffer_profile
    }

    pub fn skip(&self) -> &SkipCoordinator {
        &self.skip
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn entitlement(&self) -> Entitlement {
        self.entitlement
    }

    /// Update login/VIP status (takes effect on the next quality decision)
    pub fn set_entitlement(&mut self, entitlement: Entitlement) {
        self.entitlement = entitlement;
    }

    fn set_state(&self, new_state: SessionState) {
        let previous = self.state_tx.send_replace(new_state);
        if previous != new_state {
            info!(session_id = %self.id, from = %previous, to = %new_state, "State transition");
        }
    }

    /// Start playing `item_key` from a freshly fetched representation set.
    ///
    /// Refused with [`Error::CoolingDown`] while the item or the whole
    /// engine is cooling down.
    #[instrument(skip(self, representations), fields(session_id = %self.id))]
    pub fn start(
        &mut self,
        item_key: &str,
        representations: RepresentationSet,
    ) -> Result<QualityDecision> {
        if let Err(e) = self.cooldown.admit(item_key) {
            if let Error::CoolingDown(status) = &e {
                info!(item = %item_key, status = %status, "Start refused by cooldown");
                self.events.emit(EngineEvent::AdmissionRefused {
                    item_key: item_key.to_string(),
                    status: status.clone(),
                });
                self.set_state(SessionState::CoolingDown);
            }
            return Err(e);
        }

        if self.item_key.as_deref() != Some(item_key) {
            debug!(item = %item_key, "New item");
            self.scheduler.cancel();
            self.skip.change_item(item_key);
            self.item_key = Some(item_key.to_string());
        }
        self.budget = self.config.recovery.budget();
        self.representations = representations;

        let preferred = self
            .selector
            .initial_start_quality(&self.config.quality, self.entitlement);
        let target = if self
            .selector
            .check_permission(preferred, self.entitlement)
            .is_permitted()
        {
            preferred
        } else {
            self.selector
                .max_available_quality(&self.representations.quality_ids(), self.entitlement)
        };

        self.set_state(SessionState::Loading);
        self.requested_quality = Some(target);
        self.resolve(target)
    }

    /// User-initiated quality change
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn change_quality(&mut self, target: QualityId) -> Result<QualityDecision> {
        if let Err(err) = self
            .selector
            .check_permission(target, self.entitlement)
            .into_result()
        {
            info!(quality = target, reason = %err, "Quality change refused");
            self.events.emit(EngineEvent::PermissionDenied {
                quality: target,
                reason: err.to_string(),
            });
            return Err(err);
        }

        self.requested_quality = Some(target);
        self.resolve(target)
    }

    fn resolve(&mut self, target: QualityId) -> Result<QualityDecision> {
        let decision = self.selector.change_quality(target, &self.representations)?;
        self.adopt(target, decision.clone());
        Ok(decision)
    }

    fn adopt(&mut self, requested: QualityId, decision: QualityDecision) {
        self.events.emit(EngineEvent::QualityDecided {
            item_key: self.item_key.clone().unwrap_or_default(),
            requested,
            quality: decision.quality,
            was_downgraded: decision.quality < requested,
        });
        self.tried_endpoints = vec![decision.video_url.clone()];
        self.decision = Some(decision);
    }

    /// Alternate endpoints not yet used for the current decision
    fn remaining_alternatives(&self) -> Vec<String> {
        self.decision
            .as_ref()
            .map(|d| {
                d.cdn_alternatives
                    .iter()
                    .filter(|url| !self.tried_endpoints.contains(url))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Player reached ready state
    pub fn on_playback_ready(&mut self) {
        self.cooldown.record_success();
        self.set_state(SessionState::Playing);
        self.events.emit(EngineEvent::PlaybackReady {
            item_key: self.item_key.clone().unwrap_or_default(),
            quality: self.decision.as_ref().map(|d| d.quality),
        });
    }

    /// Decide how to react to a player error and charge the budget
    #[instrument(skip(self, signal), fields(session_id = %self.id, code = %signal.code))]
    pub fn on_error(&mut self, signal: &PlaybackErrorSignal) -> Result<RecoveryPlan> {
        let item_key = self.item_key.clone().ok_or(Error::NoCachedData)?;
        let alternatives = self.remaining_alternatives();

        let mut action = self.policy.decide(signal, !alternatives.is_empty(), &self.budget);
        let mut blocked_by = None;

        if action.requires_network() {
            let status = self.cooldown.cooldown_status(&item_key);
            if !status.is_ready() {
                warn!(item = %item_key, status = %status, "Cooldown suppressed recovery attempt");
                blocked_by = Some(status);
                action = RecoveryAction::GiveUp;
            }
        }

        self.budget.record(action);
        self.events.emit(EngineEvent::RecoveryDecided {
            item_key: item_key.clone(),
            code: signal.code,
            action,
            retry_count: self.budget.retry_count,
            cdn_switch_count: self.budget.cdn_switch_count,
        });

        let mut plan = RecoveryPlan {
            action,
            delay_ms: 0,
            endpoint: None,
            fallback: None,
            blocked_by,
            retry_count: self.budget.retry_count,
            cdn_switch_count: self.budget.cdn_switch_count,
        };

        match action {
            RecoveryAction::SwitchCdn => {
                if let Some(next) = alternatives.into_iter().next() {
                    self.events.emit(EngineEvent::CdnSwitched {
                        from_host: self.active_endpoint().and_then(endpoint_host),
                        to_host: endpoint_host(&next),
                    });
                    info!(endpoint = %next, "Switching CDN");
                    self.tried_endpoints.push(next.clone());
                    plan.endpoint = Some(next);
                }
                self.set_state(SessionState::Recovering);
            }
            RecoveryAction::RetryNetwork => {
                let delay = self
                    .config
                    .recovery
                    .retry_delay
                    .delay_for(action, self.budget.retry_count);
                plan.delay_ms = delay.as_millis() as u64;
                plan.endpoint = self.active_endpoint().map(str::to_string);
                self.set_state(SessionState::Recovering);
            }
            RecoveryAction::RetryDecoderFallback => {
                plan.fallback = self.fallback_decision();
                if let Some(fallback) = &plan.fallback {
                    let requested = self.requested_quality.unwrap_or(fallback.quality);
                    self.adopt(requested, fallback.clone());
                    // Later refetches must not climb back to the failed tier
                    self.requested_quality = Some(fallback.quality);
                }
                self.set_state(SessionState::Recovering);
            }
            RecoveryAction::RetryNonNetwork => {
                plan.endpoint = self.active_endpoint().map(str::to_string);
                self.set_state(SessionState::Recovering);
            }
            RecoveryAction::GiveUp => {
                if plan.blocked_by.is_none() {
                    let reason = signal
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("error code {}", signal.code));
                    self.cooldown.record_failure(&item_key, &reason);
                    self.set_state(SessionState::Failed);
                } else {
                    self.set_state(SessionState::CoolingDown);
                }
                self.scheduler.cancel();
                self.events.emit(EngineEvent::GaveUp {
                    item_key,
                    code: signal.code,
                });
            }
        }

        Ok(plan)
    }

    /// Highest available tier strictly below the current one
    fn fallback_decision(&self) -> Option<QualityDecision> {
        let current = self.decision.as_ref()?.quality;
        let lower = self
            .representations
            .quality_ids()
            .into_iter()
            .find(|&id| id < current)?;
        self.selector.change_quality(lower, &self.representations).ok()
    }

    /// Schedule a representation refetch for the current item.
    ///
    /// The returned ticket resolves to [`RetryOutcome::Superseded`](crate::retry::RetryOutcome)
    /// if another refetch is scheduled or the session moves on first.
    pub fn schedule_refetch(
        &self,
        source: Arc<dyn RepresentationSource>,
        delay: Duration,
    ) -> Result<RetryTicket<Result<RepresentationSet>>> {
        let item_key = self.item_key.clone().ok_or(Error::NoCachedData)?;
        let target = self
            .requested_quality
            .or_else(|| self.decision.as_ref().map(|d| d.quality))
            .unwrap_or_else(|| {
                self.selector
                    .initial_start_quality(&self.config.quality, self.entitlement)
            });
        let qualities = self.selector.dash_attempt_qualities(target);

        debug!(
            item = %item_key,
            ?qualities,
            delay_ms = delay.as_millis() as u64,
            "Scheduling refetch"
        );

        Ok(self.scheduler.schedule(delay, async move {
            fetch_first_available(source.as_ref(), &item_key, &qualities).await
        }))
    }

    /// Install a refetched representation set if its request is still current
    pub fn apply_refetch(
        &mut self,
        generation: u64,
        representations: RepresentationSet,
    ) -> Result<QualityDecision> {
        if !self.scheduler.is_current(generation) {
            debug!(generation, current = self.scheduler.generation(), "Stale refetch discarded");
            return Err(Error::Superseded {
                current: self.scheduler.generation(),
            });
        }

        self.representations = representations;
        let target = self.requested_quality.unwrap_or_else(|| {
            self.selector
                .max_available_quality(&self.representations.quality_ids(), self.entitlement)
        });
        self.resolve(target)
    }

    /// Refetch after the plan's delay and re-resolve the quality
    #[instrument(skip(self, source, plan), fields(session_id = %self.id, action = %plan.action))]
    pub async fn refetch(
        &mut self,
        source: Arc<dyn RepresentationSource>,
        plan: &RecoveryPlan,
    ) -> Result<QualityDecision> {
        if let Some(err) = plan.terminal_error() {
            return Err(err);
        }

        let ticket = self.schedule_refetch(source, plan.delay())?;
        let generation = ticket.generation();
        let representations = ticket.outcome().await.into_result()??;
        self.apply_refetch(generation, representations)
    }

    /// Replace the skip intervals for the current item
    pub fn load_skip_intervals(&mut self, intervals: Vec<SkipInterval>) -> Result<()> {
        let item_key = self.item_key.clone().ok_or(Error::NoCachedData)?;
        self.skip.load_intervals(&item_key, intervals);
        Ok(())
    }

    /// Feed a play-head position
    pub fn on_position(&mut self, position_ms: u64) -> SkipOutcome {
        let outcome = self.skip.on_position(position_ms);

        match &outcome {
            SkipOutcome::SkipTo { interval, seek_to_ms } => {
                self.events.emit(EngineEvent::SkipExecuted {
                    interval_id: interval.id.clone(),
                    seek_to_ms: *seek_to_ms,
                    automatic: true,
                });
            }
            SkipOutcome::ShowPrompt { interval } => {
                self.events.emit(EngineEvent::SkipCandidate {
                    interval_id: interval.id.clone(),
                    label: interval.label(),
                    seek_to_ms: interval.end_ms,
                });
            }
            SkipOutcome::CandidateCleared { interval_id } => {
                self.events.emit(EngineEvent::SkipCandidateCleared {
                    interval_id: interval_id.clone(),
                });
            }
            SkipOutcome::None => {}
        }

        outcome
    }

    /// User accepted the skip prompt
    pub fn skip_current(&mut self) -> Option<SkipOutcome> {
        let outcome = self.skip.skip_current()?;
        if let SkipOutcome::SkipTo { interval, seek_to_ms } = &outcome {
            self.events.emit(EngineEvent::SkipExecuted {
                interval_id: interval.id.clone(),
                seek_to_ms: *seek_to_ms,
                automatic: false,
            });
        }
        Some(outcome)
    }

    /// User dismissed the skip prompt
    pub fn dismiss_skip(&mut self) -> Option<SkipInterval> {
        let interval = self.skip.dismiss_current()?;
        self.events.emit(EngineEvent::SkipDismissed {
            interval_id: interval.id.clone(),
        });
        Some(interval)
    }

    /// Network class observed; returns the new profile when it changed
    pub fn on_network_change(&mut self, network: NetworkClass) -> Option<BufferProfile> {
        if self.network == Some(network) {
            return None;
        }

        let profile = self.config.buffer.resolve(network);
        info!(network = %network, min_buffer_ms = profile.min_buffer_ms, "Buffer profile changed");

        self.network = Some(network);
        self.buffer_profile = Some(profile);
        self.events.emit(EngineEvent::BufferProfileChanged { network, profile });
        Some(profile)
    }

    /// Stop playback and abandon any scheduled refetch
    pub fn stop(&mut self) {
        self.scheduler.cancel();
        self.set_state(SessionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        cooldown::CooldownConfig,
        recovery::ErrorCode,
        types::{AudioRepresentation, Representation},
    };
    use async_trait::async_trait;

    fn ladder() -> RepresentationSet {
        RepresentationSet::new(
            vec![
                Representation::new(80, 3_000_000, "https://cdn-a.example.com/80.m4s")
                    .with_backups([
                        "https://cdn-b.example.com/80.m4s",
                        "https://cdn-c.example.com/80.m4s",
                    ]),
                Representation::new(64, 1_500_000, "https://cdn-a.example.com/64.m4s"),
                Representation::new(32, 800_000, "https://cdn-a.example.com/32.m4s"),
            ],
            vec![AudioRepresentation::new(30280, 192_000, "https://cdn-a.example.com/a.m4s")],
        )
        .unwrap()
    }

    fn session() -> PlaybackSession {
        PlaybackSession::new(
            EngineConfig::default(),
            Arc::new(CooldownManager::default()),
            Entitlement::member(),
        )
    }

    struct StaticSource(RepresentationSet);

    #[async_trait]
    impl RepresentationSource for StaticSource {
        async fn fetch(&self, _item_key: &str, _quality: QualityId) -> Result<RepresentationSet> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_start_selects_member_default() {
        let mut s = session();
        let decision = s.start("BV1", ladder()).unwrap();
        assert_eq!(decision.quality, 80);
        assert_eq!(decision.audio_url.as_deref(), Some("https://cdn-a.example.com/a.m4s"));
        assert_eq!(s.state(), SessionState::Loading);
        assert_eq!(s.active_endpoint(), Some("https://cdn-a.example.com/80.m4s"));
    }

    #[test]
    fn test_change_quality_refused_without_vip() {
        let mut s = session();
        s.start("BV1", ladder()).unwrap();
        let err = s.change_quality(116).unwrap_err();
        assert!(matches!(err, Error::RequiresVip { .. }));
        assert!(err.is_user_visible());
        assert_eq!(s.decision().unwrap().quality, 80);
    }

    #[test]
    fn test_network_errors_rotate_cdns_then_retry() {
        let mut s = session();
        s.start("BV1", ladder()).unwrap();
        let signal = PlaybackErrorSignal::new(ErrorCode::IO_NETWORK_CONNECTION_FAILED);

        let first = s.on_error(&signal).unwrap();
        assert_eq!(first.action, RecoveryAction::SwitchCdn);
        assert_eq!(first.endpoint.as_deref(), Some("https://cdn-b.example.com/80.m4s"));

        let second = s.on_error(&signal).unwrap();
        assert_eq!(second.endpoint.as_deref(), Some("https://cdn-c.example.com/80.m4s"));

        let third = s.on_error(&signal).unwrap();
        assert_eq!(third.action, RecoveryAction::RetryNetwork);
        assert_eq!(third.delay(), Duration::from_secs(2));
        assert_eq!(s.state(), SessionState::Recovering);
    }

    #[test]
    fn test_give_up_records_failure() {
        let cooldown = Arc::new(CooldownManager::default());
        let mut s = PlaybackSession::new(
            EngineConfig::default(),
            Arc::clone(&cooldown),
            Entitlement::guest(),
        );
        s.start("BV1", ladder()).unwrap();

        let signal = PlaybackErrorSignal::new(ErrorCode::UNSPECIFIED);
        assert_eq!(s.on_error(&signal).unwrap().action, RecoveryAction::RetryNonNetwork);

        let plan = s.on_error(&signal).unwrap();
        assert!(plan.is_terminal());
        assert!(matches!(plan.terminal_error(), Some(Error::GaveUp { retries: 1, .. })));
        assert_eq!(s.state(), SessionState::Failed);
        assert!(cooldown.is_cooling_down("BV1"));

        assert!(matches!(s.start("BV1", ladder()), Err(Error::CoolingDown(_))));
        assert_eq!(s.state(), SessionState::CoolingDown);
    }

    #[test]
    fn test_global_cooldown_suppresses_recovery() {
        let clock = Arc::new(ManualClock::starting_now());
        let cooldown = Arc::new(CooldownManager::with_clock(CooldownConfig::default(), clock));
        let mut s = PlaybackSession::new(
            EngineConfig::default(),
            Arc::clone(&cooldown),
            Entitlement::member(),
        );
        s.start("BV1", ladder()).unwrap();

        for key in ["A", "B", "C"] {
            cooldown.record_failure(key, "timeout");
        }

        let plan = s
            .on_error(&PlaybackErrorSignal::new(ErrorCode::IO_BAD_HTTP_STATUS))
            .unwrap();
        assert_eq!(plan.action, RecoveryAction::GiveUp);
        assert!(matches!(plan.blocked_by, Some(CooldownStatus::GlobalCooldown { .. })));
        assert!(matches!(plan.terminal_error(), Some(Error::CoolingDown(_))));
        // Suppressed attempts are not charged as failures
        assert_eq!(cooldown.consecutive_failures(), 3);
    }

    #[test]
    fn test_decoder_fallback_steps_down() {
        let mut s = session();
        s.start("BV1", ladder()).unwrap();
        let plan = s
            .on_error(&PlaybackErrorSignal::new(ErrorCode::DECODER_INIT_FAILED))
            .unwrap();
        assert_eq!(plan.action, RecoveryAction::RetryDecoderFallback);
        assert_eq!(plan.fallback.as_ref().map(|d| d.quality), Some(64));
        assert_eq!(s.decision().unwrap().quality, 64);

        let decided = s
            .events()
            .recent()
            .into_iter()
            .rev()
            .find_map(|r| match r.event {
                EngineEvent::QualityDecided {
                    requested,
                    quality,
                    was_downgraded,
                    ..
                } => Some((requested, quality, was_downgraded)),
                _ => None,
            });
        assert_eq!(decided, Some((80, 64, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_fallback_survives_refetch() {
        let mut s = session();
        s.start("BV1", ladder()).unwrap();
        let plan = s
            .on_error(&PlaybackErrorSignal::new(ErrorCode::DECODER_INIT_FAILED))
            .unwrap();
        assert_eq!(s.decision().unwrap().quality, 64);

        let source: Arc<dyn RepresentationSource> = Arc::new(StaticSource(ladder()));
        let decision = s.refetch(source, &plan).await.unwrap();
        assert_eq!(decision.quality, 64);
        assert_eq!(s.active_endpoint(), Some("https://cdn-a.example.com/64.m4s"));
    }

    #[test]
    fn test_playback_ready_resets_streak() {
        let cooldown = Arc::new(CooldownManager::default());
        cooldown.record_failure("other", "timeout");
        let mut s = PlaybackSession::new(
            EngineConfig::default(),
            Arc::clone(&cooldown),
            Entitlement::member(),
        );
        s.start("BV1", ladder()).unwrap();
        s.on_playback_ready();
        assert_eq!(cooldown.consecutive_failures(), 0);
        assert_eq!(s.state(), SessionState::Playing);
    }

    #[test]
    fn test_network_change_only_on_transition() {
        let mut s = session();
        assert_eq!(s.on_network_change(NetworkClass::Unmetered), Some(BufferProfile::UNMETERED));
        assert_eq!(s.on_network_change(NetworkClass::Unmetered), None);
        assert_eq!(s.on_network_change(NetworkClass::Metered), Some(BufferProfile::METERED));
    }

    #[test]
    fn test_skip_events_emitted() {
        let mut s = session();
        s.start("BV1", ladder()).unwrap();
        s.load_skip_intervals(vec![SkipInterval::new("sp", 1_000, 5_000).with_category("sponsor")])
            .unwrap();

        assert!(matches!(s.on_position(2_000), SkipOutcome::SkipTo { seek_to_ms: 5_000, .. }));
        assert_eq!(s.on_position(3_000), SkipOutcome::None);

        let skipped = s
            .events()
            .recent()
            .into_iter()
            .filter(|r| matches!(r.event, EngineEvent::SkipExecuted { automatic: true, .. }))
            .count();
        assert_eq!(skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_installs_new_set() {
        let mut s = session();
        assert!(matches!(s.start("BV1", RepresentationSet::empty()), Err(Error::NoCachedData)));

        let plan = RecoveryPlan {
            action: RecoveryAction::RetryNetwork,
            delay_ms: 2_000,
            endpoint: None,
            fallback: None,
            blocked_by: None,
            retry_count: 1,
            cdn_switch_count: 0,
        };
        let source: Arc<dyn RepresentationSource> = Arc::new(StaticSource(ladder()));
        let decision = s.refetch(source, &plan).await.unwrap();
        assert_eq!(decision.quality, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_refetch_discarded() {
        let mut s = session();
        s.start("BV1", ladder()).unwrap();
        let source: Arc<dyn RepresentationSource> = Arc::new(StaticSource(ladder()));

        let old = s.schedule_refetch(Arc::clone(&source), Duration::from_secs(4)).unwrap();
        let new = s.schedule_refetch(source, Duration::from_secs(2)).unwrap();
        let old_generation = old.generation();

        assert!(old.outcome().await.is_superseded());
        let set = new.outcome().await.into_result().unwrap().unwrap();
        assert!(matches!(
            s.apply_refetch(old_generation, set.clone()),
            Err(Error::Superseded { .. })
        ));
        assert!(s.apply_refetch(old_generation + 1, set).is_ok());
    }
}
