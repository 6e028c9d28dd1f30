//! CLI command implementations

use crate::output::{emit, FieldRow, OutputFormat, Report};
use reprise_core::{
    quality_label, BufferProfile, CooldownConfig, CooldownManager, CooldownStatus, EngineConfig,
    Entitlement, ErrorClass, ErrorCode, ManualClock, NetworkClass, PlaybackErrorSignal,
    QualityDecision, QualityId, QualityPermission, QualitySelector, RecoveryAction, RecoveryBudget,
    RecoveryConfig, RecoveryPolicy, Representation, RepresentationSet,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tracing::{debug, info};

/// Synthetic representation set over the given quality ids
fn synthetic_ladder(available: &[QualityId]) -> anyhow::Result<RepresentationSet> {
    let video = available
        .iter()
        .map(|&id| {
            Representation::new(
                id,
                id as u64 * 50_000,
                format!("https://cdn-a.example.com/{}.m4s", id),
            )
            .with_backups([format!("https://cdn-b.example.com/{}.m4s", id)])
        })
        .collect();
    Ok(RepresentationSet::new(video, vec![])?)
}

// ============================================================================
// select
// ============================================================================

#[derive(Serialize)]
struct SelectReport {
    target: QualityId,
    decision: QualityDecision,
}

impl Report for SelectReport {
    type Row = FieldRow;

    fn rows(&self) -> Vec<FieldRow> {
        vec![
            FieldRow::new("Target", format!("{} ({})", self.target, quality_label(self.target))),
            FieldRow::new(
                "Selected",
                format!("{} ({})", self.decision.quality, quality_label(self.decision.quality)),
            ),
            FieldRow::new("Downgraded", self.decision.was_downgraded),
            FieldRow::new("Video URL", &self.decision.video_url),
            FieldRow::new("CDN alternatives", self.decision.cdn_alternatives.len()),
        ]
    }

    fn text(&self) -> String {
        format!(
            "Selected {} ({}) for target {}{}",
            self.decision.quality,
            quality_label(self.decision.quality),
            self.target,
            if self.decision.was_downgraded { ", downgraded" } else { "" }
        )
    }
}

/// Resolve a target quality against available ids
pub fn select(
    target: QualityId,
    available: &[QualityId],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let set = synthetic_ladder(available)?;
    let decision = QualitySelector::new().change_quality(target, &set)?;
    emit(&SelectReport { target, decision }, format)
}

// ============================================================================
// permission / max-quality
// ============================================================================

#[derive(Serialize)]
struct PermissionReport {
    quality: QualityId,
    entitlement: Entitlement,
    permission: QualityPermission,
}

impl Report for PermissionReport {
    type Row = FieldRow;

    fn rows(&self) -> Vec<FieldRow> {
        vec![
            FieldRow::new("Quality", format!("{} ({})", self.quality, quality_label(self.quality))),
            FieldRow::new("Logged in", self.entitlement.logged_in),
            FieldRow::new("VIP", self.entitlement.vip),
            FieldRow::new("Permitted", self.permission.is_permitted()),
        ]
    }

    fn text(&self) -> String {
        match &self.permission {
            QualityPermission::Permitted => format!("{} is permitted", quality_label(self.quality)),
            QualityPermission::RequiresVip { label } => format!("{} requires VIP", label),
            QualityPermission::RequiresLogin { label } => format!("{} requires login", label),
        }
    }
}

/// Check a tier against an entitlement
pub fn permission(
    quality: QualityId,
    entitlement: Entitlement,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let permission = QualitySelector::new().check_permission(quality, entitlement);
    emit(
        &PermissionReport {
            quality,
            entitlement,
            permission,
        },
        format,
    )
}

#[derive(Serialize)]
struct MaxQualityReport {
    available: Vec<QualityId>,
    entitlement: Entitlement,
    max_quality: QualityId,
}

impl Report for MaxQualityReport {
    type Row = FieldRow;

    fn rows(&self) -> Vec<FieldRow> {
        vec![
            FieldRow::new("Available", format!("{:?}", self.available)),
            FieldRow::new("Logged in", self.entitlement.logged_in),
            FieldRow::new("VIP", self.entitlement.vip),
            FieldRow::new(
                "Max quality",
                format!("{} ({})", self.max_quality, quality_label(self.max_quality)),
            ),
        ]
    }

    fn text(&self) -> String {
        format!(
            "Highest permitted quality: {} ({})",
            self.max_quality,
            quality_label(self.max_quality)
        )
    }
}

/// Highest available tier the entitlement allows
pub fn max_quality(
    available: Vec<QualityId>,
    entitlement: Entitlement,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let max_quality = QualitySelector::new().max_available_quality(&available, entitlement);
    emit(
        &MaxQualityReport {
            available,
            entitlement,
            max_quality,
        },
        format,
    )
}

// ============================================================================
// recover
// ============================================================================

/// Inputs for a recovery decision
pub struct RecoverRequest {
    pub code: i32,
    pub message: Option<String>,
    pub cause_type: Option<String>,
    pub has_cdn_alternatives: bool,
    pub budget: RecoveryBudget,
}

#[derive(Serialize)]
struct RecoverReport {
    code: ErrorCode,
    class: ErrorClass,
    action: RecoveryAction,
    delay_ms: u64,
    budget: RecoveryBudget,
}

impl Report for RecoverReport {
    type Row = FieldRow;

    fn rows(&self) -> Vec<FieldRow> {
        vec![
            FieldRow::new("Error code", self.code),
            FieldRow::new("Class", format!("{:?}", self.class)),
            FieldRow::new("Action", self.action),
            FieldRow::new("Delay (ms)", self.delay_ms),
            FieldRow::new(
                "Retries",
                format!("{}/{}", self.budget.retry_count, self.budget.max_retries),
            ),
            FieldRow::new(
                "CDN switches",
                format!("{}/{}", self.budget.cdn_switch_count, self.budget.max_cdn_switches),
            ),
        ]
    }

    fn text(&self) -> String {
        if self.delay_ms > 0 {
            format!("{} after {} ms", self.action, self.delay_ms)
        } else {
            self.action.to_string()
        }
    }
}

fn decide(request: &RecoverRequest) -> RecoverReport {
    let mut signal = PlaybackErrorSignal::new(ErrorCode(request.code));
    if let Some(message) = &request.message {
        signal = signal.with_message(message.as_str());
    }
    if let Some(cause_type) = &request.cause_type {
        signal = signal.with_cause_type(cause_type.as_str());
    }

    let policy = RecoveryPolicy::default();
    let class = policy.classifier().classify(&signal);
    let action = policy.decide(&signal, request.has_cdn_alternatives, &request.budget);
    let delay = RecoveryConfig::default()
        .retry_delay
        .delay_for(action, request.budget.retry_count + 1);

    RecoverReport {
        code: signal.code,
        class,
        action,
        delay_ms: delay.as_millis() as u64,
        budget: request.budget,
    }
}

/// Decide the recovery action for an error signal
pub fn recover(request: RecoverRequest, format: OutputFormat) -> anyhow::Result<()> {
    emit(&decide(&request), format)
}

// ============================================================================
// buffer
// ============================================================================

#[derive(Clone, Serialize, Tabled)]
struct BufferRow {
    #[tabled(rename = "Network")]
    network: NetworkClass,
    #[tabled(rename = "Min (ms)")]
    min_buffer_ms: u32,
    #[tabled(rename = "Max (ms)")]
    max_buffer_ms: u32,
    #[tabled(rename = "Start (ms)")]
    buffer_for_playback_ms: u32,
    #[tabled(rename = "Rebuffer start (ms)")]
    buffer_for_playback_after_rebuffer_ms: u32,
}

impl BufferRow {
    fn new(network: NetworkClass, profile: BufferProfile) -> Self {
        Self {
            network,
            min_buffer_ms: profile.min_buffer_ms,
            max_buffer_ms: profile.max_buffer_ms,
            buffer_for_playback_ms: profile.buffer_for_playback_ms,
            buffer_for_playback_after_rebuffer_ms: profile.buffer_for_playback_after_rebuffer_ms,
        }
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct BufferReport {
    profiles: Vec<BufferRow>,
}

impl Report for BufferReport {
    type Row = BufferRow;

    fn rows(&self) -> Vec<BufferRow> {
        self.profiles.clone()
    }

    fn text(&self) -> String {
        self.profiles
            .iter()
            .map(|r| {
                format!(
                    "{}: min {} ms, max {} ms, start after {} ms ({} ms after rebuffer)",
                    r.network,
                    r.min_buffer_ms,
                    r.max_buffer_ms,
                    r.buffer_for_playback_ms,
                    r.buffer_for_playback_after_rebuffer_ms
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Show buffer profiles, for one network class or both
pub fn buffer(
    network: Option<NetworkClass>,
    config: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let policy = load_config(config)?.buffer;
    let classes = match network {
        Some(class) => vec![class],
        None => vec![NetworkClass::Unmetered, NetworkClass::Metered],
    };
    let profiles = classes
        .into_iter()
        .map(|class| BufferRow::new(class, policy.resolve(class)))
        .collect();
    emit(&BufferReport { profiles }, format)
}

// ============================================================================
// simulate
// ============================================================================

/// Cooldown scenario replayed against a manual clock
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub cooldown: CooldownConfig,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScenarioStep {
    Failure {
        item: String,
        #[serde(default = "default_reason")]
        reason: String,
    },
    Success,
    Advance {
        secs: u64,
    },
    Status {
        item: String,
    },
    Clear {
        item: String,
    },
    ClearAll,
}

fn default_reason() -> String {
    "simulated failure".to_string()
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct StepRow {
    #[tabled(rename = "#")]
    pub step: usize,
    #[tabled(rename = "Op")]
    pub op: String,
    #[tabled(rename = "Item")]
    pub item: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Streak")]
    pub consecutive_failures: u32,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<CooldownStatus>,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct SimulationReport {
    pub steps: Vec<StepRow>,
}

impl Report for SimulationReport {
    type Row = StepRow;

    fn rows(&self) -> Vec<StepRow> {
        self.steps.clone()
    }

    fn text(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{:>3}  {:<9} {:<12} {}", s.step, s.op, s.item, s.status))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Replay a scenario and collect one row per step
pub fn run_scenario(scenario: &Scenario) -> anyhow::Result<SimulationReport> {
    scenario.cooldown.validate()?;

    let clock = Arc::new(ManualClock::starting_now());
    let manager = CooldownManager::with_clock(scenario.cooldown, clock.clone());
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let (op, item, cooldown) = match step {
            ScenarioStep::Failure { item, reason } => {
                manager.record_failure(item, reason);
                ("failure", item.clone(), None)
            }
            ScenarioStep::Success => {
                manager.record_success();
                ("success", String::new(), None)
            }
            ScenarioStep::Advance { secs } => {
                clock.advance(Duration::from_secs(*secs));
                ("advance", format!("+{}s", secs), None)
            }
            ScenarioStep::Status { item } => {
                ("status", item.clone(), Some(manager.cooldown_status(item)))
            }
            ScenarioStep::Clear { item } => {
                manager.clear_for_item(item);
                ("clear", item.clone(), None)
            }
            ScenarioStep::ClearAll => {
                manager.clear_all();
                ("clear_all", String::new(), None)
            }
        };

        debug!(step = index + 1, op, item = %item, "Scenario step");

        steps.push(StepRow {
            step: index + 1,
            op: op.to_string(),
            item,
            status: cooldown.as_ref().map(ToString::to_string).unwrap_or_default(),
            consecutive_failures: manager.consecutive_failures(),
            cooldown,
        });
    }

    Ok(SimulationReport { steps })
}

/// Load and replay a scenario file
pub fn simulate(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    info!(path = %path.display(), "Loading scenario");
    let content = std::fs::read_to_string(path)?;
    let scenario: Scenario = serde_json::from_str(&content)?;
    emit(&run_scenario(&scenario)?, format)
}

// ============================================================================
// config
// ============================================================================

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    Ok(match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    })
}

#[derive(Serialize)]
#[serde(transparent)]
struct ConfigReport {
    config: EngineConfig,
}

impl Report for ConfigReport {
    type Row = FieldRow;

    fn rows(&self) -> Vec<FieldRow> {
        let c = &self.config;
        vec![
            FieldRow::new("Item cooldown (s)", c.cooldown.item_cooldown_secs),
            FieldRow::new("Global threshold", c.cooldown.global_failure_threshold),
            FieldRow::new("Global cooldown (s)", c.cooldown.global_cooldown_secs),
            FieldRow::new("Tracked items", c.cooldown.max_tracked_items),
            FieldRow::new("Max retries", c.recovery.max_retries),
            FieldRow::new("Max CDN switches", c.recovery.max_cdn_switches),
            FieldRow::new("Retry step (ms)", c.recovery.retry_delay.step_ms),
            FieldRow::new("Auto skip", c.skip.auto_skip),
            FieldRow::new("Auto highest", c.quality.auto_highest),
        ]
    }

    fn text(&self) -> String {
        serde_json::to_string_pretty(&self.config).unwrap_or_default()
    }
}

/// Print the default or a loaded configuration
pub fn config(path: Option<&Path>, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(path)?;
    emit(&ConfigReport { config }, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_trips_global_cooldown() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "steps": [
                    {"op": "failure", "item": "A"},
                    {"op": "failure", "item": "B"},
                    {"op": "failure", "item": "C"},
                    {"op": "status", "item": "D"},
                    {"op": "advance", "secs": 300},
                    {"op": "status", "item": "D"}
                ]
            }"#,
        )
        .unwrap();

        let report = run_scenario(&scenario).unwrap();
        assert!(matches!(
            report.steps[3].cooldown,
            Some(CooldownStatus::GlobalCooldown { .. })
        ));
        assert_eq!(report.steps[5].cooldown, Some(CooldownStatus::Ready));
        assert_eq!(report.steps[5].consecutive_failures, 0);
    }

    #[test]
    fn test_scenario_rejects_invalid_config() {
        let scenario: Scenario =
            serde_json::from_str(r#"{"cooldown": {"max_tracked_items": 0}, "steps": []}"#).unwrap();
        assert!(run_scenario(&scenario).is_err());
    }

    #[test]
    fn test_recover_exhausted_budget() {
        let report = decide(&RecoverRequest {
            code: 2001,
            message: None,
            cause_type: None,
            has_cdn_alternatives: false,
            budget: RecoveryBudget {
                retry_count: 3,
                max_retries: 3,
                cdn_switch_count: 0,
                max_cdn_switches: 2,
            },
        });
        assert_eq!(report.action, RecoveryAction::GiveUp);
        assert_eq!(report.delay_ms, 0);
    }

    #[test]
    fn test_recover_retry_delay() {
        let report = decide(&RecoverRequest {
            code: 2002,
            message: None,
            cause_type: None,
            has_cdn_alternatives: false,
            budget: RecoveryBudget {
                retry_count: 1,
                ..RecoveryBudget::default()
            },
        });
        assert_eq!(report.action, RecoveryAction::RetryNetwork);
        assert_eq!(report.delay_ms, 4_000);
    }
}
