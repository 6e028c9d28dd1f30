//! Segment skip coordinator
//!
//! Follows the play head across a sorted set of skip intervals (sponsor
//! reads, intros, outros) and emits at most one skip per interval for the
//! lifetime of the current item.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A skippable time range within an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipInterval {
    pub id: String,
    /// Start offset in milliseconds (inclusive)
    pub start_ms: u64,
    /// End offset in milliseconds (inclusive, seek target)
    pub end_ms: u64,
    /// Segment category (sponsor, intro, outro, ...)
    #[serde(default)]
    pub category: Option<String>,
}

impl SkipInterval {
    pub fn new(id: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            id: id.into(),
            start_ms,
            end_ms,
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn contains(&self, position_ms: u64) -> bool {
        position_ms >= self.start_ms && position_ms <= self.end_ms
    }

    /// Label for the skip affordance
    pub fn label(&self) -> String {
        match &self.category {
            Some(category) => format!("Skip {}", category),
            None => "Skip segment".to_string(),
        }
    }
}

/// Skip behavior preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipConfig {
    /// Seek past intervals without asking
    pub auto_skip: bool,
    /// Categories to act on; empty means all
    pub categories: Vec<String>,
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            auto_skip: true,
            categories: Vec::new(),
        }
    }
}

impl SkipConfig {
    fn allows(&self, interval: &SkipInterval) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        interval
            .category
            .as_ref()
            .is_some_and(|c| self.categories.iter().any(|allowed| allowed.eq_ignore_ascii_case(c)))
    }
}

/// Result of feeding a position update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SkipOutcome {
    /// Nothing to do
    None,
    /// Seek the player to `seek_to_ms`
    SkipTo { interval: SkipInterval, seek_to_ms: u64 },
    /// Show a skip affordance for this interval
    ShowPrompt { interval: SkipInterval },
    /// The play head left the surfaced interval; hide the affordance
    CandidateCleared { interval_id: String },
}

/// Tracks skip intervals for the current item
#[derive(Debug, Default)]
pub struct SkipCoordinator {
    config: SkipConfig,
    item_key: Option<String>,
    /// Sorted by start offset
    intervals: Vec<SkipInterval>,
    visited: HashSet<String>,
    candidate: Option<SkipInterval>,
}

impl SkipCoordinator {
    pub fn new(config: SkipConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &SkipConfig {
        &self.config
    }

    pub fn set_auto_skip(&mut self, auto_skip: bool) {
        self.config.auto_skip = auto_skip;
    }

    /// Switch to a new item: drops intervals, candidate and visited ids
    pub fn change_item(&mut self, item_key: &str) {
        if self.item_key.as_deref() == Some(item_key) {
            return;
        }
        debug!(item = %item_key, "Skip state reset for new item");
        self.item_key = Some(item_key.to_string());
        self.intervals.clear();
        self.visited.clear();
        self.candidate = None;
    }

    /// Replace the interval set for `item_key`
    pub fn load_intervals(&mut self, item_key: &str, intervals: Vec<SkipInterval>) {
        self.change_item(item_key);

        let mut valid: Vec<SkipInterval> = intervals
            .into_iter()
            .filter(|i| {
                if i.end_ms < i.start_ms {
                    warn!(
                        id = %i.id,
                        start = i.start_ms,
                        end = i.end_ms,
                        "Dropping inverted skip interval"
                    );
                    false
                } else {
                    true
                }
            })
            .collect();
        valid.sort_by_key(|i| i.start_ms);

        debug!(item = %item_key, count = valid.len(), "Skip intervals loaded");
        self.intervals = valid;
        self.candidate = None;
    }

    pub fn intervals(&self) -> &[SkipInterval] {
        &self.intervals
    }

    /// Interval currently offered to the user
    pub fn candidate(&self) -> Option<&SkipInterval> {
        self.candidate.as_ref()
    }

    pub fn is_visited(&self, interval_id: &str) -> bool {
        self.visited.contains(interval_id)
    }

    /// Feed a play-head position
    pub fn on_position(&mut self, position_ms: u64) -> SkipOutcome {
        let hit = self
            .intervals
            .iter()
            .take_while(|i| i.start_ms <= position_ms)
            .find(|i| {
                i.contains(position_ms) && !self.visited.contains(&i.id) && self.config.allows(i)
            })
            .cloned();

        let Some(interval) = hit else {
            return match self.candidate.take() {
                Some(previous) => SkipOutcome::CandidateCleared {
                    interval_id: previous.id,
                },
                None => SkipOutcome::None,
            };
        };

        if self.config.auto_skip {
            self.visited.insert(interval.id.clone());
            self.candidate = None;
            debug!(id = %interval.id, seek_to = interval.end_ms, "Auto-skipping interval");
            let seek_to_ms = interval.end_ms;
            return SkipOutcome::SkipTo { interval, seek_to_ms };
        }

        if self.candidate.as_ref().map(|c| &c.id) == Some(&interval.id) {
            return SkipOutcome::None;
        }

        debug!(id = %interval.id, "Surfacing skip prompt");
        self.candidate = Some(interval.clone());
        SkipOutcome::ShowPrompt { interval }
    }

    /// User accepted the prompt
    pub fn skip_current(&mut self) -> Option<SkipOutcome> {
        let interval = self.candidate.take()?;
        self.visited.insert(interval.id.clone());
        debug!(id = %interval.id, "Manual skip");
        let seek_to_ms = interval.end_ms;
        Some(SkipOutcome::SkipTo { interval, seek_to_ms })
    }

    /// User dismissed the prompt
    pub fn dismiss_current(&mut self) -> Option<SkipInterval> {
        let interval = self.candidate.take()?;
        self.visited.insert(interval.id.clone());
        debug!(id = %interval.id, "Skip prompt dismissed");
        Some(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(auto_skip: bool) -> SkipCoordinator {
        let mut c = SkipCoordinator::new(SkipConfig {
            auto_skip,
            ..Default::default()
        });
        c.load_intervals(
            "BV1",
            vec![
                SkipInterval::new("outro", 300_000, 320_000).with_category("outro"),
                SkipInterval::new("sponsor", 10_000, 40_000).with_category("sponsor"),
            ],
        );
        c
    }

    #[test]
    fn test_intervals_sorted_on_load() {
        let c = coordinator(true);
        let ids: Vec<_> = c.intervals().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["sponsor", "outro"]);
    }

    #[test]
    fn test_auto_skip_once() {
        let mut c = coordinator(true);
        assert_eq!(c.on_position(5_000), SkipOutcome::None);

        match c.on_position(12_000) {
            SkipOutcome::SkipTo { interval, seek_to_ms } => {
                assert_eq!(interval.id, "sponsor");
                assert_eq!(seek_to_ms, 40_000);
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(c.is_visited("sponsor"));

        // Seeking back into the range does not skip again
        assert_eq!(c.on_position(15_000), SkipOutcome::None);
    }

    #[test]
    fn test_prompt_then_skip() {
        let mut c = coordinator(false);
        assert!(matches!(c.on_position(11_000), SkipOutcome::ShowPrompt { .. }));
        // Same candidate on the next tick is not surfaced twice
        assert_eq!(c.on_position(12_000), SkipOutcome::None);

        let outcome = c.skip_current();
        assert!(matches!(outcome, Some(SkipOutcome::SkipTo { seek_to_ms: 40_000, .. })));
        assert!(c.candidate().is_none());
        assert_eq!(c.on_position(13_000), SkipOutcome::None);
    }

    #[test]
    fn test_prompt_dismissed_marks_visited() {
        let mut c = coordinator(false);
        c.on_position(301_000);
        let dismissed = c.dismiss_current().unwrap();
        assert_eq!(dismissed.id, "outro");
        assert_eq!(c.on_position(302_000), SkipOutcome::None);
    }

    #[test]
    fn test_leaving_range_clears_candidate() {
        let mut c = coordinator(false);
        c.on_position(20_000);
        assert_eq!(
            c.on_position(50_000),
            SkipOutcome::CandidateCleared {
                interval_id: "sponsor".into()
            }
        );
        assert!(c.candidate().is_none());
        assert!(!c.is_visited("sponsor"));
    }

    #[test]
    fn test_item_change_clears_visited() {
        let mut c = coordinator(true);
        c.on_position(20_000);
        assert!(c.is_visited("sponsor"));

        c.load_intervals("BV2", vec![SkipInterval::new("sponsor", 10_000, 40_000)]);
        assert!(!c.is_visited("sponsor"));
        assert!(matches!(c.on_position(20_000), SkipOutcome::SkipTo { .. }));
    }

    #[test]
    fn test_reload_same_item_keeps_visited() {
        let mut c = coordinator(true);
        c.on_position(20_000);
        c.load_intervals("BV1", vec![SkipInterval::new("sponsor", 10_000, 40_000)]);
        assert_eq!(c.on_position(20_000), SkipOutcome::None);
    }

    #[test]
    fn test_category_filter() {
        let mut c = SkipCoordinator::new(SkipConfig {
            auto_skip: true,
            categories: vec!["Outro".into()],
        });
        c.load_intervals(
            "BV1",
            vec![
                SkipInterval::new("s", 0, 1_000).with_category("sponsor"),
                SkipInterval::new("o", 5_000, 6_000).with_category("outro"),
            ],
        );
        assert_eq!(c.on_position(500), SkipOutcome::None);
        assert!(matches!(c.on_position(5_500), SkipOutcome::SkipTo { .. }));
    }

    #[test]
    fn test_inverted_interval_dropped() {
        let mut c = SkipCoordinator::default();
        c.load_intervals("BV1", vec![SkipInterval::new("bad", 5_000, 1_000)]);
        assert!(c.intervals().is_empty());
    }

    #[test]
    fn test_labels() {
        assert_eq!(SkipInterval::new("a", 0, 1).with_category("intro").label(), "Skip intro");
        assert_eq!(SkipInterval::new("a", 0, 1).label(), "Skip segment");
    }
}
