//! The ingestion-time privacy gate.
//!
//! Privacy is evaluated exactly once, when a clip arrives. A suppressed
//! clip keeps its audio on disk for audit but is recorded as terminally
//! `failed` and is never eligible for transcription, so rule changes are
//! never retroactive.

use chrono::{DateTime, Timelike, Utc};

/// Snapshot of the active privacy rules, ready for evaluation.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub global_mute: bool,
    pub node_mutes: Vec<NodeMute>,
    pub quiet_hours: Vec<QuietWindow>,
}

#[derive(Debug, Clone)]
pub struct NodeMute {
    pub node_id: String,
    /// `None` means muted until explicitly lifted.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Minutes since local midnight; `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy)]
pub struct QuietWindow {
    pub start_minute: i32,
    pub end_minute: i32,
}

impl QuietWindow {
    pub fn contains(&self, minute: i32) -> bool {
        if self.start_minute <= self.end_minute {
            self.start_minute <= minute && minute < self.end_minute
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// Marker at the start of a suppressed clip's `error_message`. Clips whose
/// error carries this prefix are terminal and must never be re-queued.
pub const SUPPRESSED_PREFIX: &str = "suppressed:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    NodeMuted,
    GlobalMute,
    QuietHours,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = match self {
            SuppressReason::NodeMuted => "node mute",
            SuppressReason::GlobalMute => "global mute",
            SuppressReason::QuietHours => "quiet hours",
        };
        write!(f, "{SUPPRESSED_PREFIX} privacy rule ({rule})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Suppressed(SuppressReason),
}

impl RuleSet {
    /// Pure evaluation against an explicit minute-of-day; checks run in
    /// precedence order: node mute, global mute, quiet hours.
    pub fn admit_at(&self, node_id: &str, now: DateTime<Utc>, local_minute: i32) -> Admission {
        let node_muted = self.node_mutes.iter().any(|m| {
            m.node_id == node_id && m.expires_at.is_none_or(|exp| exp > now)
        });
        if node_muted {
            return Admission::Suppressed(SuppressReason::NodeMuted);
        }
        if self.global_mute {
            return Admission::Suppressed(SuppressReason::GlobalMute);
        }
        if self.quiet_hours.iter().any(|w| w.contains(local_minute)) {
            return Admission::Suppressed(SuppressReason::QuietHours);
        }
        Admission::Admitted
    }

    /// Evaluates quiet hours against the server's local wall clock.
    pub fn admit(&self, node_id: &str, now: DateTime<Utc>) -> Admission {
        let local = now.with_timezone(&chrono::Local);
        let minute = (local.hour() * 60 + local.minute()) as i32;
        self.admit_at(node_id, now, minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at_noon() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn empty_rule_set_admits() {
        let rules = RuleSet::default();
        assert_eq!(rules.admit_at("kitchen", at_noon(), 720), Admission::Admitted);
    }

    #[test]
    fn node_mute_only_hits_its_node() {
        let rules = RuleSet {
            node_mutes: vec![NodeMute {
                node_id: "kitchen".to_string(),
                expires_at: None,
            }],
            ..Default::default()
        };
        assert_eq!(
            rules.admit_at("kitchen", at_noon(), 720),
            Admission::Suppressed(SuppressReason::NodeMuted)
        );
        assert_eq!(rules.admit_at("bedroom", at_noon(), 720), Admission::Admitted);
    }

    #[test]
    fn expired_node_mute_is_ignored() {
        let now = at_noon();
        let rules = RuleSet {
            node_mutes: vec![NodeMute {
                node_id: "kitchen".to_string(),
                expires_at: Some(now - Duration::minutes(1)),
            }],
            ..Default::default()
        };
        assert_eq!(rules.admit_at("kitchen", now, 720), Admission::Admitted);
    }

    #[test]
    fn global_mute_hits_every_node() {
        let rules = RuleSet {
            global_mute: true,
            ..Default::default()
        };
        assert_eq!(
            rules.admit_at("anything", at_noon(), 720),
            Admission::Suppressed(SuppressReason::GlobalMute)
        );
    }

    #[test]
    fn node_mute_takes_precedence_over_global() {
        let rules = RuleSet {
            global_mute: true,
            node_mutes: vec![NodeMute {
                node_id: "kitchen".to_string(),
                expires_at: None,
            }],
            ..Default::default()
        };
        assert_eq!(
            rules.admit_at("kitchen", at_noon(), 720),
            Admission::Suppressed(SuppressReason::NodeMuted)
        );
    }

    #[test]
    fn quiet_window_wraps_past_midnight() {
        // 22:00 - 07:00
        let w = QuietWindow {
            start_minute: 22 * 60,
            end_minute: 7 * 60,
        };
        assert!(w.contains(23 * 60));
        assert!(w.contains(30));
        assert!(!w.contains(12 * 60));
        assert!(!w.contains(7 * 60)); // end is exclusive

        let rules = RuleSet {
            quiet_hours: vec![w],
            ..Default::default()
        };
        assert_eq!(
            rules.admit_at("kitchen", at_noon(), 23 * 60),
            Admission::Suppressed(SuppressReason::QuietHours)
        );
    }
}
