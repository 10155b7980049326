use bson::{DateTime, doc, oid::ObjectId};
use chrono::Utc;
use mongodb::Database;
use homemic_db::models::{PrivacyRule, RuleSpec};

use super::base::{BaseDao, DaoError, DaoResult};
use crate::privacy::{NodeMute, QuietWindow, RuleSet};

const MINUTES_PER_DAY: i32 = 24 * 60;

pub struct PrivacyDao {
    pub base: BaseDao<PrivacyRule>,
}

impl PrivacyDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, PrivacyRule::COLLECTION),
        }
    }

    /// Mutes one node, replacing any active mute it already has.
    /// `duration_minutes = None` mutes until explicitly lifted.
    pub async fn mute_node(
        &self,
        node_id: &str,
        duration_minutes: Option<i64>,
        reason: Option<String>,
    ) -> DaoResult<PrivacyRule> {
        if let Some(minutes) = duration_minutes {
            if minutes <= 0 {
                return Err(DaoError::Validation(
                    "mute duration must be positive".to_string(),
                ));
            }
        }
        self.base
            .collection()
            .update_many(
                doc! { "kind": "node_mute", "node_id": node_id, "active": true },
                doc! { "$set": { "active": false } },
            )
            .await?;

        let now = Utc::now();
        let rule = PrivacyRule {
            id: None,
            spec: RuleSpec::NodeMute {
                node_id: node_id.to_string(),
                expires_at: duration_minutes
                    .map(|m| DateTime::from_chrono(now + chrono::Duration::minutes(m))),
                reason,
            },
            active: true,
            created_at: DateTime::from_chrono(now),
        };
        let id = self.base.insert_one(&rule).await?;
        self.base.find_by_id(id).await
    }

    /// Lifts all active mutes for one node. Returns how many were lifted.
    pub async fn unmute_node(&self, node_id: &str) -> DaoResult<u64> {
        let result = self
            .base
            .collection()
            .update_many(
                doc! { "kind": "node_mute", "node_id": node_id, "active": true },
                doc! { "$set": { "active": false } },
            )
            .await?;
        Ok(result.modified_count)
    }

    pub async fn mute_all(&self, reason: Option<String>) -> DaoResult<PrivacyRule> {
        self.base
            .collection()
            .update_many(
                doc! { "kind": "global_mute", "active": true },
                doc! { "$set": { "active": false } },
            )
            .await?;
        let rule = PrivacyRule {
            id: None,
            spec: RuleSpec::GlobalMute { reason },
            active: true,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&rule).await?;
        self.base.find_by_id(id).await
    }

    /// Lifts the global mute and every per-node mute in one sweep.
    pub async fn unmute_all(&self) -> DaoResult<u64> {
        let result = self
            .base
            .collection()
            .update_many(
                doc! { "kind": { "$in": ["global_mute", "node_mute"] }, "active": true },
                doc! { "$set": { "active": false } },
            )
            .await?;
        Ok(result.modified_count)
    }

    /// Replaces the quiet-hours schedule with the given windows.
    pub async fn set_quiet_hours(
        &self,
        windows: Vec<(i32, i32)>,
    ) -> DaoResult<Vec<PrivacyRule>> {
        for (start, end) in &windows {
            if !(0..MINUTES_PER_DAY).contains(start) || !(0..MINUTES_PER_DAY).contains(end) {
                return Err(DaoError::Validation(format!(
                    "quiet-hours minutes must be in [0, {MINUTES_PER_DAY}): got {start}..{end}"
                )));
            }
        }
        self.base
            .collection()
            .update_many(
                doc! { "kind": "quiet_hours", "active": true },
                doc! { "$set": { "active": false } },
            )
            .await?;

        let mut rules = Vec::with_capacity(windows.len());
        for (start_minute, end_minute) in windows {
            let rule = PrivacyRule {
                id: None,
                spec: RuleSpec::QuietHours {
                    start_minute,
                    end_minute,
                },
                active: true,
                created_at: DateTime::now(),
            };
            let id = self.base.insert_one(&rule).await?;
            rules.push(self.base.find_by_id(id).await?);
        }
        Ok(rules)
    }

    pub async fn active_rules(&self) -> DaoResult<Vec<PrivacyRule>> {
        self.base
            .find_many(doc! { "active": true }, Some(doc! { "created_at": -1 }))
            .await
    }

    pub async fn deactivate(&self, rule_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_by_id(rule_id, doc! { "$set": { "active": false } })
            .await
    }

    /// Loads the active rules into an evaluatable snapshot. Node mutes whose
    /// expiry has passed are lazily deactivated on the way through.
    pub async fn rule_set(&self) -> DaoResult<RuleSet> {
        let now = Utc::now();
        let mut set = RuleSet::default();
        let mut expired = Vec::new();

        for rule in self.active_rules().await? {
            match rule.spec {
                RuleSpec::NodeMute {
                    node_id,
                    expires_at,
                    ..
                } => {
                    let expires_at = expires_at.map(|d| d.to_chrono());
                    if expires_at.is_some_and(|exp| exp <= now) {
                        if let Some(id) = rule.id {
                            expired.push(id);
                        }
                        continue;
                    }
                    set.node_mutes.push(NodeMute {
                        node_id,
                        expires_at,
                    });
                }
                RuleSpec::GlobalMute { .. } => set.global_mute = true,
                RuleSpec::QuietHours {
                    start_minute,
                    end_minute,
                } => set.quiet_hours.push(QuietWindow {
                    start_minute,
                    end_minute,
                }),
            }
        }

        for id in expired {
            self.deactivate(id).await?;
        }
        Ok(set)
    }
}
