//! Core data model (§3.2–§3.6): Session, Transaction, TeamScore,
//! DeviceConnection, and the video-queue mirror used for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::catalog::MemoryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Gm,
    Player,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Blackmarket,
    Detective,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Blackmarket
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Accepted,
    Duplicate,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub token_id: String,
    pub team_id: String,
    pub device_id: String,
    pub device_type: DeviceType,
    pub mode: ScanMode,
    pub status: TransactionStatus,
    pub points: i64,
    pub timestamp: DateTime<Utc>,
    pub memory_type: MemoryType,
    pub value_rating: Option<u8>,
    pub group: String,
    pub is_unknown: bool,
    pub original_transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAdjustment {
    pub delta: i64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    pub team_id: String,
    pub base_score: i64,
    pub bonus_points: i64,
    pub current_score: i64,
    pub tokens_scanned: u32,
    pub completed_groups: Vec<String>,
    pub admin_adjustments: Vec<AdminAdjustment>,
    pub last_update: DateTime<Utc>,
}

impl TeamScore {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            base_score: 0,
            bonus_points: 0,
            current_score: 0,
            tokens_scanned: 0,
            completed_groups: Vec::new(),
            admin_adjustments: Vec::new(),
            last_update: Utc::now(),
        }
    }

    fn recompute(&mut self) {
        let adjustments: i64 = self.admin_adjustments.iter().map(|a| a.delta).sum();
        self.current_score = self.base_score + self.bonus_points + adjustments;
    }

    pub fn apply_adjustment(&mut self, delta: i64, reason: impl Into<String>) {
        self.admin_adjustments.push(AdminAdjustment {
            delta,
            reason: reason.into(),
            timestamp: Utc::now(),
        });
        self.recompute();
        self.last_update = Utc::now();
    }

    /// §3.1 group-completion bonus + §4.4 step 7. `group_size` is the `N`
    /// parsed from `"<name> (xN)"`; `tokens_in_group_value` is the sum of
    /// `tokenValue` for every token in the group, used to size the bonus.
    pub fn apply_transaction(
        &mut self,
        points: i64,
        group_name: Option<&str>,
        group_completed_now: bool,
        group_multiplier: u32,
        group_total_value: i64,
    ) -> Option<i64> {
        self.base_score += points;
        self.tokens_scanned += 1;

        let mut bonus_awarded = None;
        if group_completed_now {
            if let Some(name) = group_name {
                if !self.completed_groups.iter().any(|g| g == name) {
                    let bonus = (group_multiplier as i64 - 1) * group_total_value;
                    self.bonus_points += bonus;
                    self.completed_groups.push(name.to_string());
                    bonus_awarded = Some(bonus);
                }
            }
        }

        self.recompute();
        self.last_update = Utc::now();
        bonus_awarded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConnection {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub name: String,
    pub version: String,
    pub ip_address: String,
    pub connection_time: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub disconnection_time: Option<DateTime<Utc>>,
    /// Transient — only set while a socket is actually attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQueueItemStateMirror {
    Queued,
    Loading,
    Playing,
    Paused,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub teams: Vec<String>,
    pub transactions: Vec<Transaction>,
    pub scores: HashMap<String, TeamScore>,
    pub connected_devices: HashMap<String, DeviceConnection>,
    #[serde(default)]
    pub scanned_tokens_by_device: HashMap<String, HashSet<String>>,
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn new(id: String, name: String, teams: Vec<String>) -> Self {
        let scores = teams
            .iter()
            .map(|t| (t.clone(), TeamScore::new(t.clone())))
            .collect();

        Self {
            id,
            name,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
            teams,
            transactions: Vec::new(),
            scores,
            connected_devices: HashMap::new(),
            scanned_tokens_by_device: HashMap::new(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn is_active_or_paused(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Paused)
    }

    /// §4.3: rebuilds `scanned_tokens_by_device` from `transactions`,
    /// idempotently, on session load.
    pub fn rebuild_scanned_tokens(&mut self) {
        self.scanned_tokens_by_device.clear();
        for tx in &self.transactions {
            if tx.status == TransactionStatus::Accepted {
                self.scanned_tokens_by_device
                    .entry(tx.device_id.clone())
                    .or_default()
                    .insert(tx.token_id.clone());
            }
        }
    }

    pub fn is_token_scanned_by_device(&self, device_id: &str, token_id: &str) -> bool {
        self.scanned_tokens_by_device
            .get(device_id)
            .map(|set| set.contains(token_id))
            .unwrap_or(false)
    }

    pub fn first_transaction_for(&self, device_id: &str, token_id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| {
            t.device_id == device_id && t.token_id == token_id && t.status == TransactionStatus::Accepted
        })
    }

    /// §3.7 `recentTransactions`: last 100, newest-first.
    pub fn recent_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.transactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn device_scanned_tokens(&self, device_id: &str) -> Vec<String> {
        self.scanned_tokens_by_device
            .get(device_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_score_invariant_holds_after_transactions_and_adjustments() {
        let mut score = TeamScore::new("001");
        score.apply_transaction(1000, None, false, 0, 0);
        score.apply_adjustment(-200, "correction");
        assert_eq!(score.current_score, score.base_score + score.bonus_points - 200);
    }

    #[test]
    fn group_bonus_awarded_once() {
        let mut score = TeamScore::new("001");
        let bonus = score.apply_transaction(300, Some("clue"), true, 2, 1800);
        assert_eq!(bonus, Some(1800));
        // Re-completing the same group (e.g. replay) must not double-award.
        let bonus_again = score.apply_transaction(0, Some("clue"), true, 2, 1800);
        assert_eq!(bonus_again, None);
    }

    #[test]
    fn rebuild_scanned_tokens_only_counts_accepted() {
        let mut session = Session::new("s1".into(), "Test".into(), vec!["001".into()]);
        session.transactions.push(Transaction {
            id: "t1".into(),
            token_id: "a".into(),
            team_id: "001".into(),
            device_id: "d1".into(),
            device_type: DeviceType::Player,
            mode: ScanMode::Blackmarket,
            status: TransactionStatus::Accepted,
            points: 100,
            timestamp: Utc::now(),
            memory_type: MemoryType::Personal,
            value_rating: Some(1),
            group: String::new(),
            is_unknown: false,
            original_transaction_id: None,
        });
        session.transactions.push(Transaction {
            id: "t2".into(),
            token_id: "b".into(),
            team_id: "001".into(),
            device_id: "d1".into(),
            device_type: DeviceType::Player,
            mode: ScanMode::Blackmarket,
            status: TransactionStatus::Error,
            points: 0,
            timestamp: Utc::now(),
            memory_type: MemoryType::Unknown,
            value_rating: None,
            group: String::new(),
            is_unknown: false,
            original_transaction_id: None,
        });

        session.rebuild_scanned_tokens();
        assert!(session.is_token_scanned_by_device("d1", "a"));
        assert!(!session.is_token_scanned_by_device("d1", "b"));
    }
}
