use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;
use winback_core::loyalty::Ineligibility;

/// What happened to one user during a run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UserOutcome {
    Sent {
        percent: u8,
        coupon_code: String,
        status: Option<u16>,
        provider_message_id: Option<String>,
    },
    Failed {
        percent: u8,
        coupon_code: String,
        status: Option<u16>,
        detail: String,
        coupon_reclaimed: bool,
    },
    NoCouponsLeft {
        percent: u8,
    },
    NotEligible {
        days: i64,
        reason: Ineligibility,
    },
    AlreadyNotified,
    Rejected {
        reason: String,
    },
}

impl UserOutcome {
    /// Whether a dispatch was attempted for this user.
    pub fn dispatched(&self) -> bool {
        matches!(self, UserOutcome::Sent { .. } | UserOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserResult {
    pub row: usize,
    pub user_id: Option<String>,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub outcome: UserOutcome,
}

/// State of the notified-flag write-back after a run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "write_back")]
pub enum WriteBack {
    /// Nothing to write or write-back not possible.
    Skipped { reason: String },
    Written { target: String, changed: usize },
    Failed { target: String, error: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub no_coupons_left: usize,
    pub not_eligible: usize,
    pub already_notified: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub as_of: NaiveDate,
    pub results: Vec<UserResult>,
    pub coupons_remaining: Option<usize>,
    pub write_back: WriteBack,
}

impl RunReport {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            as_of,
            results: Vec::new(),
            coupons_remaining: None,
            write_back: WriteBack::Skipped {
                reason: "run not finished".to_string(),
            },
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.results.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.outcome {
                UserOutcome::Sent { .. } => summary.sent += 1,
                UserOutcome::Failed { .. } => summary.failed += 1,
                UserOutcome::NoCouponsLeft { .. } => summary.no_coupons_left += 1,
                UserOutcome::NotEligible { .. } => summary.not_eligible += 1,
                UserOutcome::AlreadyNotified => summary.already_notified += 1,
                UserOutcome::Rejected { .. } => summary.rejected += 1,
            }
        }
        summary
    }

    /// Ids of users whose coupon the provider accepted.
    pub fn sent_user_ids(&self) -> HashSet<String> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, UserOutcome::Sent { .. }))
            .filter_map(|r| r.user_id.clone())
            .collect()
    }

    pub fn dispatch_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.dispatched()).count()
    }

    pub fn write_back_failed(&self) -> bool {
        matches!(self.write_back, WriteBack::Failed { .. })
    }
}
