use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format of the `last_recharge` field in every user source.
pub const LAST_RECHARGE_FORMAT: &str = "%Y-%m-%d";

/// Greeting used when a source row carries no name.
pub const DEFAULT_DISPLAY_NAME: &str = "there";

/// A user validated at load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    /// WhatsApp number including country code. Passed through unvalidated.
    pub phone: String,
    pub last_recharge: NaiveDate,
    /// Set once a coupon message has been delivered to the provider.
    #[serde(default)]
    pub notified: bool,
}

impl UserRecord {
    /// Whole days between the last recharge and `today`. Negative when the
    /// recharge is dated in the future.
    pub fn days_since_recharge(&self, today: NaiveDate) -> i64 {
        today.signed_duration_since(self.last_recharge).num_days()
    }
}

/// A source row that could not be turned into a [`UserRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordRejection {
    /// 1-based position of the row within the source (header excluded).
    pub row: usize,
    pub user_id: Option<String>,
    pub phone: Option<String>,
    pub reason: String,
}

/// One row of a user source after validation.
pub type UserEntry = Result<UserRecord, RecordRejection>;

/// Parse a `last_recharge` value, tolerating surrounding whitespace.
pub fn parse_last_recharge(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), LAST_RECHARGE_FORMAT)
        .map_err(|e| format!("invalid last_recharge {raw:?}: {e}"))
}

/// Interpret a notified/renewed flag: only a case-insensitive `true` counts.
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}
