//! Outbound notification types shared by the dispatcher and the campaign
//! runner.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Display format for coupon expiry dates, e.g. `21 Oct 2026`.
pub const VALID_TILL_FORMAT: &str = "%d %b %Y";

/// Everything the dispatcher needs to send one coupon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CouponMessage {
    pub recipient: String,
    pub name: String,
    pub percent: u8,
    pub coupon_code: String,
    pub valid_till: NaiveDate,
}

impl CouponMessage {
    pub fn discount_label(&self) -> String {
        format!("{}%", self.percent)
    }

    pub fn valid_till_label(&self) -> String {
        self.valid_till.format(VALID_TILL_FORMAT).to_string()
    }
}

/// Verdict of a single dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchResult {
    /// HTTP status, absent when the request never got a response.
    pub status: Option<u16>,
    pub success: bool,
    /// Response body excerpt or transport error.
    pub detail: String,
    pub provider_message_id: Option<String>,
    pub latency_ms: u64,
}

impl DispatchResult {
    pub fn transport_failure(detail: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            status: None,
            success: false,
            detail: detail.into(),
            provider_message_id: None,
            latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let msg = CouponMessage {
            recipient: "919800000001".to_string(),
            name: "Vishwas".to_string(),
            percent: 25,
            coupon_code: "SAVE-XA1234".to_string(),
            valid_till: NaiveDate::from_ymd_opt(2026, 10, 21).unwrap(),
        };
        assert_eq!(msg.discount_label(), "25%");
        assert_eq!(msg.valid_till_label(), "21 Oct 2026");
    }

    #[test]
    fn test_transport_failure() {
        let result = DispatchResult::transport_failure("connection refused", 3);
        assert!(!result.success);
        assert!(result.status.is_none());
        assert_eq!(result.detail, "connection refused");
    }
}
