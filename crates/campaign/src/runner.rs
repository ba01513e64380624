//! Campaign pipeline: for each user, classify by days since last recharge,
//! allocate a coupon, dispatch one WhatsApp message, and collect the
//! outcome. Users are processed strictly one after another.

use chrono::{Days, NaiveDate};
use tracing::{error, info, warn};
use winback_cdp::{ResultRecorder, UserSource};
use winback_channels::WhatsAppProvider;
use winback_core::channels::CouponMessage;
use winback_core::config::AppConfig;
use winback_core::error::WinbackResult;
use winback_core::loyalty::Eligibility;
use winback_core::types::{UserEntry, UserRecord};
use winback_loyalty::{Allocation, CouponAllocator, EligibilityClassifier};

use crate::report::{RunReport, UserOutcome, UserResult, WriteBack};

/// Runs one win-back campaign over a list of users.
pub struct CampaignRunner {
    classifier: EligibilityClassifier,
    allocator: CouponAllocator,
    provider: WhatsAppProvider,
    validity_days: u32,
    reclaim_on_failure: bool,
}

impl CampaignRunner {
    pub fn new(
        classifier: EligibilityClassifier,
        allocator: CouponAllocator,
        provider: WhatsAppProvider,
        validity_days: u32,
        reclaim_on_failure: bool,
    ) -> Self {
        Self {
            classifier,
            allocator,
            provider,
            validity_days,
            reclaim_on_failure,
        }
    }

    /// Wire up classifier, allocator and provider from a validated config.
    pub fn from_config(config: &AppConfig) -> WinbackResult<Self> {
        Ok(Self::new(
            EligibilityClassifier::new(&config.campaign.slabs),
            CouponAllocator::from_config(&config.coupons)?,
            WhatsAppProvider::new(&config.messaging)?,
            config.campaign.validity_days,
            config.coupons.reclaim_on_failure,
        ))
    }

    pub fn allocator(&self) -> &CouponAllocator {
        &self.allocator
    }

    /// Coupon expiry for a run on `today`.
    pub fn valid_till(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(u64::from(self.validity_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Process a single validated user end to end.
    pub async fn process_user(&self, user: &UserRecord, today: NaiveDate) -> UserOutcome {
        if user.notified {
            return UserOutcome::AlreadyNotified;
        }

        let days = user.days_since_recharge(today);
        let percent = match self.classifier.classify_days(days) {
            Eligibility::Eligible { percent } => percent,
            Eligibility::NotEligible { reason } => {
                return UserOutcome::NotEligible { days, reason };
            }
        };

        let coupon_code = match self.allocator.allocate() {
            Allocation::Issued(code) => code,
            Allocation::Exhausted => {
                warn!(
                    user_id = %user.user_id,
                    name = %user.name,
                    phone = %user.phone,
                    percent = percent,
                    "No coupons left, skipping user"
                );
                return UserOutcome::NoCouponsLeft { percent };
            }
        };

        let message = CouponMessage {
            recipient: user.phone.clone(),
            name: user.name.clone(),
            percent,
            coupon_code: coupon_code.clone(),
            valid_till: self.valid_till(today),
        };

        let result = self.provider.send_coupon(&message).await;

        if result.success {
            metrics::counter!("winback.coupons_sent").increment(1);
            info!(
                user_id = %user.user_id,
                name = %user.name,
                phone = %user.phone,
                coupon = %coupon_code,
                percent = percent,
                valid_till = %message.valid_till_label(),
                latency_ms = result.latency_ms,
                "Coupon sent"
            );
            return UserOutcome::Sent {
                percent,
                coupon_code,
                status: result.status,
                provider_message_id: result.provider_message_id,
            };
        }

        metrics::counter!("winback.coupons_failed").increment(1);
        let coupon_reclaimed = if self.reclaim_on_failure {
            self.allocator.reclaim(coupon_code.clone());
            true
        } else {
            false
        };

        warn!(
            user_id = %user.user_id,
            name = %user.name,
            phone = %user.phone,
            coupon = %coupon_code,
            status = ?result.status,
            detail = %result.detail,
            coupon_reclaimed = coupon_reclaimed,
            "Coupon dispatch failed"
        );
        if !coupon_reclaimed {
            warn!(coupon = %coupon_code, "Coupon consumed by failed dispatch and not returned");
        }

        UserOutcome::Failed {
            percent,
            coupon_code,
            status: result.status,
            detail: result.detail,
            coupon_reclaimed,
        }
    }

    /// Process every entry in source order. Rejected rows are reported and
    /// skipped; nothing here aborts the run.
    pub async fn run(&self, entries: Vec<UserEntry>, today: NaiveDate) -> RunReport {
        let mut report = RunReport::new(today);

        info!(
            run_id = %report.run_id,
            as_of = %today,
            users = entries.len(),
            "Campaign run started"
        );

        for (idx, entry) in entries.into_iter().enumerate() {
            let result = match entry {
                Ok(user) => {
                    let outcome = self.process_user(&user, today).await;
                    UserResult {
                        row: idx + 1,
                        user_id: Some(user.user_id),
                        phone: Some(user.phone),
                        outcome,
                    }
                }
                Err(rejection) => {
                    warn!(
                        row = rejection.row,
                        user_id = ?rejection.user_id,
                        reason = %rejection.reason,
                        "Skipping invalid user record"
                    );
                    metrics::counter!("winback.records_rejected").increment(1);
                    UserResult {
                        row: rejection.row,
                        user_id: rejection.user_id,
                        phone: rejection.phone,
                        outcome: UserOutcome::Rejected {
                            reason: rejection.reason,
                        },
                    }
                }
            };
            report.results.push(result);
        }

        report.coupons_remaining = self.allocator.remaining();
        report.write_back = WriteBack::Skipped {
            reason: "write-back not requested".to_string(),
        };
        report
    }

    /// Load users from `source`, run the campaign and, when `write_back` is
    /// set, persist the notified flag. A source failure aborts before any
    /// user is processed.
    pub async fn execute(
        &self,
        source: &UserSource,
        today: NaiveDate,
        write_back: bool,
    ) -> WinbackResult<RunReport> {
        let entries = match source.load().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(source = %source.describe(), error = %e, "User source unavailable, aborting run");
                return Err(e);
            }
        };

        let mut report = self.run(entries, today).await;

        if write_back {
            report.write_back = match source.recorder() {
                Some(recorder) => record_sent(&recorder, &report),
                None => WriteBack::Skipped {
                    reason: format!("source {} does not support write-back", source.describe()),
                },
            };
        }

        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            no_coupons_left = summary.no_coupons_left,
            not_eligible = summary.not_eligible,
            already_notified = summary.already_notified,
            rejected = summary.rejected,
            coupons_remaining = report.coupons_remaining,
            write_back = ?report.write_back,
            "Campaign run finished"
        );

        Ok(report)
    }
}

fn record_sent(recorder: &dyn ResultRecorder, report: &RunReport) -> WriteBack {
    let sent = report.sent_user_ids();
    if sent.is_empty() {
        return WriteBack::Skipped {
            reason: "no coupons were sent".to_string(),
        };
    }

    match recorder.mark_notified(&sent) {
        Ok(changed) => WriteBack::Written {
            target: recorder.target(),
            changed,
        },
        Err(e) => {
            error!(target = %recorder.target(), error = %e, "Failed to write notified flags");
            WriteBack::Failed {
                target: recorder.target(),
                error: e.to_string(),
            }
        }
    }
}
