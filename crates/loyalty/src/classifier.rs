//! Eligibility classifier: turns a last-recharge date into a discount tier.

use chrono::NaiveDate;
use tracing::{debug, info};
use winback_core::loyalty::{Eligibility, Ineligibility, SlabTable};
use winback_core::types::UserRecord;

/// Stateless classification over a validated slab table.
#[derive(Debug, Clone)]
pub struct EligibilityClassifier {
    slabs: SlabTable,
}

impl EligibilityClassifier {
    pub fn new(slabs: &SlabTable) -> Self {
        info!(
            slabs = slabs.slabs().len(),
            first_day = slabs.slabs().first().map(|s| s.min_days),
            last_day = slabs.slabs().last().map(|s| s.max_days),
            "Eligibility classifier initialized"
        );
        Self {
            slabs: slabs.clone(),
        }
    }

    /// Classify an elapsed-day count. First matching slab wins.
    pub fn classify_days(&self, days: i64) -> Eligibility {
        if days < 0 {
            return Eligibility::NotEligible {
                reason: Ineligibility::FutureDated,
            };
        }

        match self.slabs.find(days) {
            Some(slab) if slab.percent == 0 => Eligibility::NotEligible {
                reason: Ineligibility::ZeroDiscount,
            },
            Some(slab) => Eligibility::Eligible {
                percent: slab.percent,
            },
            None => Eligibility::NotEligible {
                reason: Ineligibility::NoMatchingSlab,
            },
        }
    }

    /// Classify a user as of `today`.
    pub fn classify(&self, user: &UserRecord, today: NaiveDate) -> Eligibility {
        let days = user.days_since_recharge(today);
        let eligibility = self.classify_days(days);

        debug!(
            user_id = %user.user_id,
            days = days,
            eligibility = ?eligibility,
            "User classified"
        );

        eligibility
    }

    pub fn slabs(&self) -> &SlabTable {
        &self.slabs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winback_core::loyalty::DiscountSlab;

    fn classifier() -> EligibilityClassifier {
        EligibilityClassifier::new(&SlabTable::default())
    }

    fn user(last_recharge: NaiveDate) -> UserRecord {
        UserRecord {
            user_id: "42".to_string(),
            name: "Alok".to_string(),
            phone: "919800000042".to_string(),
            last_recharge,
            notified: false,
        }
    }

    #[test]
    fn test_slab_boundaries() {
        let c = classifier();
        let cases = [
            (0, None),
            (7, None),
            (8, Some(10)),
            (16, Some(10)),
            (17, Some(25)),
            (30, Some(25)),
            (31, Some(40)),
            (45, Some(40)),
            (46, Some(50)),
            (90, Some(50)),
            (91, Some(65)),
            (120, Some(65)),
            (121, Some(80)),
            (150, Some(80)),
            (151, Some(90)),
            (175, Some(90)),
            (176, Some(95)),
            (365, Some(95)),
            (366, None),
        ];
        for (days, expected) in cases {
            assert_eq!(c.classify_days(days).percent(), expected, "days = {days}");
        }
    }

    #[test]
    fn test_not_eligible_reasons() {
        let c = classifier();
        assert_eq!(
            c.classify_days(-1),
            Eligibility::NotEligible {
                reason: Ineligibility::FutureDated
            }
        );
        assert_eq!(
            c.classify_days(3),
            Eligibility::NotEligible {
                reason: Ineligibility::NoMatchingSlab
            }
        );
        assert_eq!(
            c.classify_days(1000),
            Eligibility::NotEligible {
                reason: Ineligibility::NoMatchingSlab
            }
        );
    }

    #[test]
    fn test_zero_percent_slab_is_not_eligible() {
        let table = SlabTable::new(vec![
            DiscountSlab::new(0, 7, 0),
            DiscountSlab::new(8, 16, 10),
        ])
        .unwrap();
        let c = EligibilityClassifier::new(&table);
        assert_eq!(
            c.classify_days(5),
            Eligibility::NotEligible {
                reason: Ineligibility::ZeroDiscount
            }
        );
        assert_eq!(c.classify_days(8).percent(), Some(10));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        for days in -5..400 {
            assert_eq!(c.classify_days(days), c.classify_days(days));
        }
    }

    #[test]
    fn test_classify_user_against_as_of_date() {
        let c = classifier();
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let ten_days_ago = user(NaiveDate::from_ymd_opt(2026, 10, 6).unwrap());
        assert_eq!(
            c.classify(&ten_days_ago, today),
            Eligibility::Eligible { percent: 10 }
        );

        let future = user(NaiveDate::from_ymd_opt(2026, 11, 1).unwrap());
        assert!(!c.classify(&future, today).is_eligible());
    }
}
