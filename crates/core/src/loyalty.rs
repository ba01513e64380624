//! Win-back discount domain types.
//!
//! A slab maps a contiguous, inclusive range of days since a user's last
//! recharge to a discount percentage. The slab table is ordered and
//! validated once when configuration is loaded.

use serde::{Deserialize, Serialize};

use crate::error::{WinbackError, WinbackResult};

// ─── Slabs ──────────────────────────────────────────────────────────────────

/// One inclusive day range and the discount it earns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountSlab {
    pub min_days: i64,
    pub max_days: i64,
    pub percent: u8,
}

impl DiscountSlab {
    pub const fn new(min_days: i64, max_days: i64, percent: u8) -> Self {
        Self {
            min_days,
            max_days,
            percent,
        }
    }

    pub fn contains(&self, days: i64) -> bool {
        self.min_days <= days && days <= self.max_days
    }
}

/// Default slabs. Users who recharged within the last week and users who
/// lapsed for more than a year fall outside every slab.
pub const DEFAULT_SLABS: [DiscountSlab; 8] = [
    DiscountSlab::new(8, 16, 10),
    DiscountSlab::new(17, 30, 25),
    DiscountSlab::new(31, 45, 40),
    DiscountSlab::new(46, 90, 50),
    DiscountSlab::new(91, 120, 65),
    DiscountSlab::new(121, 150, 80),
    DiscountSlab::new(151, 175, 90),
    DiscountSlab::new(176, 365, 95),
];

/// Ordered, non-overlapping slab table. Gaps between slabs are allowed and
/// classify as not eligible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<DiscountSlab>", into = "Vec<DiscountSlab>")]
pub struct SlabTable {
    slabs: Vec<DiscountSlab>,
}

impl SlabTable {
    /// Build a table, rejecting inverted ranges, out-of-order or overlapping
    /// slabs, negative bounds and percentages above 100.
    pub fn new(slabs: Vec<DiscountSlab>) -> WinbackResult<Self> {
        if slabs.is_empty() {
            return Err(WinbackError::InvalidSlabs(
                "at least one slab is required".to_string(),
            ));
        }

        for slab in &slabs {
            if slab.min_days < 0 {
                return Err(WinbackError::InvalidSlabs(format!(
                    "slab {}..={} starts below zero days",
                    slab.min_days, slab.max_days
                )));
            }
            if slab.min_days > slab.max_days {
                return Err(WinbackError::InvalidSlabs(format!(
                    "slab {}..={} has min_days greater than max_days",
                    slab.min_days, slab.max_days
                )));
            }
            if slab.percent > 100 {
                return Err(WinbackError::InvalidSlabs(format!(
                    "slab {}..={} has percent {} above 100",
                    slab.min_days, slab.max_days, slab.percent
                )));
            }
        }

        for pair in slabs.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.min_days <= prev.max_days {
                return Err(WinbackError::InvalidSlabs(format!(
                    "slab {}..={} overlaps or precedes slab {}..={}",
                    next.min_days, next.max_days, prev.min_days, prev.max_days
                )));
            }
        }

        Ok(Self { slabs })
    }

    pub fn slabs(&self) -> &[DiscountSlab] {
        &self.slabs
    }

    /// First slab containing `days`, if any.
    pub fn find(&self, days: i64) -> Option<&DiscountSlab> {
        self.slabs.iter().find(|slab| slab.contains(days))
    }
}

impl Default for SlabTable {
    fn default() -> Self {
        Self {
            slabs: DEFAULT_SLABS.to_vec(),
        }
    }
}

impl TryFrom<Vec<DiscountSlab>> for SlabTable {
    type Error = WinbackError;

    fn try_from(slabs: Vec<DiscountSlab>) -> Result<Self, Self::Error> {
        SlabTable::new(slabs)
    }
}

impl From<SlabTable> for Vec<DiscountSlab> {
    fn from(table: SlabTable) -> Self {
        table.slabs
    }
}

// ─── Eligibility ────────────────────────────────────────────────────────────

/// Why a user does not receive a coupon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    /// Last recharge is dated after the as-of date.
    FutureDated,
    /// Day count falls in a gap between slabs or beyond the last slab.
    NoMatchingSlab,
    /// Matching slab grants 0 %.
    ZeroDiscount,
}

impl Ineligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ineligibility::FutureDated => "future_dated",
            Ineligibility::NoMatchingSlab => "no_matching_slab",
            Ineligibility::ZeroDiscount => "zero_discount",
        }
    }
}

/// Classification result for one elapsed-day count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Eligibility {
    Eligible { percent: u8 },
    NotEligible { reason: Ineligibility },
}

impl Eligibility {
    pub fn percent(&self) -> Option<u8> {
        match self {
            Eligibility::Eligible { percent } => Some(*percent),
            Eligibility::NotEligible { .. } => None,
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}
