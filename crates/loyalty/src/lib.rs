//! Win-back eligibility and coupon allocation.
//!
//! Classifier: maps days since the last recharge onto the configured
//! discount slabs.
//! Coupons: hands out one code per eligible user, from a finite pool or a
//! random generator.

pub mod classifier;
pub mod coupons;

pub use classifier::EligibilityClassifier;
pub use coupons::{Allocation, CouponAllocator, CouponGenerator, CouponPool};
