//! Coupon allocation: a finite FIFO pool of pre-provisioned codes, or a
//! random code generator.
//!
//! Generated codes are unique within a run but only probabilistically unique
//! across runs: 36^8 (about 2.8e12) combinations at the default length.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};
use winback_core::config::{CouponConfig, CouponStrategy, CODE_LENGTH_RANGE};
use winback_core::error::{WinbackError, WinbackResult};

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Result of asking the allocator for a coupon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Issued(String),
    /// The pool is empty. Not an error: the user is skipped.
    Exhausted,
}

// ─── Finite Pool ────────────────────────────────────────────────────────────

/// Pre-provisioned codes handed out first-in-first-out, each at most once.
#[derive(Debug)]
pub struct CouponPool {
    codes: Mutex<VecDeque<String>>,
    initial: usize,
}

impl CouponPool {
    /// Build a pool. Blank or duplicate codes are rejected.
    pub fn new<I, S>(codes: I) -> WinbackResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for code in codes {
            let code = code.into().trim().to_string();
            if code.is_empty() {
                return Err(WinbackError::InvalidCoupons(
                    "coupon pool contains a blank code".to_string(),
                ));
            }
            if !seen.insert(code.clone()) {
                return Err(WinbackError::InvalidCoupons(format!(
                    "coupon code {code} appears more than once"
                )));
            }
            queue.push_back(code);
        }

        let initial = queue.len();
        Ok(Self {
            codes: Mutex::new(queue),
            initial,
        })
    }

    /// Take the next code, or report exhaustion. Holds the lock for the
    /// whole check-and-pop.
    pub fn take(&self) -> Allocation {
        match self.codes.lock().pop_front() {
            Some(code) => Allocation::Issued(code),
            None => Allocation::Exhausted,
        }
    }

    /// Put a code back at the head of the queue.
    pub fn restore(&self, code: String) {
        self.codes.lock().push_front(code);
    }

    pub fn remaining(&self) -> usize {
        self.codes.lock().len()
    }

    pub fn initial_size(&self) -> usize {
        self.initial
    }
}

// ─── Generator ──────────────────────────────────────────────────────────────

/// Mints random upper-case alphanumeric codes, optionally prefixed.
#[derive(Debug)]
pub struct CouponGenerator {
    length: usize,
    prefix: String,
    issued: Mutex<HashSet<String>>,
}

impl CouponGenerator {
    /// Lengths outside `CODE_LENGTH_RANGE` are rejected.
    pub fn new(length: usize, prefix: impl Into<String>) -> WinbackResult<Self> {
        if !CODE_LENGTH_RANGE.contains(&length) {
            return Err(WinbackError::InvalidCoupons(format!(
                "generated coupon length must be between {} and {}, got {length}",
                CODE_LENGTH_RANGE.start(),
                CODE_LENGTH_RANGE.end(),
            )));
        }
        Ok(Self {
            length,
            prefix: prefix.into(),
            issued: Mutex::new(HashSet::new()),
        })
    }

    fn random_code(&self) -> String {
        let mut rng = rand::thread_rng();
        let body: String = (0..self.length)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect();
        format!("{}{}", self.prefix, body)
    }

    /// Generate a code not yet issued in this run.
    pub fn generate(&self) -> String {
        let mut issued = self.issued.lock();
        loop {
            let code = self.random_code();
            if issued.insert(code.clone()) {
                return code;
            }
            debug!(code = %code, "Generated coupon collided within run, redrawing");
        }
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

// ─── Allocator ──────────────────────────────────────────────────────────────

/// The configured coupon source for a run.
#[derive(Debug)]
pub enum CouponAllocator {
    Pool(CouponPool),
    Generator(CouponGenerator),
}

impl CouponAllocator {
    pub fn from_config(config: &CouponConfig) -> WinbackResult<Self> {
        let allocator = match config.strategy {
            CouponStrategy::Pool => CouponAllocator::Pool(CouponPool::new(config.pool.iter().cloned())?),
            CouponStrategy::Generator => CouponAllocator::Generator(CouponGenerator::new(
                config.code_length,
                config.prefix.clone(),
            )?),
        };

        info!(
            strategy = ?config.strategy,
            pool_size = allocator.remaining(),
            code_length = config.code_length,
            "Coupon allocator initialized"
        );

        Ok(allocator)
    }

    pub fn allocate(&self) -> Allocation {
        let allocation = match self {
            CouponAllocator::Pool(pool) => pool.take(),
            CouponAllocator::Generator(generator) => Allocation::Issued(generator.generate()),
        };

        match &allocation {
            Allocation::Issued(_) => metrics::counter!("winback.coupons_allocated").increment(1),
            Allocation::Exhausted => metrics::counter!("winback.coupons_exhausted").increment(1),
        }

        allocation
    }

    /// Return an unused code. Generated codes are simply dropped.
    pub fn reclaim(&self, code: String) {
        match self {
            CouponAllocator::Pool(pool) => {
                debug!(code = %code, "Coupon returned to pool");
                pool.restore(code);
            }
            CouponAllocator::Generator(_) => {
                warn!(code = %code, "Generated coupon discarded, generator has no pool to return to");
            }
        }
    }

    /// Codes left in the pool. `None` for the generator, which never runs out.
    pub fn remaining(&self) -> Option<usize> {
        match self {
            CouponAllocator::Pool(pool) => Some(pool.remaining()),
            CouponAllocator::Generator(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_is_fifo_and_exhausts() {
        let pool = CouponPool::new(["SAVE-FD1031", "SAVE-LT5738"]).unwrap();
        assert_eq!(pool.initial_size(), 2);
        assert_eq!(pool.take(), Allocation::Issued("SAVE-FD1031".to_string()));
        assert_eq!(pool.take(), Allocation::Issued("SAVE-LT5738".to_string()));
        assert_eq!(pool.take(), Allocation::Exhausted);
        assert_eq!(pool.take(), Allocation::Exhausted);
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn test_pool_rejects_duplicates_and_blanks() {
        assert!(matches!(
            CouponPool::new(["SAVE-A", "SAVE-B", "SAVE-A"]),
            Err(WinbackError::InvalidCoupons(_))
        ));
        assert!(CouponPool::new(["SAVE-A", "  "]).is_err());
    }

    #[test]
    fn test_pool_restore_goes_to_front() {
        let pool = CouponPool::new(["A1", "B2"]).unwrap();
        let Allocation::Issued(first) = pool.take() else {
            panic!("expected a code");
        };
        pool.restore(first);
        assert_eq!(pool.take(), Allocation::Issued("A1".to_string()));
    }

    #[test]
    fn test_pool_never_issues_more_than_initial() {
        let pool = CouponPool::new((0..5).map(|i| format!("SAVE-{i:04}"))).unwrap();
        let issued = (0..20)
            .filter(|_| matches!(pool.take(), Allocation::Issued(_)))
            .count();
        assert_eq!(issued, 5);
    }

    #[test]
    fn test_generator_shape() {
        let generator = CouponGenerator::new(8, "WB-").unwrap();
        let code = generator.generate();
        assert_eq!(code.len(), 11);
        assert!(code.starts_with("WB-"));
        assert!(code[3..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generator_unique_within_run() {
        let generator = CouponGenerator::new(4, "").unwrap();
        let codes: HashSet<String> = (0..500).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 500);
        assert_eq!(generator.issued_count(), 500);
    }

    #[test]
    fn test_generator_rejects_out_of_range_length() {
        assert!(CouponGenerator::new(0, "").is_err());
        assert!(CouponGenerator::new(1, "").is_err());
        assert!(CouponGenerator::new(3, "WB-").is_err());
        assert!(CouponGenerator::new(33, "").is_err());
        assert!(CouponGenerator::new(4, "").is_ok());
        assert!(CouponGenerator::new(32, "").is_ok());
    }

    #[test]
    fn test_allocator_from_config() {
        let config = CouponConfig {
            strategy: CouponStrategy::Pool,
            pool: vec!["SAVE-XA1234".to_string()],
            ..Default::default()
        };
        let allocator = CouponAllocator::from_config(&config).unwrap();
        assert_eq!(allocator.remaining(), Some(1));
        assert_eq!(
            allocator.allocate(),
            Allocation::Issued("SAVE-XA1234".to_string())
        );
        assert_eq!(allocator.allocate(), Allocation::Exhausted);

        allocator.reclaim("SAVE-XA1234".to_string());
        assert_eq!(allocator.remaining(), Some(1));

        let generator = CouponAllocator::from_config(&CouponConfig::default()).unwrap();
        assert_eq!(generator.remaining(), None);
        assert!(matches!(generator.allocate(), Allocation::Issued(code) if code.len() == 8));
    }
}
