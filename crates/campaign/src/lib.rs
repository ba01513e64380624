//! Win-back campaign runner: load users, classify, allocate a coupon,
//! dispatch, and record who was notified.

pub mod report;
pub mod runner;

pub use report::{RunReport, RunSummary, UserOutcome, UserResult, WriteBack};
pub use runner::CampaignRunner;
