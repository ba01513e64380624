//! Customer data sources for win-back campaigns.
//!
//! Sources: load user records from a CSV file or a CRM HTTP endpoint,
//! validating each row at load time.
//! Recorder: writes the notified flag back to the CSV after a run.

pub mod recorder;
pub mod sources;

pub use recorder::{CsvRecorder, ResultRecorder};
pub use sources::{ApiUserSource, CsvUserSource, UserSource};
