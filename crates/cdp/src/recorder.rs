use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, info};
use winback_core::error::{WinbackError, WinbackResult};
use winback_core::types::parse_flag;

use crate::sources::FLAG_COLUMNS;

/// Persists the notified flag for users whose coupon was delivered.
pub trait ResultRecorder: Send + Sync {
    /// Mark the given users as notified. Returns how many rows changed.
    fn mark_notified(&self, user_ids: &HashSet<String>) -> WinbackResult<usize>;

    /// Where the flags are written, for logging.
    fn target(&self) -> String;
}

/// Rewrites the source CSV in place, touching only the flag column.
#[derive(Debug, Clone)]
pub struct CsvRecorder {
    path: PathBuf,
}

impl CsvRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "users.csv".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn recorder_error(&self, action: &str, err: impl std::fmt::Display) -> WinbackError {
        WinbackError::Recorder(format!("{action} {}: {err}", self.path.display()))
    }
}

impl ResultRecorder for CsvRecorder {
    fn mark_notified(&self, user_ids: &HashSet<String>) -> WinbackResult<usize> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.recorder_error("cannot open", e))?;

        let mut headers = reader
            .headers()
            .map_err(|e| self.recorder_error("cannot read header of", e))?
            .clone();

        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let id_col = position("user_id")
            .ok_or_else(|| self.recorder_error("no user_id column in", "missing header"))?;

        let (flag_col, appended) = match FLAG_COLUMNS.iter().find_map(|&c| position(c)) {
            Some(col) => (col, false),
            None => {
                headers.push_field(FLAG_COLUMNS[0]);
                (headers.len() - 1, true)
            }
        };

        let mut rows = Vec::new();
        let mut changed = 0usize;
        for result in reader.records() {
            let record = result.map_err(|e| self.recorder_error("cannot read row of", e))?;
            let mut fields: Vec<String> = record.iter().map(String::from).collect();
            if fields.len() <= flag_col {
                fields.resize(flag_col + 1, String::new());
            }
            if appended {
                fields[flag_col] = "false".to_string();
            }

            let user_id = fields
                .get(id_col)
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            if user_ids.contains(&user_id) && !parse_flag(&fields[flag_col]) {
                fields[flag_col] = "true".to_string();
                changed += 1;
                debug!(user_id = %user_id, "Marked user as notified");
            }
            rows.push(fields);
        }
        drop(reader);

        let temp = self.temp_path();
        {
            let mut writer = csv::Writer::from_path(&temp)
                .map_err(|e| self.recorder_error("cannot create temp file for", e))?;
            writer
                .write_record(&headers)
                .map_err(|e| self.recorder_error("cannot write", e))?;
            for row in &rows {
                writer
                    .write_record(row)
                    .map_err(|e| self.recorder_error("cannot write", e))?;
            }
            writer
                .flush()
                .map_err(|e| self.recorder_error("cannot flush", e))?;
        }
        std::fs::rename(&temp, &self.path).map_err(|e| self.recorder_error("cannot replace", e))?;

        info!(
            path = %self.path.display(),
            requested = user_ids.len(),
            changed = changed,
            "Notified flags written back"
        );

        Ok(changed)
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}
