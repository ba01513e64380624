use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use tracing::{info, warn};
use winback_core::config::{SourceConfig, SourceKind};
use winback_core::error::{WinbackError, WinbackResult};
use winback_core::types::{
    parse_flag, parse_last_recharge, RecordRejection, UserEntry, UserRecord, DEFAULT_DISPLAY_NAME,
};

use crate::recorder::CsvRecorder;

/// Columns every CSV source must provide.
pub const REQUIRED_COLUMNS: [&str; 3] = ["user_id", "phone", "last_recharge"];

/// Accepted names of the notified flag column, in lookup order.
pub const FLAG_COLUMNS: [&str; 2] = ["renewed", "notified"];

// ---------------------------------------------------------------------------
// Row validation shared by both sources
// ---------------------------------------------------------------------------

/// Untyped row as read from a source, before validation.
#[derive(Debug, Clone, Default)]
struct RawUser {
    user_id: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    last_recharge: Option<String>,
    notified: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawUser {
    fn into_entry(self, row: usize) -> UserEntry {
        let user_id = non_blank(self.user_id);
        let phone = non_blank(self.phone);

        let reject = |reason: String| RecordRejection {
            row,
            user_id: user_id.clone(),
            phone: phone.clone(),
            reason,
        };

        let Some(id) = user_id.clone() else {
            return Err(reject("missing user_id".to_string()));
        };
        let Some(number) = phone.clone() else {
            return Err(reject("missing phone".to_string()));
        };
        let Some(raw_date) = non_blank(self.last_recharge) else {
            return Err(reject("missing last_recharge".to_string()));
        };
        let last_recharge = parse_last_recharge(&raw_date).map_err(reject)?;

        Ok(UserRecord {
            user_id: id,
            name: non_blank(self.name).unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            phone: number,
            last_recharge,
            notified: self.notified,
        })
    }
}

// ---------------------------------------------------------------------------
// CSV file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CsvUserSource {
    path: PathBuf,
}

impl CsvUserSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row. A missing file or missing required column aborts the
    /// load; a bad row only rejects that row.
    pub fn load(&self) -> WinbackResult<Vec<UserEntry>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| {
                WinbackError::SourceUnavailable(format!(
                    "cannot open {}: {e}",
                    self.path.display()
                ))
            })?;

        let headers = reader
            .headers()
            .map_err(|e| {
                WinbackError::SourceUnavailable(format!(
                    "cannot read header of {}: {e}",
                    self.path.display()
                ))
            })?
            .clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
        };

        if let Some(missing) = REQUIRED_COLUMNS.iter().find(|&&c| column(c).is_none()) {
            return Err(WinbackError::SourceUnavailable(format!(
                "{} has no '{missing}' column",
                self.path.display()
            )));
        }

        let id_col = column("user_id");
        let name_col = column("name");
        let phone_col = column("phone");
        let date_col = column("last_recharge");
        let flag_col = FLAG_COLUMNS.iter().find_map(|&c| column(c));

        let mut entries = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let row = idx + 1;
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    entries.push(Err(RecordRejection {
                        row,
                        user_id: None,
                        phone: None,
                        reason: format!("unreadable row: {e}"),
                    }));
                    continue;
                }
            };

            let field = |col: Option<usize>| col.and_then(|i| record.get(i)).map(String::from);
            let raw = RawUser {
                user_id: field(id_col),
                name: field(name_col),
                phone: field(phone_col),
                last_recharge: field(date_col),
                notified: field(flag_col).map(|v| parse_flag(&v)).unwrap_or(false),
            };
            entries.push(raw.into_entry(row));
        }

        info!(
            path = %self.path.display(),
            rows = entries.len(),
            rejected = entries.iter().filter(|e| e.is_err()).count(),
            "Users loaded from CSV"
        );

        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// CRM HTTP endpoint
// ---------------------------------------------------------------------------

pub struct ApiUserSource {
    client: reqwest::Client,
    url: String,
}

impl ApiUserSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> WinbackResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WinbackError::Internal(anyhow!("failed to build source client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the user list. Any transport error, non-2xx status or body that
    /// is not a JSON array aborts the load.
    pub async fn load(&self) -> WinbackResult<Vec<UserEntry>> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            WinbackError::SourceUnavailable(format!("user API {} unreachable: {e}", self.url))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WinbackError::SourceUnavailable(format!(
                "user API {} returned {status}: {}",
                self.url,
                text.trim()
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            WinbackError::SourceUnavailable(format!("user API {} sent invalid JSON: {e}", self.url))
        })?;

        let entries = parse_api_users(&body)?;

        info!(
            url = %self.url,
            rows = entries.len(),
            rejected = entries.iter().filter(|e| e.is_err()).count(),
            "Users loaded from API"
        );

        Ok(entries)
    }
}

/// Render a JSON scalar as text. Ids may arrive as numbers.
fn scalar_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_flag(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => parse_flag(s),
        _ => false,
    }
}

fn parse_api_users(body: &serde_json::Value) -> WinbackResult<Vec<UserEntry>> {
    let rows = body.as_array().ok_or_else(|| {
        WinbackError::SourceUnavailable("user API response is not a JSON array".to_string())
    })?;

    Ok(rows
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let row = idx + 1;
            if !raw.is_object() {
                return Err(RecordRejection {
                    row,
                    user_id: None,
                    phone: None,
                    reason: "user entry is not a JSON object".to_string(),
                });
            }
            let flag = FLAG_COLUMNS.iter().find_map(|key| raw.get(*key));
            RawUser {
                user_id: scalar_text(raw.get("user_id")),
                name: scalar_text(raw.get("name")),
                phone: scalar_text(raw.get("phone")),
                last_recharge: scalar_text(raw.get("last_recharge")),
                notified: scalar_flag(flag),
            }
            .into_entry(row)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Configured source
// ---------------------------------------------------------------------------

/// The user source selected by configuration.
pub enum UserSource {
    Csv(CsvUserSource),
    Api(ApiUserSource),
}

impl UserSource {
    pub fn from_config(config: &SourceConfig) -> WinbackResult<Self> {
        Ok(match config.kind {
            SourceKind::Csv => UserSource::Csv(CsvUserSource::new(&config.csv_path)),
            SourceKind::Api => UserSource::Api(ApiUserSource::new(
                config.api_url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            UserSource::Csv(src) => format!("csv:{}", src.path().display()),
            UserSource::Api(src) => format!("api:{}", src.url()),
        }
    }

    pub async fn load(&self) -> WinbackResult<Vec<UserEntry>> {
        match self {
            UserSource::Csv(src) => src.load(),
            UserSource::Api(src) => src.load().await,
        }
    }

    /// Recorder able to persist the notified flag, if the source has one.
    pub fn recorder(&self) -> Option<CsvRecorder> {
        match self {
            UserSource::Csv(src) => Some(CsvRecorder::new(src.path())),
            UserSource::Api(src) => {
                warn!(url = %src.url(), "User API source has no write-back; notified flags stay unchanged");
                None
            }
        }
    }
}
