use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{WinbackError, WinbackResult};
use crate::loyalty::SlabTable;

/// Config file picked up from the working directory when `--config` is not
/// given. Its absence is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "winback.toml";

/// Root application configuration. Loaded from an optional TOML file
/// overlaid with environment variables prefixed `WINBACK__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub coupons: CouponConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
}

// ─── Messaging Provider ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_messaging_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_messaging_api_url() -> String {
    "https://backend.sensy.ai/sendMessage".to_string()
}
fn default_template_name() -> String {
    "user_coupon_offer".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            api_url: default_messaging_api_url(),
            api_key: String::new(),
            template_name: default_template_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ─── User Source ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Csv,
    Api,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(SourceKind::Csv),
            "api" => Ok(SourceKind::Api),
            other => Err(format!("unknown user source '{other}', expected 'csv' or 'api'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
    #[serde(default)]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("users.csv")
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            csv_path: default_csv_path(),
            api_url: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ─── Coupons ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CouponStrategy {
    /// Hand out pre-provisioned codes in order until none are left.
    Pool,
    /// Mint a random code per eligible user.
    #[default]
    Generator,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponConfig {
    #[serde(default)]
    pub strategy: CouponStrategy,
    #[serde(default)]
    pub pool: Vec<String>,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    #[serde(default)]
    pub prefix: String,
    /// Put a coupon back at the head of the pool when its send fails.
    #[serde(default)]
    pub reclaim_on_failure: bool,
}

/// Allowed length of a generated coupon body, prefix excluded.
pub const CODE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

fn default_code_length() -> usize {
    8
}

impl Default for CouponConfig {
    fn default() -> Self {
        Self {
            strategy: CouponStrategy::default(),
            pool: Vec::new(),
            code_length: default_code_length(),
            prefix: String::new(),
            reclaim_on_failure: false,
        }
    }
}

// ─── Campaign ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    /// Days a coupon stays valid, counted from the as-of date.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_write_back")]
    pub write_back: bool,
    #[serde(default)]
    pub slabs: SlabTable,
}

fn default_validity_days() -> u32 {
    5
}
fn default_write_back() -> bool {
    true
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
            write_back: default_write_back(),
            slabs: SlabTable::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// An explicit `path` must exist; otherwise `winback.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder().add_source(file).add_source(
            config::Environment::with_prefix("WINBACK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("coupons.pool"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Check cross-field requirements that serde defaults cannot express.
    pub fn validate(&self) -> WinbackResult<()> {
        if self.messaging.api_key.trim().is_empty() {
            return Err(WinbackError::Config(
                "messaging.api_key must be set".to_string(),
            ));
        }
        validate_http_url("messaging.api_url", &self.messaging.api_url)?;
        if self.messaging.template_name.trim().is_empty() {
            return Err(WinbackError::Config(
                "messaging.template_name must not be empty".to_string(),
            ));
        }
        if self.messaging.timeout_secs == 0 || self.source.timeout_secs == 0 {
            return Err(WinbackError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }

        if !(1..=365).contains(&self.campaign.validity_days) {
            return Err(WinbackError::Config(format!(
                "campaign.validity_days must be between 1 and 365, got {}",
                self.campaign.validity_days
            )));
        }

        match self.source.kind {
            SourceKind::Csv => {
                if self.source.csv_path.as_os_str().is_empty() {
                    return Err(WinbackError::Config(
                        "source.csv_path must be set for the csv source".to_string(),
                    ));
                }
            }
            SourceKind::Api => validate_http_url("source.api_url", &self.source.api_url)?,
        }

        match self.coupons.strategy {
            CouponStrategy::Pool => {
                if self.coupons.pool.is_empty() {
                    return Err(WinbackError::Config(
                        "coupons.pool must list at least one code for the pool strategy"
                            .to_string(),
                    ));
                }
            }
            CouponStrategy::Generator => {
                if !CODE_LENGTH_RANGE.contains(&self.coupons.code_length) {
                    return Err(WinbackError::Config(format!(
                        "coupons.code_length must be between {} and {}, got {}",
                        CODE_LENGTH_RANGE.start(),
                        CODE_LENGTH_RANGE.end(),
                        self.coupons.code_length
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, raw: &str) -> WinbackResult<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| WinbackError::Config(format!("{field} is not a valid URL ({raw:?}): {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WinbackError::Config(format!(
            "{field} must use http or https, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.messaging.api_key = "test-key".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.messaging.template_name, "user_coupon_offer");
        assert_eq!(config.messaging.timeout_secs, 10);
        assert_eq!(config.source.kind, SourceKind::Csv);
        assert_eq!(config.source.csv_path, PathBuf::from("users.csv"));
        assert_eq!(config.coupons.strategy, CouponStrategy::Generator);
        assert_eq!(config.coupons.code_length, 8);
        assert_eq!(config.campaign.validity_days, 5);
        assert!(config.campaign.write_back);
        assert_eq!(config.campaign.slabs, SlabTable::default());
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(WinbackError::Config(_))));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_api_source_needs_url() {
        let mut config = valid_config();
        config.source.kind = SourceKind::Api;
        assert!(config.validate().is_err());

        config.source.api_url = "ftp://crm.internal/users".to_string();
        assert!(config.validate().is_err());

        config.source.api_url = "https://crm.internal/api/users".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_pool_strategy_needs_codes() {
        let mut config = valid_config();
        config.coupons.strategy = CouponStrategy::Pool;
        assert!(config.validate().is_err());

        config.coupons.pool = vec!["SAVE-FD1031".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_code_length_bounds() {
        let mut config = valid_config();
        config.coupons.code_length = 2;
        assert!(config.validate().is_err());
        config.coupons.code_length = 12;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_validity_window() {
        let mut config = valid_config();
        config.campaign.validity_days = 0;
        assert!(config.validate().is_err());
        config.campaign.validity_days = 30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("CSV".parse::<SourceKind>().unwrap(), SourceKind::Csv);
        assert_eq!("api".parse::<SourceKind>().unwrap(), SourceKind::Api);
        assert!("sheet".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[messaging]
api_key = "file-key"
template_name = "discount_coupon"

[source]
kind = "api"
api_url = "https://crm.example.com/api/users"

[coupons]
strategy = "pool"
pool = ["SAVE-XA1234", "SAVE-ZB5678"]

[campaign]
validity_days = 7
write_back = false
slabs = [
  {{ min_days = 0, max_days = 7, percent = 0 }},
  {{ min_days = 8, max_days = 30, percent = 15 }},
]
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.messaging.api_key, "file-key");
        assert_eq!(config.messaging.template_name, "discount_coupon");
        assert_eq!(config.source.kind, SourceKind::Api);
        assert_eq!(config.coupons.strategy, CouponStrategy::Pool);
        assert_eq!(config.coupons.pool, vec!["SAVE-XA1234", "SAVE-ZB5678"]);
        assert_eq!(config.campaign.validity_days, 7);
        assert!(!config.campaign.write_back);
        assert_eq!(config.campaign.slabs.slabs().len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_overlapping_slabs() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[campaign]
slabs = [
  {{ min_days = 0, max_days = 10, percent = 5 }},
  {{ min_days = 5, max_days = 30, percent = 15 }},
]
"#
        )
        .unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let missing = Path::new("/definitely/not/here/winback.toml");
        assert!(AppConfig::load(Some(missing)).is_err());
    }
}
