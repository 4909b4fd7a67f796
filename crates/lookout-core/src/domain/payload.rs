//! Telemetry payloads and their classification
//!
//! A payload is a schema-less JSON object produced by an event source.
//! The core never recovers strong typing for payload contents; it only
//! reads the optional `level` field and stamps the application identity
//! fields before delivery.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;

/// Open-ended telemetry record: string keys to arbitrary JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// Wire keys stamped onto or read from every payload.
pub mod keys {
    pub const APP_ID: &str = "appId";
    pub const APP_VERSION: &str = "appVersion";
    pub const ENVIRONMENT: &str = "environment";
    pub const CATEGORY: &str = "category";
    pub const LEVEL: &str = "level";
}

// ============================================================================
// Category
// ============================================================================

/// Discriminator stamped onto every payload as `category`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Produced by `report_error`
    Error,
    /// Produced by `report_performance`
    Performance,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Error => "error",
            Category::Performance => "performance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Category::Error),
            "performance" => Ok(Category::Performance),
            other => Err(DomainError::InvalidCategory(other.to_string())),
        }
    }
}

// ============================================================================
// ReportLevel
// ============================================================================

/// Configured report level for error reports
///
/// Only [`ReportLevel::Error`] filters; see [`ReportLevel::admits`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
}

impl ReportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportLevel::Debug => "debug",
            ReportLevel::Info => "info",
            ReportLevel::Warning => "warning",
            ReportLevel::Error => "error",
        }
    }

    /// Whether a record carrying `level` passes this threshold.
    ///
    /// Only the [`ReportLevel::Error`] threshold filters: it admits records
    /// with no level or with level `"error"`. Every other threshold admits
    /// everything.
    pub fn admits(self, level: RecordLevel<'_>) -> bool {
        if self != ReportLevel::Error {
            return true;
        }
        match level {
            RecordLevel::Absent => true,
            RecordLevel::Named(raw) => raw == "error",
            RecordLevel::Other => false,
        }
    }
}

/// The `level` field as found on a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLevel<'a> {
    /// No `level` key
    Absent,
    /// A string level, recognized or not
    Named(&'a str),
    /// A `level` key holding a non-string value
    Other,
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(ReportLevel::Debug),
            "info" => Ok(ReportLevel::Info),
            "warning" | "warn" => Ok(ReportLevel::Warning),
            "error" => Ok(ReportLevel::Error),
            other => Err(DomainError::InvalidLevel(other.to_string())),
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Deployment environment stamped onto every payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(DomainError::InvalidEnvironment(other.to_string())),
        }
    }
}

// ============================================================================
// AppStamp
// ============================================================================

/// Application identity stamped onto every accepted payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStamp {
    pub app_id: String,
    pub app_version: String,
    pub environment: Environment,
}

impl AppStamp {
    /// Writes the identity fields and `category` into `payload`.
    ///
    /// Stamped fields overwrite producer-supplied values with the same key.
    pub fn apply(&self, payload: &mut Payload, category: Category) {
        payload.insert(keys::APP_ID.into(), Value::String(self.app_id.clone()));
        payload.insert(
            keys::APP_VERSION.into(),
            Value::String(self.app_version.clone()),
        );
        payload.insert(
            keys::ENVIRONMENT.into(),
            Value::String(self.environment.as_str().into()),
        );
        payload.insert(
            keys::CATEGORY.into(),
            Value::String(category.as_str().into()),
        );
    }
}

/// Reads the `level` field of a payload.
pub fn record_level(payload: &Payload) -> RecordLevel<'_> {
    match payload.get(keys::LEVEL) {
        None => RecordLevel::Absent,
        Some(Value::String(level)) => RecordLevel::Named(level.as_str()),
        Some(_) => RecordLevel::Other,
    }
}

/// Reads the `category` discriminator of a stamped payload.
pub fn payload_category(payload: &Payload) -> Option<Category> {
    payload
        .get(keys::CATEGORY)
        .and_then(Value::as_str)
        .and_then(|c| c.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp() -> AppStamp {
        AppStamp {
            app_id: "shop-web".to_string(),
            app_version: "2.4.1".to_string(),
            environment: Environment::Test,
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(ReportLevel::Debug < ReportLevel::Info);
        assert!(ReportLevel::Info < ReportLevel::Warning);
        assert!(ReportLevel::Warning < ReportLevel::Error);
    }

    #[test]
    fn test_error_threshold_admits_only_errors_and_missing_level() {
        let threshold = ReportLevel::Error;
        assert!(threshold.admits(RecordLevel::Absent));
        assert!(threshold.admits(RecordLevel::Named("error")));
        assert!(!threshold.admits(RecordLevel::Named("warning")));
        assert!(!threshold.admits(RecordLevel::Named("info")));
        assert!(!threshold.admits(RecordLevel::Named("fatal")));
        assert!(!threshold.admits(RecordLevel::Other));
    }

    #[test]
    fn test_lower_thresholds_admit_everything() {
        for threshold in [ReportLevel::Warning, ReportLevel::Info, ReportLevel::Debug] {
            assert!(threshold.admits(RecordLevel::Absent));
            assert!(threshold.admits(RecordLevel::Named("debug")));
            assert!(threshold.admits(RecordLevel::Named("something-else")));
            assert!(threshold.admits(RecordLevel::Other));
        }
    }

    #[test]
    fn test_level_parse_rejects_unknown() {
        let err = "verbose".parse::<ReportLevel>().unwrap_err();
        assert_eq!(err, DomainError::InvalidLevel("verbose".to_string()));
    }

    #[test]
    fn test_stamp_overwrites_and_adds_fields() {
        let mut payload = json!({"message": "boom", "appId": "spoofed"})
            .as_object()
            .cloned()
            .unwrap();

        stamp().apply(&mut payload, Category::Error);

        assert_eq!(payload["message"], "boom");
        assert_eq!(payload["appId"], "shop-web");
        assert_eq!(payload["appVersion"], "2.4.1");
        assert_eq!(payload["environment"], "test");
        assert_eq!(payload["category"], "error");
        assert_eq!(payload_category(&payload), Some(Category::Error));
    }

    #[test]
    fn test_record_level_distinguishes_absent_from_non_string() {
        let payload = json!({"level": 30}).as_object().cloned().unwrap();
        assert_eq!(record_level(&payload), RecordLevel::Other);

        let payload = json!({"level": null}).as_object().cloned().unwrap();
        assert_eq!(record_level(&payload), RecordLevel::Other);

        let payload = json!({"level": "info"}).as_object().cloned().unwrap();
        assert_eq!(record_level(&payload), RecordLevel::Named("info"));

        assert_eq!(record_level(&Payload::new()), RecordLevel::Absent);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&Category::Performance).unwrap(),
            "\"performance\""
        );
        assert_eq!(
            serde_json::to_string(&ReportLevel::Warning).unwrap(),
            "\"warning\""
        );
        let env: Environment = serde_json::from_str("\"development\"").unwrap();
        assert_eq!(env, Environment::Development);
    }
}
