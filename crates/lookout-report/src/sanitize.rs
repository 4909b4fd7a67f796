//! Payload sanitization at the ingestion boundary
//!
//! Bounds the size and shape of producer payloads and replaces personally
//! identifiable information with generic placeholders before anything is
//! filtered, queued or forwarded.

use lookout_core::config::SanitizeConfig;
use lookout_core::domain::Payload;
use regex::Regex;
use serde_json::Value;

/// Replacement for containers nested deeper than `max_depth`
pub const COMPLEX_OBJECT: &str = "[Complex Object]";

/// Suffix appended to truncated strings
const TRUNCATED: &str = "…[truncated]";

/// Usernames shorter than this are not stripped
const MIN_USERNAME_LEN: usize = 3;

/// Sanitizes payloads based on the provided configuration.
#[derive(Debug, Clone)]
pub struct PayloadSanitizer {
    max_depth: usize,
    max_string_len: usize,
    strip_paths: bool,
    strip_usernames: bool,
    home_dir: String,
    /// Matches the login name as a whole word only
    username: Option<Regex>,
}

impl PayloadSanitizer {
    /// Creates a new `PayloadSanitizer` from configuration.
    pub fn new(config: &SanitizeConfig) -> Self {
        let home_dir = dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_default();

        Self::with_identity(config, home_dir, username)
    }

    /// Creates a sanitizer with an explicit home directory and username.
    pub fn with_identity(
        config: &SanitizeConfig,
        home_dir: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let username = username.into();
        let username = if username.chars().count() >= MIN_USERNAME_LEN {
            Regex::new(&format!(r"\b{}\b", regex::escape(&username))).ok()
        } else {
            None
        };

        Self {
            max_depth: config.max_depth.max(1),
            max_string_len: config.max_string_len,
            strip_paths: config.strip_paths,
            strip_usernames: config.strip_usernames,
            home_dir: home_dir.into(),
            username,
        }
    }

    /// Sanitize every value of `payload`.
    pub fn sanitize(&self, payload: Payload) -> Payload {
        payload
            .into_iter()
            .map(|(key, value)| (key, self.sanitize_value(value, 1)))
            .collect()
    }

    fn sanitize_value(&self, value: Value, depth: usize) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize_text(&s)),
            Value::Array(items) => {
                if depth >= self.max_depth {
                    return Value::String(COMPLEX_OBJECT.to_string());
                }
                Value::Array(
                    items
                        .into_iter()
                        .map(|v| self.sanitize_value(v, depth + 1))
                        .collect(),
                )
            }
            Value::Object(map) => {
                if depth >= self.max_depth {
                    return Value::String(COMPLEX_OBJECT.to_string());
                }
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, self.sanitize_value(v, depth + 1)))
                        .collect(),
                )
            }
            other => other,
        }
    }

    /// Strip identity and bound the length of a single string.
    pub fn sanitize_text(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.strip_paths && !self.home_dir.is_empty() {
            result = result.replace(&self.home_dir, "<HOME>");
        }

        if self.strip_usernames {
            if let Some(username) = &self.username {
                result = username.replace_all(&result, "<USER>").into_owned();
            }
        }

        if result.chars().count() > self.max_string_len {
            result = result.chars().take(self.max_string_len).collect();
            result.push_str(TRUNCATED);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(max_depth: usize, max_string_len: usize, strip: bool) -> SanitizeConfig {
        SanitizeConfig {
            max_depth,
            max_string_len,
            strip_paths: strip,
            strip_usernames: strip,
        }
    }

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_strip_home_and_username() {
        let sanitizer =
            PayloadSanitizer::with_identity(&config(8, 1000, true), "/home/alice", "alice");
        let out = sanitizer.sanitize(payload(json!({
            "stack": "at /home/alice/app/main.rs:10",
            "user": "alice logged in"
        })));
        assert_eq!(out["stack"], "at <HOME>/app/main.rs:10");
        assert_eq!(out["user"], "<USER> logged in");
    }

    #[test]
    fn test_short_username_is_not_stripped() {
        let sanitizer = PayloadSanitizer::with_identity(&config(8, 1000, true), "", "al");
        assert_eq!(sanitizer.sanitize_text("also fine"), "also fine");
    }

    #[test]
    fn test_username_inside_a_word_is_kept() {
        let sanitizer = PayloadSanitizer::with_identity(&config(8, 1000, true), "", "app");
        assert_eq!(
            sanitizer.sanitize_text("application-start"),
            "application-start"
        );
        assert_eq!(sanitizer.sanitize_text("happy path"), "happy path");
        assert_eq!(
            sanitizer.sanitize_text("/srv/app/logs by app"),
            "/srv/<USER>/logs by <USER>"
        );
    }

    #[test]
    fn test_no_stripping_when_disabled() {
        let sanitizer =
            PayloadSanitizer::with_identity(&config(8, 1000, false), "/home/alice", "alice");
        let text = "/home/alice is alice";
        assert_eq!(sanitizer.sanitize_text(text), text);
    }

    #[test]
    fn test_deep_containers_become_marker() {
        let sanitizer = PayloadSanitizer::with_identity(&config(2, 1000, false), "", "");
        let out = sanitizer.sanitize(payload(json!({
            "shallow": {"a": 1},
            "deep": {"a": {"b": 1}},
            "list": [[1]]
        })));
        assert_eq!(out["shallow"], json!({"a": 1}));
        assert_eq!(out["deep"], json!({"a": COMPLEX_OBJECT}));
        assert_eq!(out["list"], json!([COMPLEX_OBJECT]));
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let sanitizer = PayloadSanitizer::with_identity(&config(8, 5, false), "", "");
        let out = sanitizer.sanitize(payload(json!({"message": "abcdefghij", "n": 42})));
        assert_eq!(out["message"], format!("abcde{TRUNCATED}"));
        assert_eq!(out["n"], 42);
    }

    #[test]
    fn test_scalars_pass_through() {
        let sanitizer = PayloadSanitizer::new(&SanitizeConfig::default());
        let input = payload(json!({"ok": true, "n": 1.5, "none": null}));
        assert_eq!(sanitizer.sanitize(input.clone()), input);
    }
}
