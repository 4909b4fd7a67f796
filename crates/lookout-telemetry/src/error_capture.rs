//! Error capture helper
//!
//! Converts errors into error payloads for the dispatcher. Each error gets
//! a stable fingerprint (`errorId`) so the collector can group repeats
//! and so repeats can be rate limited on the client.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use lookout_core::config::CaptureConfig;
use lookout_core::domain::{keys, Payload};
use lookout_report::{Dispatcher, Disposition};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Window after which per-fingerprint counters reset
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Only this many characters of the message feed the fingerprint
const FINGERPRINT_MESSAGE_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Name, message and stack of an error to capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl ErrorInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// Builds an `ErrorInfo` from an error and its `source()` chain.
    ///
    /// The chain is recorded one cause per line as the stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self::new("Error", err.to_string()).with_stack(causes.join("\n"))
    }

    /// Stable fingerprint of name, message prefix and first stack location
    pub fn fingerprint(&self) -> String {
        let message: String = self.message.chars().take(FINGERPRINT_MESSAGE_CHARS).collect();
        let location = first_location(&self.stack).unwrap_or_default();
        let key = [self.name.as_str(), message.as_str(), location.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        hash36(&key)
    }
}

/// `file:line` of the first `at [fn (]<file>:<line>:<col>[)]` frame in `stack`
fn first_location(stack: &str) -> Option<String> {
    stack.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix("at ")?.trim().trim_end_matches(')');
        let rest = rest.rsplit_once('(').map_or(rest, |(_, inner)| inner);
        let mut parts = rest.rsplitn(3, ':');
        let column = parts.next()?;
        let line_no = parts.next()?;
        let file = parts.next()?;
        let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if file.is_empty() || !numeric(line_no) || !numeric(column) {
            return None;
        }
        Some(format!("{file}:{line_no}"))
    })
}

/// 32-bit rolling hash rendered in base 36
fn hash36(input: &str) -> String {
    let hash = input
        .chars()
        .fold(0i32, |h, c| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32));
    let mut n = hash.unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let d = (n % 36) as u8;
        digits.push(if d < 10 { b'0' + d } else { b'a' + d - 10 });
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// What [`ErrorCapture::capture`] did with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Handed to the dispatcher
    Reported(Disposition),
    /// Matched an ignore substring or pattern
    Ignored,
    /// Over `max_errors_per_minute` for this fingerprint
    RateLimited,
}

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    counts: HashMap<String, u32>,
}

/// Turns errors into error payloads and reports them
pub struct ErrorCapture {
    dispatcher: Dispatcher,
    ignore_substrings: Vec<String>,
    ignore_patterns: Vec<Regex>,
    max_per_minute: u32,
    session_id: String,
    window: Mutex<RateWindow>,
}

impl std::fmt::Debug for ErrorCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorCapture")
            .field("session_id", &self.session_id)
            .field("max_per_minute", &self.max_per_minute)
            .finish_non_exhaustive()
    }
}

impl ErrorCapture {
    pub fn new(dispatcher: Dispatcher, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| CaptureError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dispatcher,
            ignore_substrings: config.ignore_errors.clone(),
            ignore_patterns,
            max_per_minute: config.max_errors_per_minute,
            session_id: Uuid::new_v4().to_string(),
            window: Mutex::new(RateWindow {
                started: Instant::now(),
                counts: HashMap::new(),
            }),
        })
    }

    /// Identifier shared by every payload from this capture instance
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether `message` matches an ignore substring or pattern
    pub fn should_ignore(&self, message: &str) -> bool {
        self.ignore_substrings
            .iter()
            .any(|s| !s.is_empty() && message.contains(s.as_str()))
            || self.ignore_patterns.iter().any(|re| re.is_match(message))
    }

    /// Counts one occurrence of `fingerprint`; true once over the limit.
    fn rate_limited(&self, fingerprint: &str) -> bool {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        if window.started.elapsed() >= RATE_WINDOW {
            window.started = Instant::now();
            window.counts.clear();
        }
        let count = window.counts.entry(fingerprint.to_string()).or_insert(0);
        *count += 1;
        *count > self.max_per_minute
    }

    /// Builds the error payload for `info` without reporting it.
    pub fn payload(&self, info: &ErrorInfo, context: Payload) -> Payload {
        let kind = context
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let mut payload = Payload::new();
        payload.insert("errorId".into(), Value::String(info.fingerprint()));
        payload.insert("name".into(), Value::String(info.name.clone()));
        payload.insert("message".into(), Value::String(info.message.clone()));
        payload.insert("stack".into(), Value::String(info.stack.clone()));
        payload.insert("type".into(), Value::String(kind));
        payload.insert(keys::LEVEL.into(), Value::String("error".into()));
        payload.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
        payload.insert("sessionId".into(), Value::String(self.session_id.clone()));
        payload.insert("context".into(), Value::Object(context));
        payload
    }

    /// Filters, rate limits and reports one error.
    pub fn capture(&self, info: ErrorInfo, context: Payload) -> CaptureOutcome {
        if self.should_ignore(&info.message) {
            debug!(message = %info.message, "Ignoring captured error");
            return CaptureOutcome::Ignored;
        }
        let fingerprint = info.fingerprint();
        if self.rate_limited(&fingerprint) {
            debug!(error_id = %fingerprint, "Captured error rate limited");
            return CaptureOutcome::RateLimited;
        }
        let payload = self.payload(&info, context);
        CaptureOutcome::Reported(self.dispatcher.report_error(payload))
    }

    /// Captures a Rust error with an empty context.
    pub fn capture_error(&self, err: &(dyn std::error::Error + 'static)) -> CaptureOutcome {
        self.capture(ErrorInfo::from_error(err), Payload::new())
    }
}
