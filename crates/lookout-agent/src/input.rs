//! NDJSON input protocol
//!
//! One JSON object per line on stdin:
//!
//! ```text
//! {"kind": "error", "data": {...}}
//! {"kind": "performance", "data": {...}}
//! {"connectivity": "online"}            | "offline"
//! {"capture": {"name": "...", "message": "...", "stack": "...", "context": {...}}}
//! {"flush": true}
//! ```

use lookout_core::domain::{Category, Payload};
use serde::Deserialize;

/// Online/offline transition announced by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }
}

/// Raw error handed to the error capture helper
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapturedError {
    #[serde(default = "default_error_name")]
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub context: Payload,
}

fn default_error_name() -> String {
    "Error".to_string()
}

/// One decoded input line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputLine {
    Report { kind: Category, data: Payload },
    Connectivity { connectivity: Connectivity },
    Capture { capture: CapturedError },
    Flush { flush: bool },
}

/// Decodes one line; blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<InputLine>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_report_lines() {
        let line = r#"{"kind":"error","data":{"message":"boom"}}"#;
        let Some(InputLine::Report { kind, data }) = parse_line(line).unwrap() else {
            panic!("expected report line");
        };
        assert_eq!(kind, Category::Error);
        assert_eq!(data["message"], "boom");

        let line = r#"{"kind":"performance","data":{"name":"lcp","value":1200}}"#;
        assert!(matches!(
            parse_line(line).unwrap(),
            Some(InputLine::Report {
                kind: Category::Performance,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_connectivity() {
        assert_eq!(
            parse_line(r#"{"connectivity":"offline"}"#).unwrap(),
            Some(InputLine::Connectivity {
                connectivity: Connectivity::Offline
            })
        );
        assert!(Connectivity::Online.is_online());
        assert!(parse_line(r#"{"connectivity":"sideways"}"#).is_err());
    }

    #[test]
    fn test_parse_capture_defaults() {
        let line = r#"{"capture":{"message":"x is undefined"}}"#;
        let Some(InputLine::Capture { capture }) = parse_line(line).unwrap() else {
            panic!("expected capture line");
        };
        assert_eq!(capture.name, "Error");
        assert_eq!(capture.message, "x is undefined");
        assert!(capture.stack.is_empty());
        assert!(capture.context.is_empty());

        let line = json!({"capture": {"name": "TypeError", "message": "m", "context": {"type": "network_error"}}});
        let Some(InputLine::Capture { capture }) = parse_line(&line.to_string()).unwrap() else {
            panic!("expected capture line");
        };
        assert_eq!(capture.name, "TypeError");
        assert_eq!(capture.context["type"], "network_error");
    }

    #[test]
    fn test_blank_and_invalid_lines() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"kind":"metric","data":{}}"#).is_err());
        assert!(parse_line(r#"{"kind":"error"}"#).is_err());
    }

    #[test]
    fn test_parse_flush() {
        assert_eq!(
            parse_line(r#"{"flush":true}"#).unwrap(),
            Some(InputLine::Flush { flush: true })
        );
    }
}
