//! Panic reporting
//!
//! Installs a process-wide panic hook that turns every panic into an
//! error payload on the dispatcher. The hook chains to the previously
//! installed one, so the default stderr output is preserved.

use std::any::Any;

use lookout_core::domain::{keys, Payload};
use lookout_report::Dispatcher;
use serde_json::Value;

/// Builds the error payload describing a panic
pub fn panic_payload(message: &str, location: &str, thread: &str, backtrace: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("type".into(), Value::String("panic".into()));
    payload.insert("name".into(), Value::String("Panic".into()));
    payload.insert("message".into(), Value::String(message.to_string()));
    payload.insert("location".into(), Value::String(location.to_string()));
    payload.insert("thread".into(), Value::String(thread.to_string()));
    payload.insert("stack".into(), Value::String(backtrace.to_string()));
    payload.insert(keys::LEVEL.into(), Value::String("error".into()));
    payload
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Installs a panic hook that reports panics through `dispatcher`.
///
/// The backtrace is captured only when `RUST_BACKTRACE` enables it.
pub fn install_panic_reporter(dispatcher: Dispatcher) {
    let previous_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = panic_message(panic_info.payload());
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let thread = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        let backtrace = std::backtrace::Backtrace::capture().to_string();

        dispatcher.report_error(panic_payload(&message, &location, &thread, &backtrace));

        previous_hook(panic_info);
    }));
}

/// Removes the reporter and restores the default panic hook.
pub fn uninstall_panic_reporter() {
    drop(std::panic::take_hook());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_fields() {
        let payload = panic_payload("boom", "src/lib.rs:42:1", "worker", "");
        assert_eq!(payload["type"], "panic");
        assert_eq!(payload["message"], "boom");
        assert_eq!(payload["location"], "src/lib.rs:42:1");
        assert_eq!(payload["thread"], "worker");
        assert_eq!(payload["level"], "error");
    }
}
