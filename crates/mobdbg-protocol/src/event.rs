//! Typed notifications produced from debuggee lines.

use serde::Serialize;

/// Everything the dispatcher reports, either as a command reply or as a
/// broadcast to event listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Execution stopped. Always unsolicited.
    Paused {
        file: String,
        line: u32,
        watch_index: Option<u32>,
    },
    Ok {
        message: Option<String>,
    },
    Error {
        message: String,
        details: Option<String>,
    },
    Output {
        stream: String,
        text: String,
    },
    Unknown {
        raw_line: String,
    },
}

impl Event {
    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Event::Error {
            message: message.into(),
            details,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = Event::Paused {
            file: "main/game.lua".into(),
            line: 3,
            watch_index: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "paused");
        assert_eq!(json["file"], "main/game.lua");
        assert_eq!(json["line"], 3);
        assert!(json["watch_index"].is_null());
    }

    #[test]
    fn error_helper() {
        let event = Event::error("Timeout", Some("RUN timed out after 7000ms".into()));
        assert!(event.is_error());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["details"], "RUN timed out after 7000ms");
    }
}
