use std::path::PathBuf;

use mobdbg_protocol::AdapterEvent;
use mobdbg_stack::{StackDump, Variable};
use serde::Serialize;

/// Commands sent from the console thread to the async debug task.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DebugCommand {
    Run,
    Step,
    Over,
    Out,
    Suspend,
    Break {
        path: PathBuf,
        line: u32,
        condition: Option<String>,
    },
    Log {
        path: PathBuf,
        line: u32,
        expression: String,
    },
    Delete {
        path: PathBuf,
        line: u32,
    },
    Toggle {
        path: PathBuf,
        line: u32,
    },
    Clear,
    Breakpoints,
    Stack,
    Eval {
        chunk: String,
        frame: Option<u32>,
    },
    Exit,
    Shutdown,
}

/// Events sent from the async debug task back to the console thread.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum DebugEvent {
    Adapter { event: AdapterEvent },
    Stack { dump: StackDump },
    Values { values: Vec<Variable> },
    Breakpoints { entries: Vec<String> },
    Info { message: String },
    Error { message: String },
}

impl DebugEvent {
    pub(crate) fn info(message: impl Into<String>) -> Self {
        DebugEvent::Info {
            message: message.into(),
        }
    }

    pub(crate) fn error(message: impl std::fmt::Display) -> Self {
        DebugEvent::Error {
            message: message.to_string(),
        }
    }
}
