//! Outbound commands and their wire text.

use std::fmt;

/// How the debuggee treats its own stdout once `OUTPUT stdout` is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Print locally and forward a copy.
    #[default]
    Copy,
    /// Forward only.
    Redirect,
    /// Restore the default behavior.
    Default,
}

impl OutputMode {
    /// Single-letter wire code.
    pub fn code(self) -> char {
        match self {
            OutputMode::Copy => 'c',
            OutputMode::Redirect => 'r',
            OutputMode::Default => 'd',
        }
    }

    /// Parse a config value (`copy`, `redirect`, `default` or the letter).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "c" | "copy" => Some(OutputMode::Copy),
            "r" | "redirect" => Some(OutputMode::Redirect),
            "d" | "default" => Some(OutputMode::Default),
            _ => None,
        }
    }
}

/// Command discriminant, used for timeouts and body handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Run,
    Step,
    Over,
    Out,
    Suspend,
    SetBreakpoint,
    DeleteBreakpoint,
    Stack,
    Exec,
    Output,
    Basedir,
    Exit,
}

impl CommandKind {
    /// Protocol verb.
    pub fn wire_name(self) -> &'static str {
        match self {
            CommandKind::Run => "RUN",
            CommandKind::Step => "STEP",
            CommandKind::Over => "OVER",
            CommandKind::Out => "OUT",
            CommandKind::Suspend => "SUSPEND",
            CommandKind::SetBreakpoint => "SETB",
            CommandKind::DeleteBreakpoint => "DELB",
            CommandKind::Stack => "STACK",
            CommandKind::Exec => "EXEC",
            CommandKind::Output => "OUTPUT",
            CommandKind::Basedir => "BASEDIR",
            CommandKind::Exit => "EXIT",
        }
    }

    /// Whether a `200 OK <len>` reply to this command carries a body.
    pub fn returns_body(self) -> bool {
        matches!(self, CommandKind::Stack | CommandKind::Exec)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A command for the debuggee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Step,
    Over,
    Out,
    Suspend,
    Exit,
    SetBreakpoint { file: String, line: u32 },
    DeleteBreakpoint { file: String, line: u32 },
    /// `DELB * 0`: remove every breakpoint.
    ClearBreakpoints,
    Basedir(String),
    OutputStdout(OutputMode),
    Stack { options: Option<String> },
    Exec {
        chunk: String,
        frame: Option<u32>,
        options: Option<String>,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Run => CommandKind::Run,
            Command::Step => CommandKind::Step,
            Command::Over => CommandKind::Over,
            Command::Out => CommandKind::Out,
            Command::Suspend => CommandKind::Suspend,
            Command::Exit => CommandKind::Exit,
            Command::SetBreakpoint { .. } => CommandKind::SetBreakpoint,
            Command::DeleteBreakpoint { .. } | Command::ClearBreakpoints => {
                CommandKind::DeleteBreakpoint
            }
            Command::Basedir(_) => CommandKind::Basedir,
            Command::OutputStdout(_) => CommandKind::Output,
            Command::Stack { .. } => CommandKind::Stack,
            Command::Exec { .. } => CommandKind::Exec,
        }
    }

    /// Whether the debuggee answers this command with a status line.
    ///
    /// `SUSPEND` is handled by the debuggee's hook, which reports the
    /// resulting pause as a `202` instead of replying.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::Suspend)
    }

    /// The line sent on the wire, without the trailing newline.
    pub fn wire_text(&self) -> String {
        let verb = self.kind().wire_name();
        match self {
            Command::Run
            | Command::Step
            | Command::Over
            | Command::Out
            | Command::Suspend
            | Command::Exit => verb.to_string(),
            Command::SetBreakpoint { file, line } | Command::DeleteBreakpoint { file, line } => {
                format!("{verb} {file} {line}")
            }
            Command::ClearBreakpoints => format!("{verb} * 0"),
            Command::Basedir(dir) => format!("{verb} {dir}"),
            Command::OutputStdout(mode) => format!("{verb} stdout {}", mode.code()),
            Command::Stack { options } => match param_block(None, options.as_deref()) {
                Some(block) => format!("{verb} {block}"),
                None => verb.to_string(),
            },
            Command::Exec {
                chunk,
                frame,
                options,
            } => {
                let chunk = flatten_chunk(chunk);
                match param_block(*frame, options.as_deref()) {
                    Some(block) => format!("{verb} {chunk} {block}"),
                    None => format!("{verb} {chunk}"),
                }
            }
        }
    }
}

/// `-- { stack = N, <options> }`, or `None` when there is nothing to say.
fn param_block(frame: Option<u32>, options: Option<&str>) -> Option<String> {
    let options = options.map(str::trim).filter(|o| !o.is_empty());
    match (frame, options) {
        (None, None) => None,
        (Some(frame), None) => Some(format!("-- {{ stack = {frame} }}")),
        (None, Some(options)) => Some(format!("-- {{ {options} }}")),
        (Some(frame), Some(options)) => Some(format!("-- {{ stack = {frame}, {options} }}")),
    }
}

/// The protocol is line-based; multi-line chunks are joined with spaces.
fn flatten_chunk(chunk: &str) -> String {
    chunk
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
