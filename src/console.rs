use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use mobdbg_protocol::{AdapterEvent, PauseReason};
use mobdbg_stack::{CoroutineStackInfo, Variable};

use crate::debug_types::{DebugCommand, DebugEvent};

pub(crate) const HELP: &str = "\
commands:
  run | r                      resume
  step | s                     step into
  over | n                     step over
  out | o                      step out
  suspend                      pause a running debuggee
  break <file> <line> [if <cond>]
  log <file> <line> <expr>     print <expr> when the line is hit
  delete <file> <line>
  toggle <file> <line>
  clear                        remove every breakpoint
  breakpoints | bl
  stack | bt
  eval [-f <frame>] <expr>     evaluate in the paused frame
  exit                         stop the debuggee
  quit | q                     leave mobdbg
  help";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConsoleInput {
    Command(DebugCommand),
    Help,
    Quit,
    Empty,
}

/// Parse a console line. Relative file names are taken from `project_root`.
pub(crate) fn parse_line(line: &str, project_root: &Path) -> Result<ConsoleInput, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "" => return Ok(ConsoleInput::Empty),
        "help" | "?" => return Ok(ConsoleInput::Help),
        "quit" | "q" => return Ok(ConsoleInput::Quit),
        "run" | "r" | "continue" | "c" => DebugCommand::Run,
        "step" | "s" => DebugCommand::Step,
        "over" | "n" | "next" => DebugCommand::Over,
        "out" | "o" => DebugCommand::Out,
        "suspend" => DebugCommand::Suspend,
        "exit" => DebugCommand::Exit,
        "clear" => DebugCommand::Clear,
        "breakpoints" | "bl" => DebugCommand::Breakpoints,
        "stack" | "bt" => DebugCommand::Stack,
        "break" | "b" => {
            let (path, line, tail) = location(rest, project_root)?;
            let condition = match tail.split_once(char::is_whitespace) {
                None if tail.is_empty() => None,
                Some(("if", cond)) if !cond.trim().is_empty() => Some(cond.trim().to_string()),
                _ => return Err("usage: break <file> <line> [if <cond>]".into()),
            };
            DebugCommand::Break {
                path,
                line,
                condition,
            }
        }
        "log" => {
            let (path, line, expression) = location(rest, project_root)?;
            if expression.is_empty() {
                return Err("usage: log <file> <line> <expr>".into());
            }
            DebugCommand::Log {
                path,
                line,
                expression: expression.to_string(),
            }
        }
        "delete" | "d" => {
            let (path, line) = bare_location(rest, project_root)?;
            DebugCommand::Delete { path, line }
        }
        "toggle" => {
            let (path, line) = bare_location(rest, project_root)?;
            DebugCommand::Toggle { path, line }
        }
        "eval" | "e" | "p" => {
            let (frame, chunk) = match rest.strip_prefix("-f") {
                Some(after) => {
                    let (n, chunk) = after
                        .trim_start()
                        .split_once(char::is_whitespace)
                        .ok_or("usage: eval -f <frame> <expr>")?;
                    let frame = n.parse().map_err(|_| format!("invalid frame: {n}"))?;
                    (Some(frame), chunk.trim())
                }
                None => (None, rest),
            };
            if chunk.is_empty() {
                return Err("usage: eval [-f <frame>] <expr>".into());
            }
            DebugCommand::Eval {
                chunk: chunk.to_string(),
                frame,
            }
        }
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(ConsoleInput::Command(command))
}

fn location<'a>(args: &'a str, project_root: &Path) -> Result<(PathBuf, u32, &'a str), String> {
    let mut parts = args.splitn(3, char::is_whitespace);
    let file = parts.next().filter(|f| !f.is_empty()).ok_or("missing file")?;
    let line = parts.next().ok_or("missing line")?;
    let line: u32 = line
        .parse()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| format!("invalid line: {line}"))?;
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    Ok((path, line, parts.next().unwrap_or("").trim()))
}

fn bare_location(args: &str, project_root: &Path) -> Result<(PathBuf, u32), String> {
    match location(args, project_root)? {
        (path, line, "") => Ok((path, line)),
        (_, _, extra) => Err(format!("unexpected argument: {extra}")),
    }
}

/// Writes events either as colored text or as JSON lines.
pub(crate) struct Printer<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> Printer<W> {
    pub(crate) fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub(crate) fn print(&mut self, event: &DebugEvent) -> io::Result<()> {
        if self.json {
            let line = serde_json::to_string(event).map_err(io::Error::other)?;
            writeln!(self.out, "{line}")?;
        } else {
            for (color, text) in render(event) {
                match color {
                    Some(color) => queue!(
                        self.out,
                        SetForegroundColor(color),
                        Print(text),
                        ResetColor,
                        Print("\n")
                    )?,
                    None => queue!(self.out, Print(text), Print("\n"))?,
                }
            }
        }
        self.out.flush()
    }
}

/// Text lines for one event, with an optional color each.
pub(crate) fn render(event: &DebugEvent) -> Vec<(Option<Color>, String)> {
    match event {
        DebugEvent::Adapter { event } => vec![render_adapter(event)],
        DebugEvent::Stack { dump } => {
            let mut lines = render_coroutine(&dump.current);
            for other in &dump.others {
                lines.extend(render_coroutine(other));
            }
            lines
        }
        DebugEvent::Values { values } if values.is_empty() => {
            vec![(Some(Color::DarkGrey), "(no values)".to_string())]
        }
        DebugEvent::Values { values } => values.iter().map(|v| (None, render_variable(v))).collect(),
        DebugEvent::Breakpoints { entries } if entries.is_empty() => {
            vec![(Some(Color::DarkGrey), "(no breakpoints)".to_string())]
        }
        DebugEvent::Breakpoints { entries } => entries.iter().map(|e| (None, e.clone())).collect(),
        DebugEvent::Info { message } => vec![(Some(Color::DarkGrey), message.clone())],
        DebugEvent::Error { message } => vec![(Some(Color::Red), format!("error: {message}"))],
    }
}

fn render_adapter(event: &AdapterEvent) -> (Option<Color>, String) {
    match event {
        AdapterEvent::Connected { peer } => (Some(Color::Green), format!("debuggee connected from {peer}")),
        AdapterEvent::Disconnected => (Some(Color::DarkYellow), "debuggee disconnected".to_string()),
        AdapterEvent::DuplicateRejected { peer } => (
            Some(Color::DarkYellow),
            format!("rejected second debuggee from {peer}"),
        ),
        AdapterEvent::Paused {
            remote_file,
            local_path,
            line,
            reason,
        } => {
            let place = match local_path {
                Some(path) => path.display().to_string(),
                None => remote_file.clone(),
            };
            let why = match reason {
                PauseReason::Breakpoint(_) => "breakpoint".to_string(),
                PauseReason::Watch(index) => format!("watch #{index}"),
                PauseReason::Step => "step".to_string(),
            };
            (Some(Color::Cyan), format!("paused at {place}:{line} ({why})"))
        }
        AdapterEvent::Output { text, .. } => (None, text.trim_end_matches('\n').to_string()),
        AdapterEvent::Error { message, details } => {
            let text = match details {
                Some(details) => format!("error: {message}: {details}"),
                None => format!("error: {message}"),
            };
            (Some(Color::Red), text)
        }
    }
}

fn render_coroutine(co: &CoroutineStackInfo) -> Vec<(Option<Color>, String)> {
    let marker = if co.is_current { "*" } else { " " };
    let mut lines = vec![(
        Some(Color::DarkGrey),
        format!("{marker} coroutine {} ({})", co.id, co.status),
    )];
    for (i, frame) in co.frames.iter().enumerate() {
        let level = co.frame_base as usize + i + 1;
        let at = match (&frame.source, frame.line) {
            (Some(source), Some(line)) => format!(" at {source}:{line}"),
            (Some(source), None) => format!(" at {source}"),
            _ => String::new(),
        };
        lines.push((Some(Color::Cyan), format!("  #{level} {}{at}", frame.name)));
        for var in &frame.variables {
            lines.push((None, format!("      {}", render_variable(var))));
        }
    }
    lines
}

fn render_variable(var: &Variable) -> String {
    format!("{} = {} ({})", var.name, var.value.preview(), var.value.type_label())
}
