//! Debug session state machine.

use mobdbg_stack::{parse_literal, LuaValue};

use crate::breakpoint::{BreakpointManager, PauseReason};
use crate::error::ProtocolError;

/// The current state of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No debuggee has connected yet.
    Waiting,
    /// The debuggee is executing.
    Running,
    /// The debuggee reported a pause.
    Paused,
    /// The debuggee disconnected or was told to exit.
    Terminated,
}

/// What the adapter should do about a pause.
#[derive(Debug, Clone, PartialEq)]
pub enum PauseAction {
    /// Surface the pause to the user.
    Stop(PauseReason),
    /// Evaluate `chunk`; stop with `reason` when it is truthy, resume
    /// otherwise.
    EvaluateCondition { chunk: String, reason: PauseReason },
    /// Evaluate `chunk` for its output, then resume.
    Log { chunk: String },
}

/// A paused location, as reported by the debuggee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausePosition {
    pub file: String,
    pub line: u32,
}

/// Tracks the lifecycle of one debuggee connection.
#[derive(Debug)]
pub struct DebugSession {
    state: SessionState,
    position: Option<PausePosition>,
}

impl DebugSession {
    /// Create a new session in the [`Waiting`](SessionState::Waiting) state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Waiting,
            position: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Where the debuggee last paused, while it is still paused.
    pub fn position(&self) -> Option<&PausePosition> {
        self.position.as_ref()
    }

    /// Transition: Waiting → Running, when a debuggee connects.
    ///
    /// A terminated session may be attached again; the next debuggee
    /// starts a fresh run.
    pub fn attach(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            SessionState::Waiting | SessionState::Terminated => {
                self.state = SessionState::Running;
                self.position = None;
                Ok(())
            }
            other => Err(invalid("attach", other)),
        }
    }

    /// Transition: Running → Paused, deciding what to do about the pause.
    ///
    /// A second pause while already paused (a step that completed) is
    /// accepted.
    pub fn on_paused(
        &mut self,
        breakpoints: &BreakpointManager,
        file: &str,
        line: u32,
        watch_index: Option<u32>,
    ) -> Result<PauseAction, ProtocolError> {
        match self.state {
            SessionState::Running | SessionState::Paused => {}
            other => return Err(invalid("pause", other)),
        }
        self.state = SessionState::Paused;
        self.position = Some(PausePosition {
            file: file.to_string(),
            line,
        });

        if let Some(index) = watch_index {
            return Ok(PauseAction::Stop(PauseReason::Watch(index)));
        }
        let reason = breakpoints.classify_pause(file, line);
        let (log_expression, condition) = match &reason {
            PauseReason::Breakpoint(bp) => (bp.log_expression.clone(), bp.condition.clone()),
            _ => (None, None),
        };
        let action = if let Some(expr) = log_expression {
            PauseAction::Log {
                chunk: format!("print({expr})"),
            }
        } else if let Some(cond) = condition {
            PauseAction::EvaluateCondition {
                chunk: format!("return ({cond})"),
                reason,
            }
        } else {
            PauseAction::Stop(reason)
        };
        Ok(action)
    }

    /// Transition: Paused → Running.
    pub fn resume(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            SessionState::Paused => {
                self.state = SessionState::Running;
                self.position = None;
                Ok(())
            }
            // A resume racing a pause notification is harmless.
            SessionState::Running => Ok(()),
            other => Err(invalid("resume", other)),
        }
    }

    /// Transition: any → Terminated.
    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
        self.position = None;
    }
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret an `EXEC` body as a breakpoint condition result.
///
/// The first returned value decides, with Lua truthiness. A body that does
/// not decode counts as met so the user still sees the stop.
pub fn condition_met(body: Option<&str>) -> bool {
    let Some(body) = body else {
        return false;
    };
    match parse_literal(body) {
        Ok(LuaValue::Table(values)) => values.get_index(1).is_some_and(LuaValue::is_truthy),
        Ok(single) => single.is_truthy(),
        Err(err) => {
            tracing::warn!(%err, "breakpoint condition result did not decode");
            true
        }
    }
}

fn invalid(op: &str, state: SessionState) -> ProtocolError {
    ProtocolError::InvalidState(format!("cannot {op}: session is {state:?}"))
}
