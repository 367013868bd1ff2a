//! mobdbg-protocol: the MobDebug wire protocol engine.
//!
//! The [`ConnectionServer`] accepts the debuggee's TCP connection and moves
//! lines and length-prefixed bodies. The [`Dispatcher`] correlates commands
//! with replies and broadcasts pauses and output as [`Event`]s. The
//! [`DebugAdapter`] ties both to a [`BreakpointManager`] and a
//! [`DebugSession`].

pub mod adapter;
pub mod breakpoint;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod listener;
pub mod response;
pub mod server;
pub mod session;
pub mod transport;

pub use adapter::{AdapterEvent, AdapterOptions, DebugAdapter};
pub use breakpoint::{Breakpoint, BreakpointLocation, BreakpointManager, PauseReason};
pub use command::{Command, CommandKind, OutputMode};
pub use dispatcher::{Dispatcher, Reply, Timeouts, WeakDispatcher};
pub use error::{ProtocolError, ServerError};
pub use event::Event;
pub use listener::{ListenerId, ListenerSet};
pub use response::StatusLine;
pub use server::{ConnectionEvent, ConnectionServer, ConnectionState};
pub use session::{condition_met, DebugSession, PauseAction, SessionState};
pub use transport::{MockTransport, Transport};
