//! The debugger adapter: one object that owns the server, the dispatcher,
//! the breakpoint set and the session, and turns wire traffic into
//! [`AdapterEvent`]s.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use mobdbg_core::PathResolver;
use mobdbg_stack::{StackDump, Variable};
use serde::Serialize;

use crate::breakpoint::{Breakpoint, BreakpointManager, PauseReason};
use crate::command::{Command, OutputMode};
use crate::dispatcher::{Dispatcher, Reply, Timeouts};
use crate::error::{ProtocolError, ServerError};
use crate::event::Event;
use crate::listener::{lock, ListenerId, ListenerSet};
use crate::server::{ConnectionEvent, ConnectionServer};
use crate::session::{condition_met, DebugSession, PauseAction, SessionState};
use crate::transport::Transport;

/// Default address the debuggee dials.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default MobDebug port.
pub const DEFAULT_PORT: u16 = 8172;

/// Adapter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    pub host: String,
    /// `0` picks a free port.
    pub port: u16,
    pub timeouts: Timeouts,
    /// Sent as `BASEDIR` on every connection.
    pub basedir: Option<String>,
    pub output_mode: OutputMode,
    /// Send `RUN` once the handshake is done.
    pub run_on_connect: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeouts: Timeouts::default(),
            basedir: None,
            output_mode: OutputMode::default(),
            run_on_connect: true,
        }
    }
}

/// What the adapter reports to its user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdapterEvent {
    Connected {
        peer: SocketAddr,
    },
    Disconnected,
    DuplicateRejected {
        peer: SocketAddr,
    },
    /// The debuggee stopped and is waiting for commands.
    Paused {
        remote_file: String,
        local_path: Option<PathBuf>,
        line: u32,
        reason: PauseReason,
    },
    Output {
        stream: String,
        text: String,
    },
    Error {
        message: String,
        details: Option<String>,
    },
}

struct Inner {
    server: Arc<ConnectionServer>,
    dispatcher: Dispatcher,
    options: AdapterOptions,
    breakpoints: Mutex<BreakpointManager>,
    session: Mutex<DebugSession>,
    events: ListenerSet<AdapterEvent>,
    registrations: Mutex<Registrations>,
}

#[derive(Default)]
struct Registrations {
    line: Option<ListenerId>,
    connection: Option<ListenerId>,
    dispatcher: Option<ListenerId>,
}

/// Drives one debuggee at a time. Cheap to clone.
#[derive(Clone)]
pub struct DebugAdapter {
    inner: Arc<Inner>,
}

impl DebugAdapter {
    pub fn new(options: AdapterOptions, resolver: PathResolver) -> Self {
        let server = ConnectionServer::new(options.host.clone(), options.port);
        let transport: Arc<dyn Transport> = server.clone();
        let dispatcher = Dispatcher::new(transport, options.timeouts);

        let inner = Arc::new(Inner {
            server,
            dispatcher,
            options,
            breakpoints: Mutex::new(BreakpointManager::new(resolver)),
            session: Mutex::new(DebugSession::new()),
            events: ListenerSet::new(),
            registrations: Mutex::new(Registrations::default()),
        });

        let weak_dispatcher = inner.dispatcher.downgrade();
        let line = inner.server.on_line(move |line| {
            if let Some(dispatcher) = weak_dispatcher.upgrade() {
                dispatcher.handle_line(line);
            }
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let connection = inner.server.on_connection_event(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection_event(event);
            }
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let dispatcher = inner.dispatcher.on_event(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_dispatcher_event(event);
            }
        });

        *lock(&inner.registrations) = Registrations {
            line: Some(line),
            connection: Some(connection),
            dispatcher: Some(dispatcher),
        };

        Self { inner }
    }

    /// Start listening. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        self.inner.server.start().await
    }

    pub fn on_event(&self, callback: impl Fn(&AdapterEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.add(callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove(id)
    }

    pub fn server(&self) -> &Arc<ConnectionServer> {
        &self.inner.server
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn session_state(&self) -> SessionState {
        lock(&self.inner.session).state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.server.is_connected()
    }

    /// Snapshot of all breakpoints, ordered by path then line.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.inner.breakpoints)
            .all()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Add or replace a breakpoint. When a debuggee is attached the change
    /// is sent right away; otherwise it goes out with the next handshake.
    pub async fn add_breakpoint(&self, bp: Breakpoint) -> Result<(), ProtocolError> {
        let commands = lock(&self.inner.breakpoints).add(bp);
        self.apply(commands).await
    }

    /// Remove a breakpoint. Returns `false` if there was none.
    pub async fn remove_breakpoint(&self, path: &Path, line: u32) -> Result<bool, ProtocolError> {
        let Some(commands) = lock(&self.inner.breakpoints).remove(path, line) else {
            return Ok(false);
        };
        self.apply(commands).await?;
        Ok(true)
    }

    /// Enable or disable a breakpoint. Returns the new state.
    pub async fn toggle_breakpoint(&self, path: &Path, line: u32) -> Result<Option<bool>, ProtocolError> {
        let Some((enabled, commands)) = lock(&self.inner.breakpoints).toggle(path, line) else {
            return Ok(None);
        };
        self.apply(commands).await?;
        Ok(Some(enabled))
    }

    /// Drop every breakpoint, locally and in the debuggee.
    pub async fn clear_breakpoints(&self) -> Result<(), ProtocolError> {
        lock(&self.inner.breakpoints).clear();
        self.apply(vec![Command::ClearBreakpoints]).await
    }

    pub fn run(&self) -> Reply {
        self.inner.resume_session();
        self.inner.dispatcher.run()
    }

    pub fn step(&self) -> Reply {
        self.inner.resume_session();
        self.inner.dispatcher.step()
    }

    pub fn over(&self) -> Reply {
        self.inner.resume_session();
        self.inner.dispatcher.over()
    }

    pub fn out(&self) -> Reply {
        self.inner.resume_session();
        self.inner.dispatcher.out()
    }

    pub fn suspend(&self) {
        self.inner.dispatcher.suspend();
    }

    pub fn exit(&self) -> Reply {
        self.inner.dispatcher.exit()
    }

    pub async fn stack_dump(&self) -> Result<StackDump, ProtocolError> {
        self.inner.dispatcher.stack_dump(None).await
    }

    pub async fn evaluate(&self, chunk: &str, frame: Option<u32>) -> Result<Vec<Variable>, ProtocolError> {
        self.inner.dispatcher.evaluate(chunk, frame).await
    }

    /// Unregister every listener this adapter installed and shut down the
    /// dispatcher and the server.
    pub fn dispose(&self) {
        let registrations = std::mem::take(&mut *lock(&self.inner.registrations));
        if let Some(id) = registrations.line {
            self.inner.server.remove_line_listener(id);
        }
        if let Some(id) = registrations.connection {
            self.inner.server.remove_connection_listener(id);
        }
        if let Some(id) = registrations.dispatcher {
            self.inner.dispatcher.remove_event_listener(id);
        }
        self.inner.dispatcher.dispose();
        self.inner.server.dispose();
        self.inner.events.clear();
        lock(&self.inner.session).terminate();
    }

    async fn apply(&self, commands: Vec<Command>) -> Result<(), ProtocolError> {
        if !self.inner.server.is_connected() {
            return Ok(());
        }
        let replies: Vec<Reply> = commands
            .into_iter()
            .map(|command| self.inner.dispatcher.send(command))
            .collect();
        for reply in replies {
            reply.body().await?;
        }
        Ok(())
    }
}

impl Inner {
    fn on_connection_event(self: &Arc<Self>, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { peer } => {
                if let Err(err) = lock(&self.session).attach() {
                    tracing::warn!(%err, "session attach");
                }
                self.events.emit(&AdapterEvent::Connected { peer: *peer });
                let this = Arc::clone(self);
                tokio::spawn(async move { this.handshake().await });
            }
            ConnectionEvent::Disconnected => {
                self.dispatcher.handle_disconnect();
                lock(&self.session).terminate();
                self.events.emit(&AdapterEvent::Disconnected);
            }
            ConnectionEvent::DuplicateRejected { peer } => {
                self.events.emit(&AdapterEvent::DuplicateRejected { peer: *peer });
            }
        }
    }

    /// BASEDIR, OUTPUT, breakpoint sync, then RUN.
    async fn handshake(&self) {
        let mut replies = Vec::new();
        if let Some(dir) = &self.options.basedir {
            replies.push(self.dispatcher.basedir(dir));
        }
        replies.push(self.dispatcher.output_stdout(self.options.output_mode));
        let sync = lock(&self.breakpoints).sync_commands();
        tracing::debug!(count = sync.len(), "syncing breakpoints");
        replies.extend(sync.into_iter().map(|command| self.dispatcher.send(command)));
        if self.options.run_on_connect {
            replies.push(self.dispatcher.run());
        }

        for reply in replies {
            if let Err(err) = reply.body().await {
                tracing::warn!(%err, "handshake command failed");
            }
        }
    }

    fn on_dispatcher_event(self: &Arc<Self>, event: &Event) {
        match event {
            Event::Paused {
                file,
                line,
                watch_index,
            } => self.on_paused(file, *line, *watch_index),
            Event::Output { stream, text } => self.events.emit(&AdapterEvent::Output {
                stream: stream.clone(),
                text: text.clone(),
            }),
            Event::Error { message, details } => self.events.emit(&AdapterEvent::Error {
                message: message.clone(),
                details: details.clone(),
            }),
            Event::Ok { .. } => {}
            Event::Unknown { raw_line } => {
                tracing::debug!(line = %raw_line, "unrecognized line from debuggee");
            }
        }
    }

    fn on_paused(self: &Arc<Self>, file: &str, line: u32, watch_index: Option<u32>) {
        let action = {
            let breakpoints = lock(&self.breakpoints);
            lock(&self.session).on_paused(&breakpoints, file, line, watch_index)
        };
        let action = match action {
            Ok(action) => action,
            Err(err) => {
                tracing::warn!(%err, file, line, "ignoring pause");
                return;
            }
        };

        match action {
            PauseAction::Stop(reason) => self.emit_paused(file, line, reason),
            PauseAction::EvaluateCondition { chunk, reason } => {
                let this = Arc::clone(self);
                let file = file.to_string();
                tokio::spawn(async move {
                    match this.dispatcher.exec(&chunk, None, None).body().await {
                        Ok(body) if !condition_met(body.as_deref()) => this.resume_debuggee(),
                        Ok(_) => this.emit_paused(&file, line, reason),
                        Err(err) => {
                            tracing::warn!(%err, %chunk, "breakpoint condition failed");
                            this.emit_paused(&file, line, reason);
                        }
                    }
                });
            }
            PauseAction::Log { chunk } => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(err) = this.dispatcher.exec(&chunk, None, None).body().await {
                        tracing::warn!(%err, %chunk, "logpoint failed");
                    }
                    this.resume_debuggee();
                });
            }
        }
    }

    fn emit_paused(&self, file: &str, line: u32, reason: PauseReason) {
        let local_path = lock(&self.breakpoints).resolver().resolve_local_path(file);
        self.events.emit(&AdapterEvent::Paused {
            remote_file: file.to_string(),
            local_path,
            line,
            reason,
        });
    }

    fn resume_session(&self) {
        if let Err(err) = lock(&self.session).resume() {
            tracing::debug!(%err, "resume");
        }
    }

    fn resume_debuggee(&self) {
        self.resume_session();
        // Only the send matters; the reply is observed by nobody.
        drop(self.dispatcher.run());
    }
}
