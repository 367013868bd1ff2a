//! Command/response correlation for the single-flight wire protocol.
//!
//! Correlated commands wait in a FIFO queue. Only the head is on the wire
//! and only the head is timed: a command's line is written when it becomes
//! head, and its timer starts at the same moment. Replies complete the
//! head; pauses and output are broadcast to event listeners.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use mobdbg_stack::{decode_stack, decode_values, StackDump, Variable};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::command::{Command, CommandKind, OutputMode};
use crate::error::ProtocolError;
use crate::event::Event;
use crate::listener::{lock, ListenerId, ListenerSet};
use crate::response::StatusLine;
use crate::transport::Transport;

/// Default reply budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(7_000);

/// Reply budget for STACK and EXEC, whose bodies can be large.
pub const STACK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Per-command reply budgets. `EXIT` is never timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub default: Duration,
    pub stack: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: DEFAULT_TIMEOUT,
            stack: STACK_TIMEOUT,
        }
    }
}

impl Timeouts {
    pub fn for_kind(&self, kind: CommandKind) -> Option<Duration> {
        match kind {
            CommandKind::Exit => None,
            CommandKind::Stack | CommandKind::Exec => Some(self.stack),
            _ => Some(self.default),
        }
    }
}

/// The eventual reply to a correlated command.
///
/// Resolves to the [`Event`] that completed the command (`Ok` or `Error`),
/// or [`ProtocolError::Cancelled`] if the dispatcher was disposed first.
#[derive(Debug)]
pub struct Reply {
    rx: oneshot::Receiver<Event>,
}

impl Reply {
    fn resolved(event: Event) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(event);
        Self { rx }
    }

    fn cancelled() -> Self {
        let (_, rx) = oneshot::channel();
        Self { rx }
    }

    /// Await the reply and unwrap it: `Ok` yields its text, `Error` becomes
    /// [`ProtocolError::Remote`].
    pub async fn body(self) -> Result<Option<String>, ProtocolError> {
        match self.await? {
            Event::Ok { message } => Ok(message),
            Event::Error { message, details } => Err(ProtocolError::Remote { message, details }),
            other => {
                tracing::debug!(?other, "unexpected event completed a request");
                Ok(None)
            }
        }
    }
}

impl Future for Reply {
    type Output = Result<Event, ProtocolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| ProtocolError::Cancelled))
    }
}

struct PendingRequest {
    id: u64,
    kind: CommandKind,
    wire: String,
    reply: oneshot::Sender<Event>,
    on_wire: bool,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingRequest>,
    next_id: u64,
    timer: Option<JoinHandle<()>>,
    disposed: bool,
}

struct Inner {
    transport: Arc<dyn Transport>,
    timeouts: Timeouts,
    queue: Mutex<QueueState>,
    events: ListenerSet<Event>,
}

/// Correlates commands with replies and broadcasts unsolicited events.
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Non-owning handle, used by callbacks registered on the transport side.
#[derive(Clone)]
pub struct WeakDispatcher {
    inner: Weak<Inner>,
}

impl WeakDispatcher {
    pub fn upgrade(&self) -> Option<Dispatcher> {
        self.inner.upgrade().map(|inner| Dispatcher { inner })
    }
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, timeouts: Timeouts) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                timeouts,
                queue: Mutex::new(QueueState::default()),
                events: ListenerSet::new(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.inner.timeouts
    }

    /// Register an event listener.
    pub fn on_event(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.add(callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove(id)
    }

    /// Number of correlated commands waiting, including the one in flight.
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.queue).pending.len()
    }

    /// Kind of the command currently awaiting its reply.
    pub fn in_flight(&self) -> Option<CommandKind> {
        lock(&self.inner.queue).pending.front().map(|p| p.kind)
    }

    /// Send a command.
    ///
    /// Fire-and-forget commands are written immediately and resolve to
    /// `Ok` at once. Correlated commands are queued and written when they
    /// reach the head of the queue. Must be called inside a Tokio runtime,
    /// which drives the reply timers.
    pub fn send(&self, command: Command) -> Reply {
        let wire = command.wire_text();
        let kind = command.kind();

        if !command.expects_reply() {
            tracing::debug!(command = %kind, "sending uncorrelated command");
            self.inner.transport.send(&wire);
            return Reply::resolved(Event::Ok { message: None });
        }

        let (tx, rx) = oneshot::channel();
        let mut queue = lock(&self.inner.queue);
        if queue.disposed {
            tracing::debug!(command = %kind, "dispatcher disposed, dropping command");
            return Reply::cancelled();
        }
        queue.next_id += 1;
        let id = queue.next_id;
        queue.pending.push_back(PendingRequest {
            id,
            kind,
            wire,
            reply: tx,
            on_wire: false,
        });
        tracing::trace!(command = %kind, id, queued = queue.pending.len(), "command queued");
        self.start_head(&mut queue);
        Reply { rx }
    }

    pub fn run(&self) -> Reply {
        self.send(Command::Run)
    }

    pub fn step(&self) -> Reply {
        self.send(Command::Step)
    }

    pub fn over(&self) -> Reply {
        self.send(Command::Over)
    }

    pub fn out(&self) -> Reply {
        self.send(Command::Out)
    }

    pub fn suspend(&self) {
        let _ = self.send(Command::Suspend);
    }

    pub fn exit(&self) -> Reply {
        self.send(Command::Exit)
    }

    pub fn set_breakpoint(&self, file: &str, line: u32) -> Reply {
        self.send(Command::SetBreakpoint {
            file: file.to_string(),
            line,
        })
    }

    pub fn delete_breakpoint(&self, file: &str, line: u32) -> Reply {
        self.send(Command::DeleteBreakpoint {
            file: file.to_string(),
            line,
        })
    }

    pub fn clear_breakpoints(&self) -> Reply {
        self.send(Command::ClearBreakpoints)
    }

    pub fn basedir(&self, dir: &str) -> Reply {
        self.send(Command::Basedir(dir.to_string()))
    }

    pub fn output_stdout(&self, mode: OutputMode) -> Reply {
        self.send(Command::OutputStdout(mode))
    }

    pub fn stack(&self, options: Option<String>) -> Reply {
        self.send(Command::Stack { options })
    }

    pub fn exec(&self, chunk: &str, frame: Option<u32>, options: Option<String>) -> Reply {
        self.send(Command::Exec {
            chunk: chunk.to_string(),
            frame,
            options,
        })
    }

    /// Request a stack dump and decode it.
    pub async fn stack_dump(&self, options: Option<String>) -> Result<StackDump, ProtocolError> {
        let body = self.stack(options).body().await?;
        Ok(decode_stack(body.as_deref().unwrap_or_default()))
    }

    /// Evaluate `chunk` in `frame` and decode the returned values.
    pub async fn evaluate(&self, chunk: &str, frame: Option<u32>) -> Result<Vec<Variable>, ProtocolError> {
        let body = self.exec(chunk, frame, None).body().await?;
        match body {
            Some(body) => Ok(decode_values(&body)?),
            None => Ok(Vec::new()),
        }
    }

    /// Route one line received from the debuggee.
    pub fn handle_line(&self, line: &str) {
        tracing::trace!(line, "<-");
        match StatusLine::parse(line) {
            StatusLine::Ok(rest) => self.on_ok(rest),
            StatusLine::Paused { file, line } => self.broadcast(Event::Paused {
                file,
                line,
                watch_index: None,
            }),
            StatusLine::PausedAtWatch {
                file,
                line,
                watch_index,
            } => self.broadcast(Event::Paused {
                file,
                line,
                watch_index: Some(watch_index),
            }),
            StatusLine::Output { stream, len } => {
                let weak = self.downgrade();
                let requested = self.inner.transport.request_body(
                    len,
                    Box::new(move |text| {
                        if let Some(dispatcher) = weak.upgrade() {
                            dispatcher.broadcast(Event::Output { stream, text });
                        }
                    }),
                );
                if let Err(e) = requested {
                    tracing::warn!(error = %e, "cannot read output body");
                }
            }
            StatusLine::BadRequest(details) => {
                let event = Event::error("Bad Request", (!details.is_empty()).then_some(details));
                self.complete_head(event.clone());
                self.broadcast(event);
            }
            StatusLine::Error { message, len: Some(len) } => {
                let head = self.head_id();
                let weak = self.downgrade();
                let requested = self.inner.transport.request_body(
                    len,
                    Box::new(move |body| {
                        if let Some(dispatcher) = weak.upgrade() {
                            let event = Event::error(message, Some(body));
                            match head {
                                Some(id) => dispatcher.complete_request(id, event),
                                None => dispatcher.broadcast(event),
                            }
                        }
                    }),
                );
                if let Err(e) = requested {
                    tracing::warn!(error = %e, "cannot read error body");
                }
            }
            StatusLine::Error { message, len: None } => {
                self.complete_head(Event::error(message, None));
            }
            StatusLine::Unknown(raw_line) => {
                tracing::debug!(line = %raw_line, "unrecognized line");
                self.broadcast(Event::Unknown { raw_line });
            }
        }
    }

    /// Fail every pending command after the connection dropped.
    pub fn handle_disconnect(&self) {
        let drained: Vec<PendingRequest> = {
            let mut queue = lock(&self.inner.queue);
            if let Some(timer) = queue.timer.take() {
                timer.abort();
            }
            queue.pending.drain(..).collect()
        };
        if !drained.is_empty() {
            tracing::info!(failed = drained.len(), "connection lost with commands pending");
        }
        for request in drained {
            let _ = request.reply.send(Event::error("Disconnected", None));
        }
    }

    /// Drop all pending commands, cancel the timer and forget listeners.
    /// Later sends resolve to [`ProtocolError::Cancelled`].
    pub fn dispose(&self) {
        {
            let mut queue = lock(&self.inner.queue);
            queue.disposed = true;
            if let Some(timer) = queue.timer.take() {
                timer.abort();
            }
            queue.pending.clear();
        }
        self.inner.events.clear();
    }

    fn on_ok(&self, rest: Option<String>) {
        let head = lock(&self.inner.queue)
            .pending
            .front()
            .map(|p| (p.id, p.kind));
        let Some((id, kind)) = head else {
            self.broadcast(Event::Ok { message: rest });
            return;
        };

        let body_len = rest
            .as_deref()
            .filter(|_| kind.returns_body())
            .and_then(|r| r.parse::<usize>().ok());
        let Some(len) = body_len else {
            self.complete_request(id, Event::Ok { message: rest });
            return;
        };

        let weak = self.downgrade();
        let requested = self.inner.transport.request_body(
            len,
            Box::new(move |body| {
                if let Some(dispatcher) = weak.upgrade() {
                    dispatcher.complete_request(id, Event::Ok { message: Some(body) });
                }
            }),
        );
        if let Err(e) = requested {
            self.complete_request(id, Event::error("Body unavailable", Some(e.to_string())));
        }
    }

    fn head_id(&self) -> Option<u64> {
        lock(&self.inner.queue).pending.front().map(|p| p.id)
    }

    /// Complete the head with `event`, or broadcast it when nothing waits.
    fn complete_head(&self, event: Event) {
        match self.head_id() {
            Some(id) => self.complete_request(id, event),
            None => self.broadcast(event),
        }
    }

    /// Complete request `id` if it is still the head; late replies for
    /// requests that already timed out are dropped.
    fn complete_request(&self, id: u64, event: Event) {
        let mut queue = lock(&self.inner.queue);
        if queue.pending.front().map(|p| p.id) != Some(id) {
            tracing::debug!(id, "dropping reply for a request that is no longer pending");
            return;
        }
        if let Some(timer) = queue.timer.take() {
            timer.abort();
        }
        if let Some(request) = queue.pending.pop_front() {
            tracing::trace!(command = %request.kind, id, "command completed");
            let _ = request.reply.send(event);
        }
        self.start_head(&mut queue);
    }

    /// Write the head to the wire and arm its timer, if not done yet.
    fn start_head(&self, queue: &mut QueueState) {
        let Some(head) = queue.pending.front_mut() else {
            return;
        };
        if head.on_wire {
            return;
        }
        head.on_wire = true;
        let (id, kind) = (head.id, head.kind);
        self.inner.transport.send(&head.wire);

        if let Some(budget) = self.inner.timeouts.for_kind(kind) {
            let weak = self.downgrade();
            queue.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                if let Some(dispatcher) = weak.upgrade() {
                    dispatcher.on_timeout(id, budget);
                }
            }));
        }
    }

    fn on_timeout(&self, id: u64, budget: Duration) {
        let event = {
            let mut queue = lock(&self.inner.queue);
            if queue.pending.front().map(|p| p.id) != Some(id) {
                return;
            }
            queue.timer = None;
            let Some(request) = queue.pending.pop_front() else {
                return;
            };
            let event = Event::error(
                "Timeout",
                Some(format!(
                    "{} timed out after {}ms",
                    request.kind,
                    budget.as_millis()
                )),
            );
            tracing::warn!(command = %request.kind, ms = budget.as_millis() as u64, "command timed out");
            let _ = request.reply.send(event.clone());
            self.start_head(&mut queue);
            event
        };
        self.broadcast(event);
    }

    fn broadcast(&self, event: Event) {
        tracing::debug!(?event, "broadcast");
        self.inner.events.emit(&event);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeouts", &self.inner.timeouts)
            .field("pending", &self.pending_len())
            .finish()
    }
}
