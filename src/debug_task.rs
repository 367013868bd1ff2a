use std::sync::mpsc::Sender;

use mobdbg_protocol::{Breakpoint, DebugAdapter, Reply};
use tokio::sync::mpsc::Receiver;

use crate::debug_types::{DebugCommand, DebugEvent};

/// Async task that owns the adapter and processes console commands.
///
/// Runs on the tokio runtime, receives commands from the console thread,
/// and sends events back via the event channel.
pub(crate) async fn debug_task(
    adapter: DebugAdapter,
    mut cmd_rx: Receiver<DebugCommand>,
    evt_tx: Sender<DebugEvent>,
) {
    let forward = evt_tx.clone();
    let listener = adapter.on_event(move |event| {
        let _ = forward.send(DebugEvent::Adapter {
            event: event.clone(),
        });
    });

    while let Some(cmd) = cmd_rx.recv().await {
        tracing::debug!(?cmd, "console command");
        match cmd {
            DebugCommand::Run => watch_reply("run", adapter.run(), &evt_tx),
            DebugCommand::Step => watch_reply("step", adapter.step(), &evt_tx),
            DebugCommand::Over => watch_reply("over", adapter.over(), &evt_tx),
            DebugCommand::Out => watch_reply("out", adapter.out(), &evt_tx),
            DebugCommand::Suspend => adapter.suspend(),
            DebugCommand::Exit => watch_reply("exit", adapter.exit(), &evt_tx),
            DebugCommand::Break {
                path,
                line,
                condition,
            } => {
                let mut bp = Breakpoint::new(&path, line);
                if let Some(condition) = condition {
                    bp = bp.with_condition(condition);
                }
                report(adapter.add_breakpoint(bp).await, &evt_tx, || {
                    format!("breakpoint set at {}:{line}", path.display())
                });
            }
            DebugCommand::Log {
                path,
                line,
                expression,
            } => {
                let bp = Breakpoint::new(&path, line).with_log_expression(expression);
                report(adapter.add_breakpoint(bp).await, &evt_tx, || {
                    format!("logpoint set at {}:{line}", path.display())
                });
            }
            DebugCommand::Delete { path, line } => match adapter.remove_breakpoint(&path, line).await {
                Ok(true) => send(&evt_tx, DebugEvent::info(format!("deleted {}:{line}", path.display()))),
                Ok(false) => send(
                    &evt_tx,
                    DebugEvent::error(format!("no breakpoint at {}:{line}", path.display())),
                ),
                Err(e) => send(&evt_tx, DebugEvent::error(e)),
            },
            DebugCommand::Toggle { path, line } => match adapter.toggle_breakpoint(&path, line).await {
                Ok(Some(enabled)) => {
                    let state = if enabled { "enabled" } else { "disabled" };
                    send(&evt_tx, DebugEvent::info(format!("{state} {}:{line}", path.display())));
                }
                Ok(None) => send(
                    &evt_tx,
                    DebugEvent::error(format!("no breakpoint at {}:{line}", path.display())),
                ),
                Err(e) => send(&evt_tx, DebugEvent::error(e)),
            },
            DebugCommand::Clear => {
                report(adapter.clear_breakpoints().await, &evt_tx, || {
                    "all breakpoints cleared".to_string()
                });
            }
            DebugCommand::Breakpoints => {
                let entries = adapter
                    .breakpoints()
                    .iter()
                    .map(describe_breakpoint)
                    .collect();
                send(&evt_tx, DebugEvent::Breakpoints { entries });
            }
            DebugCommand::Stack => {
                let adapter = adapter.clone();
                let evt_tx = evt_tx.clone();
                tokio::spawn(async move {
                    let event = match adapter.stack_dump().await {
                        Ok(dump) => DebugEvent::Stack { dump },
                        Err(e) => DebugEvent::error(format!("stack: {e}")),
                    };
                    send(&evt_tx, event);
                });
            }
            DebugCommand::Eval { chunk, frame } => {
                let adapter = adapter.clone();
                let evt_tx = evt_tx.clone();
                tokio::spawn(async move {
                    let event = match adapter.evaluate(&chunk, frame).await {
                        Ok(values) => DebugEvent::Values { values },
                        Err(e) => DebugEvent::error(format!("eval: {e}")),
                    };
                    send(&evt_tx, event);
                });
            }
            DebugCommand::Shutdown => break,
        }
    }

    adapter.remove_event_listener(listener);
    adapter.dispose();
    tracing::info!("debug task stopped");
}

/// Report a failed reply; successful ones are silent because the pause or
/// output that follows says more.
fn watch_reply(what: &'static str, reply: Reply, evt_tx: &Sender<DebugEvent>) {
    let evt_tx = evt_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = reply.body().await {
            send(&evt_tx, DebugEvent::error(format!("{what}: {e}")));
        }
    });
}

fn report<E: std::fmt::Display>(
    result: Result<(), E>,
    evt_tx: &Sender<DebugEvent>,
    ok: impl FnOnce() -> String,
) {
    let event = match result {
        Ok(()) => DebugEvent::info(ok()),
        Err(e) => DebugEvent::error(e),
    };
    send(evt_tx, event);
}

fn send(evt_tx: &Sender<DebugEvent>, event: DebugEvent) {
    if evt_tx.send(event).is_err() {
        tracing::debug!("console gone, dropping event");
    }
}

fn describe_breakpoint(bp: &Breakpoint) -> String {
    let mut text = format!("{}:{}", bp.path.display(), bp.line);
    if !bp.enabled {
        text.push_str(" (disabled)");
    }
    if let Some(condition) = &bp.condition {
        text.push_str(&format!(" if {condition}"));
    }
    if let Some(expression) = &bp.log_expression {
        text.push_str(&format!(" log {expression}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_plain_and_decorated_breakpoints() {
        assert_eq!(describe_breakpoint(&Breakpoint::new("/g/a.lua", 3)), "/g/a.lua:3");

        let mut bp = Breakpoint::new("/g/a.lua", 3).with_condition("hp < 10");
        bp.enabled = false;
        assert_eq!(describe_breakpoint(&bp), "/g/a.lua:3 (disabled) if hp < 10");

        let bp = Breakpoint::new("/g/a.lua", 4).with_log_expression("hp");
        assert_eq!(describe_breakpoint(&bp), "/g/a.lua:4 log hp");
    }
}
