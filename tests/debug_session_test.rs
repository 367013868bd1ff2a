use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mobdbg_core::PathResolver;
use mobdbg_protocol::{
    AdapterEvent, AdapterOptions, Breakpoint, DebugAdapter, PauseReason, SessionState, Timeouts,
};
use mobdbg_stack::ValueKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

// ── Fake game process ───────────────────────────────────────────

struct Game {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Game {
    async fn attach(addr: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    /// Read one command and answer it.
    async fn answer(&mut self, expected: &str, response: &str) {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("command within 5s")
            .unwrap();
        assert_eq!(line.trim_end(), expected);
        self.say(response).await;
    }

    async fn say(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }
}

fn with_body(status: &str, body: &str) -> String {
    format!("{status} {}\n{body}", body.len())
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<AdapterEvent>) -> AdapterEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within 5s")
        .expect("adapter alive")
}

const STACK: &str = r#"{
    {
        {"update", "@main/hero.script", 20, 31, "Lua", "", "main/hero.script"},
        {
            ["(*order)"] = {"self", "dt", "pos"},
            ["(*params)"] = 2,
            self = {"userdata: 0x10", "userdata"},
            dt = {0.016, "number"},
            pos = {"vmath.vector3(1, 2, 0)", "userdata"},
        },
        {},
    },
}"#;

// ── Session walkthrough ─────────────────────────────────────────

#[tokio::test]
async fn break_inspect_and_continue() {
    let project = PathBuf::from("/home/dev/hero");
    let options = AdapterOptions {
        port: 0,
        timeouts: Timeouts::default(),
        run_on_connect: true,
        ..AdapterOptions::default()
    };
    let adapter = DebugAdapter::new(options, PathResolver::new(&project));
    adapter
        .add_breakpoint(Breakpoint::new(project.join("main/hero.script"), 31))
        .await
        .unwrap();

    let (tx, mut events) = mpsc::unbounded_channel();
    adapter.on_event(move |event| {
        let _ = tx.send(event.clone());
    });
    let addr = adapter.start().await.unwrap();
    assert_eq!(adapter.session_state(), SessionState::Waiting);

    let mut game = Game::attach(addr).await;
    assert!(matches!(next_event(&mut events).await, AdapterEvent::Connected { .. }));
    game.answer("OUTPUT stdout c", "200 OK\n").await;
    game.answer("SETB main/hero.script 31", "200 OK\n").await;
    game.answer("SETB @main/hero.script 31", "200 OK\n").await;
    game.answer("RUN", "200 OK\n").await;

    game.say("202 Paused @main/hero.script 31\n").await;
    match next_event(&mut events).await {
        AdapterEvent::Paused {
            local_path, reason, ..
        } => {
            assert_eq!(local_path, Some(project.join("main/hero.script")));
            assert!(matches!(reason, PauseReason::Breakpoint(ref bp) if bp.line == 31));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let stack = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.stack_dump().await })
    };
    game.answer("STACK", &with_body("200 OK", STACK)).await;
    let dump = stack.await.unwrap().unwrap();
    let frame = &dump.current.frames[0];
    assert_eq!(frame.line, Some(31));
    let pos = frame.variables.iter().find(|v| v.name == "pos").unwrap();
    assert!(matches!(pos.value, ValueKind::Vector { .. }));

    let eval = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.evaluate("dt * 2", Some(1)).await })
    };
    game.answer("EXEC dt * 2 -- { stack = 1 }", &with_body("200 OK", "{0.032}"))
        .await;
    let values = eval.await.unwrap().unwrap();
    assert_eq!(values[0].value, ValueKind::Num(0.032));

    let run = adapter.run();
    game.answer("RUN", "200 OK\n").await;
    run.body().await.unwrap();
    assert_eq!(adapter.session_state(), SessionState::Running);

    drop(game);
    assert_eq!(next_event(&mut events).await, AdapterEvent::Disconnected);
    adapter.dispose();
}

#[tokio::test]
async fn remote_error_reaches_the_caller() {
    let options = AdapterOptions {
        port: 0,
        run_on_connect: false,
        ..AdapterOptions::default()
    };
    let adapter = DebugAdapter::new(options, PathResolver::new("/p"));
    let addr = adapter.start().await.unwrap();
    let mut game = Game::attach(addr).await;
    game.answer("OUTPUT stdout c", "200 OK\n").await;

    let eval = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.evaluate("nope(", None).await })
    };
    let message = "[string \"nope(\"]:1: unexpected symbol";
    game.answer("EXEC nope(", &with_body("401 Error in Expression", message))
        .await;
    let err = eval.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("Error in Expression"), "{err}");
    adapter.dispose();
}
