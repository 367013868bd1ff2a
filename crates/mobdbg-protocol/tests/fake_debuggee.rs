use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mobdbg_protocol::{
    ConnectionEvent, ConnectionServer, Dispatcher, Event, Timeouts, Transport,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

// ── Fake debuggee ───────────────────────────────────────────────

struct FakeDebuggee {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeDebuggee {
    async fn connect(addr: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn read_command(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("command within 5s")
            .unwrap();
        line.trim_end().to_string()
    }

    async fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }
}

fn engine() -> (Arc<ConnectionServer>, Dispatcher) {
    let server = ConnectionServer::new("127.0.0.1", 0);
    let transport: Arc<dyn Transport> = server.clone();
    let dispatcher = Dispatcher::new(transport, Timeouts::default());
    let weak = dispatcher.downgrade();
    server.on_line(move |line| {
        if let Some(d) = weak.upgrade() {
            d.handle_line(line);
        }
    });
    (server, dispatcher)
}

const STACK_BODY: &str = r#"{{{"update", "@main/player.script", 10, 14}, {
    ["(*order)"] = {"self", "dt"},
    ["(*params)"] = 2,
    self = {"userdata: 0x7f00", "userdata"},
    dt = {0.016, "number"},
}, {}}}"#;

// ── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn commands_sent_before_connect_are_flushed_in_order() {
    let (server, dispatcher) = engine();
    let addr = server.start().await.unwrap();

    let basedir = dispatcher.basedir("/game/");
    let run = dispatcher.run();
    assert_eq!(server.backlog_len(), 1, "only the queue head is written");

    let mut debuggee = FakeDebuggee::connect(addr).await;
    assert_eq!(debuggee.read_command().await, "BASEDIR /game/");
    debuggee.send("200 OK\n").await;
    assert_eq!(basedir.await.unwrap(), Event::Ok { message: None });

    assert_eq!(debuggee.read_command().await, "RUN");
    debuggee.send("200 OK\n").await;
    assert!(!run.await.unwrap().is_error());
    server.dispose();
}

#[tokio::test]
async fn second_client_is_rejected() {
    let (server, _dispatcher) = engine();
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.on_connection_event(move |event| {
        let _ = tx.send(event.clone());
    });
    let addr = server.start().await.unwrap();

    let _first = FakeDebuggee::connect(addr).await;
    assert!(matches!(rx.recv().await, Some(ConnectionEvent::Connected { .. })));

    let mut second = TcpStream::connect(addr).await.unwrap();
    assert!(matches!(
        rx.recv().await,
        Some(ConnectionEvent::DuplicateRejected { .. })
    ));
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), second.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "rejected socket is closed");
    assert!(server.is_connected());
    server.dispose();
}

#[tokio::test]
async fn stack_dump_round_trip() {
    let (server, dispatcher) = engine();
    let addr = server.start().await.unwrap();
    let mut debuggee = FakeDebuggee::connect(addr).await;

    let pending = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.stack_dump(None).await })
    };
    assert_eq!(debuggee.read_command().await, "STACK");
    debuggee
        .send(&format!("200 OK {}\n{}", STACK_BODY.len(), STACK_BODY))
        .await;

    let dump = pending.await.unwrap().unwrap();
    let frame = &dump.current.frames[0];
    assert_eq!(frame.name, "update");
    assert_eq!(frame.line, Some(14));
    let names: Vec<_> = frame.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["self", "dt"]);
    server.dispose();
}

#[tokio::test]
async fn exec_returns_body_and_pause_is_broadcast() {
    let (server, dispatcher) = engine();
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher.on_event(move |event| {
        let _ = tx.send(event.clone());
    });
    let addr = server.start().await.unwrap();
    let mut debuggee = FakeDebuggee::connect(addr).await;

    let reply = dispatcher.exec("return 40 + 2", Some(3), None);
    assert_eq!(
        debuggee.read_command().await,
        "EXEC return 40 + 2 -- { stack = 3 }"
    );
    debuggee.send("202 Paused main.lua 7\n200 OK 2\n42").await;

    assert_eq!(reply.body().await.unwrap().as_deref(), Some("42"));
    assert_eq!(
        rx.recv().await,
        Some(Event::Paused {
            file: "main.lua".into(),
            line: 7,
            watch_index: None,
        })
    );
    server.dispose();
}

#[tokio::test]
async fn disconnect_fails_pending_commands() {
    let (server, dispatcher) = engine();
    let d = dispatcher.clone();
    server.on_connection_event(move |event| {
        if *event == ConnectionEvent::Disconnected {
            d.handle_disconnect();
        }
    });
    let addr = server.start().await.unwrap();
    let mut debuggee = FakeDebuggee::connect(addr).await;

    let reply = dispatcher.step();
    assert_eq!(debuggee.read_command().await, "STEP");
    drop(debuggee);

    assert_eq!(
        reply.await.unwrap(),
        Event::Error {
            message: "Disconnected".into(),
            details: None,
        }
    );
    server.dispose();
}
