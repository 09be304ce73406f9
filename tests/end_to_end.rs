//! End-to-end tests against a real local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use cameron_client::audio::{
    AudioChunk, CaptureBackend, CaptureError, CaptureGuard, CaptureSource, ChunkSender,
};
use cameron_client::config::AppConfig;
use cameron_client::connection::WsConnector;
use cameron_client::pipeline::{Session, Severity, TextSink};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Lines(Mutex<Vec<String>>);

impl Lines {
    fn contains(&self, line: &str) -> bool {
        self.0.lock().unwrap().iter().any(|l| l == line)
    }

    fn count(&self, line: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|l| *l == line).count()
    }
}

impl TextSink for Lines {
    fn emit(&self, _severity: Severity, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

/// Capture source that produces one mono chunk holding the samples 256, 512.
struct FixedChunk;

impl CaptureSource for FixedChunk {
    fn start(&self, tx: ChunkSender) -> Result<CaptureGuard, CaptureError> {
        tx.offer(AudioChunk {
            samples: vec![256.0 / 32767.0, 512.0 / 32767.0],
            sample_rate: 16_000,
            channels: 1,
        });
        Ok(CaptureGuard::new(tx))
    }

    fn describe(&self) -> String {
        "fixed chunk".into()
    }
}

impl CaptureBackend for FixedChunk {
    fn is_supported(&self) -> bool {
        true
    }

    fn acquire(&self) -> Result<Box<dyn CaptureSource>, CaptureError> {
        Ok(Box::new(FixedChunk))
    }
}

async fn pump_until(session: &mut Session, sink: &Lines, line: &str, times: usize) {
    tokio::time::timeout(WAIT, async {
        while sink.count(line) < times {
            assert!(session.pump().await, "connection driver stopped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {line:?}"));
}

fn config_for(addr: std::net::SocketAddr) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.host = addr.to_string();
    config
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audio_goes_up_and_text_comes_back() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uplink_tx, uplink_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => break data,
                Some(Ok(_)) => continue,
                other => panic!("unexpected: {other:?}"),
            }
        };
        let _ = uplink_tx.send(first);

        // Noise the client must survive: text, an empty binary, an unknown tag.
        ws.send(Message::Text("ignored".into())).await.unwrap();
        ws.send(Message::Binary(vec![])).await.unwrap();
        ws.send(Message::Binary(vec![0xFF, 1, 2])).await.unwrap();
        ws.send(Message::Binary(b"\x02hello".to_vec())).await.unwrap();

        // Hold the socket open until the client closes it.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let sink = Arc::new(Lines::default());
    let mut session = Session::new(
        &config_for(addr),
        Arc::new(WsConnector),
        None,
        sink.clone(),
    );
    session.connect();
    pump_until(&mut session, &sink, "websocket connection opened", 1).await;

    let capture = session.start_capture(&FixedChunk).expect("capture starts");
    capture.stop();

    let uplinked = tokio::time::timeout(WAIT, uplink_rx)
        .await
        .expect("server saw a frame")
        .unwrap();
    assert_eq!(uplinked, vec![0x01, 0x00, 0x01, 0x00, 0x02]);

    pump_until(&mut session, &sink, "transcribe result: hello", 1).await;

    let stats = session.close().await;
    assert_eq!(stats.connection.frames_sent, 1);
    assert_eq!(stats.connection.malformed_dropped, 1);
    assert_eq!(stats.capture.frames_sent, 1);
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First connection is closed straight away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second one stays up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut config = config_for(addr);
    config.reconnect.delay_ms = 50;

    let sink = Arc::new(Lines::default());
    let mut session = Session::new(&config, Arc::new(WsConnector), None, sink.clone());
    session.connect();

    pump_until(&mut session, &sink, "websocket connection opened", 2).await;
    assert!(sink.contains("websocket connection closed, reconnecting..."));

    let stats = session.close().await;
    assert_eq!(stats.connection.connect_attempts, 2);
}

#[tokio::test]
async fn refused_connection_keeps_retrying() {
    // Grab a free port, then close the listener so connects are refused.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let mut config = config_for(addr);
    config.reconnect.delay_ms = 20;

    let sink = Arc::new(Lines::default());
    let mut session = Session::new(&config, Arc::new(WsConnector), None, sink.clone());
    session.connect();

    tokio::time::timeout(WAIT, async {
        while session.connection().stats().connect_attempts < 3 {
            session.pump().await;
        }
    })
    .await
    .expect("kept retrying");

    assert!(!sink.contains("websocket connection opened"));
    session.close().await;
}
