//! Upstream Relay Integration Tests
//!
//! Runs the stream client against a local mock vendor WebSocket server and
//! checks the wire protocol: initial subscribes, verbatim frame forwarding,
//! non-interleaved runtime subscribes, and permanent termination on close.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tick_relay::{RelayState, StreamClient, StreamClientConfig, StreamClientError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const TRADE_FRAME: &str = r#"{"type":"trade","data":[{"p":100.5,"s":"AAPL"}]}"#;

/// Bind a mock upstream listener on an ephemeral port.
async fn bind_mock() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn make_client(url: String, symbols: &[&str]) -> StreamClient {
    StreamClient::new(
        StreamClientConfig {
            endpoint: url,
            symbols: symbols.iter().map(ToString::to_string).collect(),
            subscribe_queue_capacity: 16,
        },
        CancellationToken::new(),
    )
}

fn parse_subscribe(frame: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(frame).expect("well-formed frame");
    assert_eq!(value["type"], "subscribe");
    value["symbol"].as_str().expect("symbol present").to_string()
}

#[tokio::test]
async fn initial_subscribe_then_trade_forwarded_verbatim() {
    let (listener, url) = bind_mock().await;
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(8);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // The very first frame on the wire must be the initial subscribe.
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            frame_tx.send(text.as_str().to_owned()).await.unwrap();
        }

        ws.send(Message::Text(TRADE_FRAME.into())).await.unwrap();

        // Hold the connection open until the peer goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = make_client(url, &["AAPL"]);
    let status = client.status();
    let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(16);
    let run = tokio::spawn(client.run(output_tx));

    let first = timeout(RECV_TIMEOUT, frame_rx.recv())
        .await
        .expect("subscribe timeout")
        .unwrap();
    assert_eq!(parse_subscribe(&first), "AAPL");

    let frame = timeout(RECV_TIMEOUT, output_rx.recv())
        .await
        .expect("trade timeout")
        .unwrap();
    assert_eq!(frame, Bytes::from_static(TRADE_FRAME.as_bytes()));
    assert!(status.is_streaming());

    run.abort();
    server.abort();
}

#[tokio::test]
async fn concurrent_subscribes_produce_whole_frames() {
    let (listener, url) = bind_mock().await;
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(8);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            if frame_tx.send(text.as_str().to_owned()).await.is_err() {
                break;
            }
        }
    });

    let client = make_client(url, &[]);
    let handle = client.subscribe_handle();
    let (output_tx, _output_rx) = mpsc::channel::<Bytes>(16);
    let run = tokio::spawn(client.run(output_tx));

    // Independent callers race to subscribe.
    let h1 = handle.clone();
    let h2 = handle.clone();
    let s1 = tokio::spawn(async move { h1.subscribe("TSLA".to_string()).await });
    let s2 = tokio::spawn(async move { h2.subscribe("GOOG".to_string()).await });
    s1.await.unwrap().unwrap();
    s2.await.unwrap().unwrap();

    // Each request yields exactly one well-formed frame; the write lock
    // prevents interleaving.
    let mut symbols = HashSet::new();
    for _ in 0..2 {
        let frame = timeout(RECV_TIMEOUT, frame_rx.recv())
            .await
            .expect("frame timeout")
            .unwrap();
        symbols.insert(parse_subscribe(&frame));
    }
    assert_eq!(
        symbols,
        HashSet::from(["TSLA".to_string(), "GOOG".to_string()])
    );

    run.abort();
    server.abort();
}

#[tokio::test]
async fn subscribe_before_start_is_flushed_on_connect() {
    let (listener, url) = bind_mock().await;
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(8);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            if frame_tx.send(text.as_str().to_owned()).await.is_err() {
                break;
            }
        }
    });

    let client = make_client(url, &[]);
    let handle = client.subscribe_handle();

    // Enqueued before the connection exists; buffered, not blocking.
    handle.try_subscribe("MSFT".to_string()).unwrap();

    let (output_tx, _output_rx) = mpsc::channel::<Bytes>(16);
    let run = tokio::spawn(client.run(output_tx));

    let frame = timeout(RECV_TIMEOUT, frame_rx.recv())
        .await
        .expect("frame timeout")
        .unwrap();
    assert_eq!(parse_subscribe(&frame), "MSFT");

    run.abort();
    server.abort();
}

#[tokio::test]
async fn upstream_close_terminates_relay_permanently() {
    let (listener, url) = bind_mock().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        ws.send(Message::Text(TRADE_FRAME.into())).await.unwrap();

        // Drop the connection abruptly.
        drop(ws);
    });

    let client = make_client(url, &[]);
    let status = client.status();
    let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(16);
    let run = tokio::spawn(client.run(output_tx));

    let frame = timeout(RECV_TIMEOUT, output_rx.recv())
        .await
        .expect("trade timeout")
        .unwrap();
    assert_eq!(frame, Bytes::from_static(TRADE_FRAME.as_bytes()));

    let result = timeout(RECV_TIMEOUT, run)
        .await
        .expect("run did not terminate")
        .unwrap();
    assert!(matches!(
        result,
        Err(StreamClientError::ConnectionClosed | StreamClientError::WebSocket(_))
    ));
    assert_eq!(status.state(), RelayState::Terminated);

    // The output channel is closed for good: no reconnect, no further bytes.
    assert!(output_rx.recv().await.is_none());

    server.await.unwrap();
}
