//! Connection lifecycle integration tests.
//!
//! Each test runs the client against a local WebSocket server and
//! asserts on the events delivered to listeners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kite_stream_client::{
    Credentials, ReconnectConfig, Tick, TickerClient, TickerClientError, TickerConfig, TickerEvent,
};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Build a frame: [u16 count][u16 len][payload]...
fn frame(payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&u16::try_from(payloads.len()).unwrap().to_be_bytes());
    for p in payloads {
        out.extend_from_slice(&u16::try_from(p.len()).unwrap().to_be_bytes());
        out.extend_from_slice(p);
    }
    out
}

/// An 8-byte LTP payload.
fn ltp_payload(token: u32, raw_price: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&token.to_be_bytes());
    p.extend_from_slice(&raw_price.to_be_bytes());
    p
}

fn test_config(addr: std::net::SocketAddr, reconnect: ReconnectConfig) -> TickerConfig {
    let mut config = TickerConfig::new(Credentials::new(
        "AB1234".to_string(),
        "enctoken".to_string(),
    ));
    config.root_url = format!("ws://{addr}/");
    config.reconnect = reconnect;
    config
}

/// Register listeners that record event names in arrival order.
fn record_events(client: &TickerClient) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in [
        "connect",
        "ticks",
        "disconnect",
        "error",
        "close",
        "reconnect",
        "noreconnect",
        "order_update",
    ] {
        let log = log.clone();
        client.on(name, move |_| log.lock().unwrap().push(name.to_string()));
    }
    log
}

#[tokio::test]
async fn streams_ticks_and_order_updates() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let raw = frame(&[&ltp_payload(0x0000_0101, 12_345)]);
        ws.send(Message::Binary(raw.into())).await.unwrap();

        // A 1-byte server heartbeat must not produce a ticks event
        ws.send(Message::Binary(vec![0u8].into())).await.unwrap();

        ws.send(Message::Text(
            r#"{"type":"order","data":{"order_id":"X1"}}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(r#"{"type":"noise"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text("{malformed".into())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = test_config(addr, ReconnectConfig::new(false, None, None));
    let client = Arc::new(TickerClient::new(config, CancellationToken::new()));

    let events = record_events(&client);
    let ticks: Arc<Mutex<Vec<Tick>>> = Arc::new(Mutex::new(Vec::new()));
    let orders = Arc::new(Mutex::new(Vec::new()));
    {
        let ticks = ticks.clone();
        client.on("ticks", move |event| {
            if let TickerEvent::Ticks(batch) = event {
                ticks.lock().unwrap().extend(batch.iter().cloned());
            }
        });
    }
    {
        let orders = orders.clone();
        client.on("order_update", move |event| {
            if let TickerEvent::OrderUpdate(payload) = event {
                orders.lock().unwrap().push(payload.clone());
            }
        });
    }

    let result = tokio::time::timeout(Duration::from_secs(10), Arc::clone(&client).run())
        .await
        .expect("client should stop when the server closes");
    assert!(result.is_ok());
    server.await.unwrap();

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].instrument_token, 0x0000_0101);
    assert_eq!(ticks[0].last_price, Decimal::new(12_345, 2));

    let orders = orders.lock().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["order_id"], "X1");

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec!["connect", "ticks", "order_update", "close", "disconnect"]
    );
}

#[tokio::test]
async fn subscribe_reaches_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (request_tx, request_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                request_tx.send(text.to_string()).unwrap();
                break;
            }
        }
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = test_config(addr, ReconnectConfig::new(false, None, None));
    let client = Arc::new(TickerClient::new(config, CancellationToken::new()));

    let runner = tokio::spawn(Arc::clone(&client).run());

    // Wait for the connection, then subscribe
    for _ in 0..100 {
        if client.connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(client.connected());
    assert_eq!(client.subscribe(vec![408_065]), vec![408_065]);

    let received = tokio::time::timeout(Duration::from_secs(5), request_rx)
        .await
        .expect("server should receive the request")
        .unwrap();
    assert_eq!(received, r#"{"a":"subscribe","v":[408065]}"#);

    server.await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), runner).await;
}

#[tokio::test]
async fn silent_server_triggers_single_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Say nothing; just hold the socket open until the client gives up
        while ws.next().await.is_some() {}
    });

    let mut config = test_config(addr, ReconnectConfig::new(false, None, None));
    config.read_timeout = Duration::from_millis(200);
    let client = Arc::new(TickerClient::new(config, CancellationToken::new()));

    let events = record_events(&client);
    let reasons = Arc::new(Mutex::new(Vec::new()));
    {
        let reasons = reasons.clone();
        client.on("disconnect", move |event| {
            if let TickerEvent::Disconnect(reason) = event {
                reasons.lock().unwrap().push(reason.clone());
            }
        });
    }

    let result = tokio::time::timeout(Duration::from_secs(10), Arc::clone(&client).run())
        .await
        .expect("watchdog should end the connection");
    assert!(result.is_ok());

    // The forced teardown surfaces as a close, then exactly one disconnect
    let events = events.lock().unwrap();
    assert_eq!(*events, vec!["connect", "close", "disconnect"]);
    assert_eq!(
        *reasons.lock().unwrap(),
        vec![Some("read timeout".to_string())]
    );

    server.abort();
}

#[tokio::test]
async fn transport_error_fires_error_close_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Tear the TCP stream down without a close handshake; the client's
    // next read fails at the transport level.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });

    let config = test_config(addr, ReconnectConfig::new(false, None, None));
    let client = Arc::new(TickerClient::new(config, CancellationToken::new()));
    let events = record_events(&client);

    let result = tokio::time::timeout(Duration::from_secs(10), Arc::clone(&client).run())
        .await
        .expect("client should stop on transport error");
    assert!(result.is_ok());
    server.await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(*events, vec!["connect", "error", "close", "disconnect"]);
}

#[tokio::test]
async fn connect_reopens_after_run_loop_ends() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // First connection is closed by the server, ending the run loop
    // (reconnect disabled); the second is held open.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = test_config(addr, ReconnectConfig::new(false, None, None));
    let client = Arc::new(TickerClient::new(config, CancellationToken::new()));

    let result = tokio::time::timeout(Duration::from_secs(10), Arc::clone(&client).run())
        .await
        .expect("first session should end when the server closes");
    assert!(result.is_ok());
    assert!(!client.connected());

    // A finished loop must not wedge the client: connect() starts a
    // fresh session over the same channel.
    client.connect();
    for _ in 0..250 {
        if client.connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(
        client.connected(),
        "connect() after the run loop ended must open a new socket"
    );

    server.abort();
}

#[tokio::test]
async fn reconnects_then_exhausts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // One connection is served and immediately closed; afterwards the
    // port is dead and every retry fails.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
        drop(listener);
    });

    // max_attempts 0 allows exactly one retry before exhaustion
    let config = test_config(addr, ReconnectConfig::new(true, Some(0), None));
    let client = Arc::new(TickerClient::new(config, CancellationToken::new()));

    let events = record_events(&client);
    let retries = Arc::new(Mutex::new(Vec::new()));
    {
        let retries = retries.clone();
        client.on("reconnect", move |event| {
            if let TickerEvent::Reconnect { attempt, delay } = event {
                retries.lock().unwrap().push((*attempt, *delay));
            }
        });
    }

    let result = tokio::time::timeout(Duration::from_secs(30), Arc::clone(&client).run())
        .await
        .expect("client should exhaust retries");
    assert!(matches!(result, Err(TickerClientError::ReconnectExhausted)));
    server.await.unwrap();

    assert_eq!(
        *retries.lock().unwrap(),
        vec![(1, Duration::from_secs(1))],
        "first retry fires after the 1 s base delay"
    );

    let events = events.lock().unwrap();
    assert_eq!(
        events.iter().filter(|e| *e == "noreconnect").count(),
        1,
        "exhaustion must fire noreconnect exactly once"
    );
    // No further connect after exhaustion
    assert_eq!(events.iter().filter(|e| *e == "connect").count(), 1);
}

#[tokio::test]
async fn cancellation_stops_the_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = test_config(addr, ReconnectConfig::default());
    let cancel = CancellationToken::new();
    let client = Arc::new(TickerClient::new(config, cancel.clone()));

    let runner = tokio::spawn(Arc::clone(&client).run());

    for _ in 0..100 {
        if client.connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(client.connected());

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("client should stop on cancellation")
        .unwrap();
    assert!(result.is_ok());
    assert!(!client.connected());

    server.abort();
}
