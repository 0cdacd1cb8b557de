use futures_util::{SinkExt, Stream, StreamExt};
use interpreter_api::{
    config::{Config, UpstreamConfig},
    router::create_router,
    state::AppState,
};
use interpreter_core::{Modality, SessionConfig, codec};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async, connect_async,
    tungstenite::{
        self, Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

const WAIT: Duration = Duration::from_secs(10);

struct UpstreamHeaders {
    authorization: Option<String>,
    beta: Option<String>,
}

/// Starts the relay service pointed at `upstream` and returns its address.
async fn start_service(upstream: SocketAddr) -> SocketAddr {
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        upstream: UpstreamConfig {
            url: format!("ws://{upstream}/v1/realtime?model=test-model"),
            api_key: SecretString::from("sk-e2e".to_string()),
            beta: "realtime=v1".to_string(),
        },
        session: SessionConfig {
            voice: "alloy".to_string(),
            instructions: "Interpret.".to_string(),
            modalities: vec![Modality::Text, Modality::Audio],
            temperature: 0.8,
        },
        ready_timeout: None,
        log_level: tracing::Level::INFO,
    };
    let state = Arc::new(AppState::new(&config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    addr
}

/// Accepts exactly one upstream connection, recording its handshake headers.
async fn accept_upstream(
    listener: TcpListener,
) -> (WebSocketStream<TcpStream>, UpstreamHeaders) {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let (headers_tx, headers_rx) = oneshot::channel();
    let callback = move |req: &Request, resp: Response| {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let _ = headers_tx.send(UpstreamHeaders {
            authorization: header("authorization"),
            beta: header("openai-beta"),
        });
        Ok::<Response, ErrorResponse>(resp)
    };
    let ws = accept_hdr_async(stream, callback).await.unwrap();
    (ws, headers_rx.await.unwrap())
}

/// Next data or close frame; `None` once the stream has ended.
async fn next_frame<S>(ws: &mut S) -> Option<Message>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out waiting for frame") {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(msg)) => return Some(msg),
            Some(Err(_)) | None => return None,
        }
    }
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    match next_frame(ws).await {
        Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected a JSON text frame, got {:?}", other),
    }
}

fn is_closed(frame: Option<Message>) -> bool {
    matches!(frame, None | Some(Message::Close(_)))
}

async fn setup() -> (
    WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>,
    WebSocketStream<TcpStream>,
    UpstreamHeaders,
) {
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let service = start_service(upstream_listener.local_addr().unwrap()).await;
    let (client, _) = connect_async(format!("ws://{service}/media-stream"))
        .await
        .unwrap();
    let (upstream, headers) = accept_upstream(upstream_listener).await;
    (client, upstream, headers)
}

#[tokio::test]
async fn test_end_to_end_relay() {
    let (mut client, mut upstream, headers) = setup().await;
    assert_eq!(headers.authorization.as_deref(), Some("Bearer sk-e2e"));
    assert_eq!(headers.beta.as_deref(), Some("realtime=v1"));

    client
        .send(Message::Binary(b"A1".to_vec().into()))
        .await
        .unwrap();
    upstream
        .send(Message::Text(json!({ "type": "session.created" }).to_string().into()))
        .await
        .unwrap();

    // Appends and the update travel in different directions, so either may come first.
    let mut saw_update = false;
    let mut saw_append = false;
    while !(saw_update && saw_append) {
        let event = next_json(&mut upstream).await;
        match event["type"].as_str() {
            Some("session.update") => {
                assert!(!saw_update, "session.update sent twice");
                assert_eq!(event["session"]["voice"], "alloy");
                assert_eq!(event["session"]["modalities"], json!(["text", "audio"]));
                saw_update = true;
            }
            Some("input_audio_buffer.append") => {
                assert_eq!(event["audio"], codec::encode(b"A1"));
                saw_append = true;
            }
            other => panic!("Unexpected upstream event {:?}", other),
        }
    }

    for event in [
        json!({ "type": "input_audio_buffer.speech_started" }),
        json!({ "type": "response.audio.delta", "delta": codec::encode(b"A2") }),
        json!({ "type": "response.audio.delta" }),
        json!({ "type": "response.audio_transcript.done", "transcript": "Hello there" }),
    ] {
        upstream
            .send(Message::Text(event.to_string().into()))
            .await
            .unwrap();
    }

    match next_frame(&mut client).await {
        Some(Message::Binary(data)) => assert_eq!(&data[..], b"A2"),
        other => panic!("Expected audio frame, got {:?}", other),
    }
    match next_frame(&mut client).await {
        Some(Message::Text(text)) => assert_eq!(text.as_str(), "Hello there"),
        other => panic!("Expected transcript frame, got {:?}", other),
    }

    client.close(None).await.unwrap();
    assert!(is_closed(next_frame(&mut upstream).await));
}

#[tokio::test]
async fn test_upstream_close_closes_client() {
    let (mut client, mut upstream, _) = setup().await;

    upstream.close(None).await.unwrap();
    assert!(is_closed(next_frame(&mut client).await));
}

#[tokio::test]
async fn test_malformed_upstream_message_closes_client() {
    let (mut client, mut upstream, _) = setup().await;

    upstream
        .send(Message::Text("definitely not json".to_string().into()))
        .await
        .unwrap();
    assert!(is_closed(next_frame(&mut client).await));
}
