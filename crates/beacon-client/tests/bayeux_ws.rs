//! End-to-end tests against an in-process Bayeux server over WebSocket.
//!
//! The server implements just enough of the protocol for the client's
//! lifecycle: handshake grants clientId "c1" (for protocol version "1.0"
//! and a websocket-capable client), connect/disconnect are acknowledged,
//! subscriptions are tracked per connection, and publishes to a subscribed
//! channel are echoed back as deliveries.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_client::{Client, ClientConfig, ClientError, ConnectionState, ExtensionPipeline};
use beacon_protocol::{channel, codec, Advice, Message, Reconnect};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Err(e) = handle_conn(stream).await {
                    tracing::debug!("server connection ended: {e}");
                }
            });
        }
    });
    addr
}

async fn handle_conn(stream: TcpStream) -> Result<()> {
    let ws = accept_async(stream).await?;
    let (mut tx, mut rx) = ws.split();
    let mut subscribed: HashSet<String> = HashSet::new();

    while let Some(frame) = rx.next().await {
        let WsMessage::Text(text) = frame? else {
            continue;
        };
        let batch = codec::decode_batch(&text)?;
        let request = &batch[0];
        let mut disconnecting = false;

        let replies = match request.channel.as_str() {
            channel::HANDSHAKE => {
                let supported = request
                    .supported_connection_types
                    .iter()
                    .any(|t| t == "websocket");
                if request.version == "1.0" && supported {
                    vec![Message {
                        channel: channel::HANDSHAKE.to_string(),
                        client_id: "c1".to_string(),
                        successful: Some(true),
                        version: "1.0".to_string(),
                        supported_connection_types: vec!["websocket".to_string()],
                        ..Message::default()
                    }]
                } else {
                    vec![Message {
                        channel: channel::HANDSHAKE.to_string(),
                        successful: Some(false),
                        error: Some("unsupported protocol version".to_string()),
                        ..Message::default()
                    }]
                }
            }
            channel::CONNECT => {
                let known = request.client_id == "c1";
                vec![Message {
                    channel: channel::CONNECT.to_string(),
                    id: request.id.clone(),
                    successful: Some(known),
                    error: (!known).then(|| "402::unknown client".to_string()),
                    advice: Some(Advice {
                        reconnect: Some(Reconnect::Retry),
                        timeout: Some(30_000),
                        interval: Some(0),
                    }),
                    ..Message::default()
                }]
            }
            channel::DISCONNECT => {
                disconnecting = true;
                vec![Message {
                    channel: channel::DISCONNECT.to_string(),
                    id: request.id.clone(),
                    successful: Some(true),
                    ..Message::default()
                }]
            }
            channel::SUBSCRIBE => {
                if request.subscription == "/unauthorized" {
                    vec![Message {
                        channel: channel::SUBSCRIBE.to_string(),
                        id: request.id.clone(),
                        subscription: request.subscription.clone(),
                        successful: Some(false),
                        error: Some("403:/unauthorized:Unauthorized".to_string()),
                        ..Message::default()
                    }]
                } else {
                    subscribed.insert(request.subscription.clone());
                    vec![Message {
                        channel: channel::SUBSCRIBE.to_string(),
                        id: request.id.clone(),
                        subscription: request.subscription.clone(),
                        successful: Some(true),
                        ..Message::default()
                    }]
                }
            }
            channel::UNSUBSCRIBE => {
                subscribed.remove(&request.subscription);
                vec![Message {
                    channel: channel::UNSUBSCRIBE.to_string(),
                    id: request.id.clone(),
                    subscription: request.subscription.clone(),
                    successful: Some(true),
                    ..Message::default()
                }]
            }
            app_channel => {
                // A publish: echo a delivery to subscribers, otherwise ack.
                if subscribed.contains(app_channel) {
                    vec![Message {
                        channel: app_channel.to_string(),
                        data: request.data.clone(),
                        ..Message::default()
                    }]
                } else {
                    vec![Message {
                        channel: app_channel.to_string(),
                        id: request.id.clone(),
                        successful: Some(true),
                        ..Message::default()
                    }]
                }
            }
        };

        for reply in replies {
            let payload = codec::encode_batch(std::slice::from_ref(&reply))?;
            tx.send(WsMessage::Text(payload)).await?;
        }
        if disconnecting {
            break;
        }
    }
    Ok(())
}

async fn connected_client(addr: SocketAddr) -> Client {
    let url = format!("ws://{addr}/bayeux");
    let client = Client::dial(&url, ClientConfig::default(), ExtensionPipeline::new())
        .await
        .expect("dial");
    client.handshake().await.expect("handshake");
    client.connect().await.expect("connect");
    client
}

#[tokio::test]
async fn test_handshake_and_connect_negotiate_client_id() {
    init_logging();
    let addr = spawn_server().await;

    let client = connected_client(addr).await;
    assert_eq!(client.client_id().as_deref(), Some("c1"));

    // The connect ack carried reconnect advice; it is stored, not acted on.
    let advice = client.advice().expect("advice stored");
    assert_eq!(advice.reconnect, Some(Reconnect::Retry));

    client.disconnect().await.expect("disconnect");
    let mut state = client.state();
    state
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_subscribe_and_receive_ten_messages() {
    init_logging();
    let addr = spawn_server().await;
    let client = connected_client(addr).await;

    let mut sub = client.subscribe_stream("/test").await.expect("subscribe");
    for _ in 0..10 {
        client
            .publish("/test", json!("hello world"))
            .await
            .expect("publish");
    }

    for _ in 0..10 {
        let frame = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("delivery timed out")
            .expect("mailbox closed early");
        assert_eq!(frame.data, json!("hello world"));
    }

    sub.unsubscribe().await.expect("unsubscribe");
    client.disconnect().await.expect("disconnect");
}

#[tokio::test]
async fn test_publish_acknowledgment_reaches_callback() {
    init_logging();
    let addr = spawn_server().await;
    let client = connected_client(addr).await;

    let acked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&acked);
    client.on_publish_response("/updates", move |frame| {
        assert_eq!(frame.successful, Some(true));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let id = client
        .publish("/updates", json!({"seq": 1}))
        .await
        .expect("publish");
    assert!(!id.is_empty());

    tokio::time::timeout(Duration::from_secs(5), async {
        while acked.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("publish ack never arrived");

    client.disconnect().await.expect("disconnect");
}

#[tokio::test]
async fn test_subscribe_unauthorized_returns_error() {
    init_logging();
    let addr = spawn_server().await;
    let client = connected_client(addr).await;

    let result = client
        .subscribe("/unauthorized", |_data| {
            panic!("received message on unauthorized channel")
        })
        .await;

    match result {
        Err(ClientError::Protocol { channel, reason }) => {
            assert_eq!(channel, "/unauthorized");
            assert!(reason.contains("Unauthorized"));
        }
        other => panic!("expected subscribe rejection, got {other:?}"),
    }

    client.disconnect().await.expect("disconnect");
}
