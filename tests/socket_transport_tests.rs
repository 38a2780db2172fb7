// SocketTransport against a local WebSocket server

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use common::setup_logging;
use gigconnect::error::MessagingError;
use gigconnect::models::{ConversationId, UserId};
use gigconnect::transport::frame;
use gigconnect::transport::{
    ClientEvent, ReconnectPolicy, ServerEvent, SocketTransport, Subscription, Transport, TypingPayload,
};

/// One accepted client connection, seen from the server side.
struct ServerConn {
    auth: Option<String>,
    received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<WsMessage>,
}

impl ServerConn {
    fn push_event(&self, event: &ServerEvent) {
        let text = frame::encode_server_event(event).unwrap().unwrap();
        self.push.send(WsMessage::text(text)).unwrap();
    }
}

async fn spawn_server() -> (String, mpsc::UnboundedReceiver<ServerConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let mut auth = None;
                let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    auth = request
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string());
                    Ok(response)
                };
                let ws = match accept_hdr_async(stream, callback).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };

                let (mut sink, mut source) = ws.split();
                let (received_tx, received_rx) = mpsc::unbounded_channel();
                let (push_tx, mut push_rx) = mpsc::unbounded_channel::<WsMessage>();
                let _ = conn_tx.send(ServerConn {
                    auth,
                    received: received_rx,
                    push: push_tx,
                });

                loop {
                    tokio::select! {
                        incoming = source.next() => match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                let _ = received_tx.send(text.as_str().to_string());
                            }
                            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                        outgoing = push_rx.recv() => match outgoing {
                            Some(message) => {
                                if sink.send(message).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            });
        }
    });

    (url, conn_rx)
}

fn fast_policy(attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        attempts,
        delay: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(2),
    }
}

async fn next_event(subscription: &mut Subscription) -> ServerEvent {
    timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("no event within 5s")
        .expect("subscription closed")
}

async fn next_conn(conns: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
    timeout(Duration::from_secs(5), conns.recv())
        .await
        .expect("no connection within 5s")
        .expect("server stopped")
}

#[tokio::test]
async fn test_connect_authenticates_and_exchanges_events() {
    setup_logging();
    let (url, mut conns) = spawn_server().await;
    let transport = SocketTransport::new(url, fast_policy(2));
    let mut events = transport.subscribe();

    transport.connect("secret-token").await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected);

    let mut conn = next_conn(&mut conns).await;
    assert_eq!(conn.auth.as_deref(), Some("Bearer secret-token"));

    transport
        .emit(ClientEvent::JoinRoom(ConversationId::from("7")))
        .unwrap();
    transport
        .emit(ClientEvent::Typing(TypingPayload {
            conversation_id: ConversationId::from("7"),
            user_id: UserId::from("1"),
        }))
        .unwrap();

    let join: serde_json::Value = serde_json::from_str(&conn.received.recv().await.unwrap()).unwrap();
    assert_eq!(join, json!({"event": "join_room", "data": "7"}));
    let typing: serde_json::Value = serde_json::from_str(&conn.received.recv().await.unwrap()).unwrap();
    assert_eq!(
        typing,
        json!({"event": "typing", "data": {"conversationId": "7", "userId": "1"}})
    );

    conn.push_event(&ServerEvent::UserOnline(UserId::from("2")));
    assert_eq!(next_event(&mut events).await, ServerEvent::UserOnline(UserId::from("2")));

    // Unknown and malformed frames are skipped
    conn.push.send(WsMessage::text(r#"{"event": "friend_request", "data": {}}"#)).unwrap();
    conn.push.send(WsMessage::text("not json")).unwrap();
    conn.push_event(&ServerEvent::UserOffline(UserId::from("2")));
    assert_eq!(next_event(&mut events).await, ServerEvent::UserOffline(UserId::from("2")));

    transport.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    setup_logging();
    let (url, mut conns) = spawn_server().await;
    let transport = SocketTransport::new(url, fast_policy(2));
    let mut events = transport.subscribe();

    transport.connect("token").await.unwrap();
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected);
    let mut conn = next_conn(&mut conns).await;

    transport.disconnect().await;
    transport.disconnect().await;
    assert!(!transport.is_connected());
    assert!(matches!(next_event(&mut events).await, ServerEvent::Disconnected { .. }));
    assert!(events.try_recv().is_none());

    // The server sees the connection go away
    let closed = timeout(Duration::from_secs(5), conn.received.recv()).await.unwrap();
    assert!(closed.is_none());

    let err = transport
        .emit(ClientEvent::JoinRoom(ConversationId::from("7")))
        .unwrap_err();
    assert_eq!(err, MessagingError::TransportUnavailable("join_room"));
}

#[tokio::test]
async fn test_connect_fails_after_retry_budget() {
    setup_logging();
    // Reserve a port and free it so nothing listens there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = SocketTransport::new(format!("ws://{}", addr), fast_policy(2));
    let err = transport.connect("token").await.unwrap_err();

    match err {
        MessagingError::ConnectFailed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("Expected ConnectFailed, got {:?}", other),
    }
    assert!(!transport.is_connected());
    assert!(transport.emit(ClientEvent::JoinRoom(ConversationId::from("1"))).is_err());
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    setup_logging();
    let (url, mut conns) = spawn_server().await;
    let transport = SocketTransport::new(url, fast_policy(3));
    let mut events = transport.subscribe();

    transport.connect("token").await.unwrap();
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected);
    let first = next_conn(&mut conns).await;

    first.push.send(WsMessage::Close(None)).unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::Disconnected { .. }));
    assert_eq!(next_event(&mut events).await, ServerEvent::Connected);
    assert!(transport.is_connected());

    let second = next_conn(&mut conns).await;
    assert_eq!(second.auth.as_deref(), Some("Bearer token"));

    transport.disconnect().await;
}

#[tokio::test]
async fn test_connect_replaces_existing_connection() {
    setup_logging();
    let (url, mut conns) = spawn_server().await;
    let transport = SocketTransport::new(url, fast_policy(2));

    transport.connect("first").await.unwrap();
    let mut first = next_conn(&mut conns).await;

    transport.connect("second").await.unwrap();
    let second = next_conn(&mut conns).await;
    assert_eq!(second.auth.as_deref(), Some("Bearer second"));

    let closed = timeout(Duration::from_secs(5), first.received.recv()).await.unwrap();
    assert!(closed.is_none());
    assert!(transport.is_connected());

    transport.disconnect().await;
}
