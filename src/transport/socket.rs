// WebSocket transport
// Contains connect, disconnect and the supervisor task that owns the socket

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{frame, ClientEvent, EventBus, ReconnectPolicy, ServerEvent, Subscription, Transport};
use crate::error::MessagingError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// How long disconnect waits for the close handshake before aborting the task
const CLOSE_GRACE: Duration = Duration::from_secs(1);

struct Shared {
    connected: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport over a single WebSocket connection with bounded reconnection.
pub struct SocketTransport {
    url: String,
    policy: ReconnectPolicy,
    bus: EventBus,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SocketTransport {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        SocketTransport {
            url: url.into(),
            policy,
            bus: EventBus::new(),
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                outbound: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn build_request(url: &str, token: &str) -> Result<Request, String> {
    let mut request = url.into_client_request().map_err(|e| format!("Invalid socket URL '{}': {}", url, e))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| format!("Invalid auth token: {}", e))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

enum Established {
    Connected(WsStream),
    Exhausted(MessagingError),
    Shutdown,
}

enum PumpExit {
    Dropped(String),
    Shutdown,
}

/// Sleep for `delay`, discarding anything emitted meanwhile. Returns false on shutdown.
async fn idle(outbound: &mut mpsc::UnboundedReceiver<String>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            frame = outbound.recv() => match frame {
                Some(text) => debug!("Dropping frame queued while disconnected: {}", text),
                None => return false,
            },
        }
    }
}

async fn establish(
    url: &str,
    token: &str,
    policy: &ReconnectPolicy,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    first: bool,
) -> Established {
    // The first connect gets an immediate try on top of the retry budget
    let tries = if first { policy.attempts + 1 } else { policy.attempts };
    let mut last_error = String::from("no connection attempt made");

    for attempt in 0..tries {
        if (attempt > 0 || !first) && !idle(outbound, policy.delay).await {
            return Established::Shutdown;
        }
        info!("Connecting to {} (attempt {}/{})", url, attempt + 1, tries);

        let request = match build_request(url, token) {
            Ok(request) => request,
            Err(e) => {
                return Established::Exhausted(MessagingError::ConnectFailed {
                    attempts: attempt + 1,
                    reason: e,
                })
            }
        };

        let connecting = tokio::time::timeout(policy.connect_timeout, connect_async(request));
        tokio::pin!(connecting);
        let attempt_result = loop {
            tokio::select! {
                result = &mut connecting => break result,
                frame = outbound.recv() => match frame {
                    Some(text) => debug!("Dropping frame queued while connecting: {}", text),
                    None => return Established::Shutdown,
                },
            }
        };

        match attempt_result {
            Ok(Ok((stream, _response))) => return Established::Connected(stream),
            Ok(Err(e)) => {
                warn!("Socket connection error: {}", e);
                last_error = e.to_string();
            }
            Err(_) => {
                warn!("Socket connection timed out after {:?}", policy.connect_timeout);
                last_error = format!("timed out after {:?}", policy.connect_timeout);
            }
        }
    }

    Established::Exhausted(MessagingError::ConnectFailed {
        attempts: tries,
        reason: last_error,
    })
}

fn dispatch(text: &str, bus: &EventBus) {
    match frame::decode_server_event(text) {
        Ok(Some(event)) => {
            debug!("Socket receive: {:?}", event);
            bus.publish(event);
        }
        Ok(None) => debug!("Ignoring unhandled socket event: {}", text),
        Err(e) => warn!("Dropping malformed socket frame: {}", e),
    }
}

async fn pump(stream: WsStream, bus: &EventBus, outbound: &mut mpsc::UnboundedReceiver<String>) -> PumpExit {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => dispatch(text.as_str(), bus),
                Some(Ok(WsMessage::Close(frame))) => {
                    return PumpExit::Dropped(format!("closed by server: {:?}", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                None => return PumpExit::Dropped("stream ended".to_string()),
            },
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::text(text)).await {
                        return PumpExit::Dropped(e.to_string());
                    }
                }
                None => {
                    if let Err(e) = sink.send(WsMessage::Close(None)).await {
                        debug!("Close frame not sent: {}", e);
                    }
                    return PumpExit::Shutdown;
                }
            },
        }
    }
}

async fn supervise(
    url: String,
    token: String,
    policy: ReconnectPolicy,
    bus: EventBus,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    ready: oneshot::Sender<Result<(), MessagingError>>,
) {
    let mut ready = Some(ready);
    let mut first = true;

    loop {
        let stream = match establish(&url, &token, &policy, &mut outbound, first).await {
            Established::Connected(stream) => stream,
            Established::Shutdown => return,
            Established::Exhausted(err) => {
                error!("{}", err);
                lock(&shared.outbound).take();
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(err));
                }
                return;
            }
        };
        first = false;

        shared.connected.store(true, Ordering::SeqCst);
        info!("Socket connected to {}", url);
        bus.publish(ServerEvent::Connected);
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }

        match pump(stream, &bus, &mut outbound).await {
            PumpExit::Shutdown => {
                shared.connected.store(false, Ordering::SeqCst);
                info!("Socket closed");
                return;
            }
            PumpExit::Dropped(reason) => {
                shared.connected.store(false, Ordering::SeqCst);
                warn!("Socket disconnected: {}", reason);
                bus.publish(ServerEvent::Disconnected { reason });
            }
        }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn connect(&self, token: &str) -> Result<(), MessagingError> {
        // Only one connection per session
        self.disconnect().await;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        *lock(&self.shared.outbound) = Some(out_tx);

        let handle = tokio::spawn(supervise(
            self.url.clone(),
            token.to_string(),
            self.policy,
            self.bus.clone(),
            self.shared.clone(),
            out_rx,
            ready_tx,
        ));
        *lock(&self.supervisor) = Some(handle);

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(MessagingError::ConnectFailed {
                attempts: 0,
                reason: "connection task stopped".to_string(),
            }),
        }
    }

    async fn disconnect(&self) {
        // Dropping the sender asks the supervisor to close the socket
        let sender = lock(&self.shared.outbound).take();
        let handle = lock(&self.supervisor).take();
        let was_connected = self.shared.connected.swap(false, Ordering::SeqCst);
        drop(sender);

        if let Some(mut handle) = handle {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                debug!("Socket task did not stop in time, aborting");
                handle.abort();
            }
        }
        if was_connected {
            info!("Socket disconnected by client");
            self.bus.publish(ServerEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    fn emit(&self, event: ClientEvent) -> Result<(), MessagingError> {
        let name = event.name();
        if !self.shared.connected.load(Ordering::SeqCst) {
            warn!("Socket not connected. Cannot emit: {}", name);
            return Err(MessagingError::TransportUnavailable(name));
        }

        let text = match frame::encode_client_event(&event) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode '{}' event: {}", name, e);
                return Err(MessagingError::TransportUnavailable(name));
            }
        };

        let outbound = lock(&self.shared.outbound);
        match outbound.as_ref().map(|tx| tx.send(text)) {
            Some(Ok(())) => {
                debug!("Socket emit: {:?}", event);
                Ok(())
            }
            _ => {
                warn!("Socket not connected. Cannot emit: {}", name);
                Err(MessagingError::TransportUnavailable(name))
            }
        }
    }

    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.supervisor).take() {
            handle.abort();
        }
    }
}
