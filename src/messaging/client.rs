use log::info;
use std::sync::Arc;
use std::time::Duration;

use super::session::{Session, SessionConfig};
use crate::api::{ApiError, HttpMessageApi, MessageApi, MockMessageApi};
use crate::models::UserContext;
use crate::transport::{LoopbackTransport, ReconnectPolicy, SocketTransport, Transport};

/// Builds the collaborators of a session for a signed-in user.
pub trait Backend: Send + Sync {
    fn transport(&self, user: &UserContext) -> Box<dyn Transport>;

    fn api(&self, user: &UserContext) -> Result<Arc<dyn MessageApi>, ApiError>;
}

/// WebSocket transport plus the HTTP persistence API.
#[derive(Debug, Clone)]
pub struct LiveBackend {
    pub api_url: String,
    pub socket_url: String,
    pub request_timeout: Duration,
    pub policy: ReconnectPolicy,
}

impl Backend for LiveBackend {
    fn transport(&self, _user: &UserContext) -> Box<dyn Transport> {
        Box::new(SocketTransport::new(self.socket_url.clone(), self.policy))
    }

    fn api(&self, user: &UserContext) -> Result<Arc<dyn MessageApi>, ApiError> {
        let api = HttpMessageApi::new(&self.api_url, user, self.request_timeout)?;
        Ok(Arc::new(api))
    }
}

/// Offline backend: seeded in-memory API and a loopback transport.
#[derive(Clone, Default)]
pub struct MockBackend {
    delay: Duration,
    transport: Option<LoopbackTransport>,
    api: Option<Arc<MockMessageApi>>,
}

impl MockBackend {
    pub fn new(delay: Duration) -> Self {
        MockBackend {
            delay,
            transport: None,
            api: None,
        }
    }

    /// Share `transport` with every session instead of creating a fresh one.
    pub fn with_transport(mut self, transport: LoopbackTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `api` instead of a freshly seeded mock per user.
    pub fn with_api(mut self, api: Arc<MockMessageApi>) -> Self {
        self.api = Some(api);
        self
    }
}

impl Backend for MockBackend {
    fn transport(&self, _user: &UserContext) -> Box<dyn Transport> {
        Box::new(self.transport.clone().unwrap_or_default())
    }

    fn api(&self, user: &UserContext) -> Result<Arc<dyn MessageApi>, ApiError> {
        let api: Arc<dyn MessageApi> = match &self.api {
            Some(api) => Arc::clone(api) as Arc<dyn MessageApi>,
            None => Arc::new(MockMessageApi::seeded(user.id.clone()).with_delay(self.delay)),
        };
        Ok(api)
    }
}

/// Keeps the messaging session in step with the signed-in user.
pub struct MessagingClient {
    backend: Box<dyn Backend>,
    config: SessionConfig,
    session: Option<Session>,
}

impl MessagingClient {
    pub fn new(backend: Box<dyn Backend>, config: SessionConfig) -> Self {
        MessagingClient {
            backend,
            config,
            session: None,
        }
    }

    /// Follow a change of the user context.
    ///
    /// Signing in starts a session, signing out shuts it down and a different
    /// user (or a new token) restarts it. The same context again is a no-op.
    pub async fn set_user(&mut self, user: Option<UserContext>) -> Result<(), ApiError> {
        let current = self.session.as_ref().map(|s| s.user());
        if current == user.as_ref() {
            return Ok(());
        }

        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }

        if let Some(user) = user {
            info!("User context changed, starting session for {}", user.id);
            let api = self.backend.api(&user)?;
            let transport = self.backend.transport(&user);
            self.session = Some(Session::start(user, transport, api, self.config.clone()).await);
        }
        Ok(())
    }

    pub fn user(&self) -> Option<&UserContext> {
        self.session.as_ref().map(|s| s.user())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
    }
}
