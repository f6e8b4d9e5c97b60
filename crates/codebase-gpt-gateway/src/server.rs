use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codebase_gpt_core::Controller;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;
use crate::sessions::SessionStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub controller: Arc<Controller>,
    pub sessions: SessionStore,
    pub started_at: Instant,
}

impl AppState {
    pub(crate) fn new(controller: Arc<Controller>, max_sessions: usize, session_ttl: Duration) -> Self {
        Self {
            controller,
            sessions: SessionStore::new(max_sessions, session_ttl),
            started_at: Instant::now(),
        }
    }
}

pub struct GatewayServer {
    addr: SocketAddr,
    rate_limit: u32,
    max_body_size: usize,
    max_sessions: usize,
    session_ttl: Duration,
    controller: Arc<Controller>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        controller: Arc<Controller>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0, the session API has no authentication");
        }

        Self {
            addr,
            rate_limit: 60,
            max_body_size: 65_536,
            max_sessions: 1000,
            session_ttl: Duration::from_secs(3600),
            controller,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn with_session_limits(mut self, max_sessions: usize, ttl_secs: u64) -> Self {
        self.max_sessions = max_sessions;
        self.session_ttl = Duration::from_secs(ttl_secs);
        self
    }

    /// Start the HTTP gateway server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState::new(self.controller, self.max_sessions, self.session_ttl);
        let router = build_router(state, self.rate_limit, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on http://{}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("gateway shutting down");
        })
        .await
        .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
