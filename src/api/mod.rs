//! HTTP and WebSocket API
//!
//! Routes:
//! - `/agent/sessions`, `/agent/chat/{id}`: session history and batch chat
//! - `/ws`: live voice relay
//! - `/health`, `/ready`: probes
//! - everything else: the static browser frontend, when configured

pub mod chat;
pub mod health;
pub mod sessions;
pub mod websocket;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::db::{DbPool, SessionRepo};
use crate::tools::ToolExecutor;
use crate::{Config, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub session_repo: SessionRepo,
    pub config: Arc<Config>,
    pub tools: Arc<ToolExecutor>,
}

/// Error body shared by all handlers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

pub(crate) fn error_response(code: &str, message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        },
    })
}

/// Builder for the API server
pub struct ApiServerBuilder {
    db: DbPool,
    config: Config,
    port: u16,
    static_dir: Option<PathBuf>,
    tools: Option<Arc<ToolExecutor>>,
}

impl ApiServerBuilder {
    /// Create a builder; port and static dir default to the config values
    #[must_use]
    pub fn new(db: DbPool, config: Config) -> Self {
        Self {
            db,
            port: config.server.port,
            static_dir: config.server.static_dir.clone(),
            config,
            tools: None,
        }
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Use a custom tool set instead of the configured one
    #[must_use]
    pub fn tools(mut self, tools: Arc<ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolExecutor::from_config(&self.config)));

        let state = Arc::new(ApiState {
            session_repo: SessionRepo::new(self.db.clone()),
            db: self.db,
            config: Arc::new(self.config),
            tools,
        });

        ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .nest("/agent", sessions::router(self.state.clone()))
            .merge(websocket::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // Browser frontend may be served from another origin during development
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");
        self.serve(listener).await
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
