//! Dashboard HTTP server running on its own runtime.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::runtime::Runtime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::broker::EventBroker;
use crate::routes;
use crate::sse;
use crate::state::AppState;

/// Where and how to serve the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub bind: String,
    /// 0 picks an ephemeral port.
    pub port: u16,
    /// Static front-end files, served as the router fallback when present.
    pub ui_dir: Option<PathBuf>,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 0,
            ui_dir: None,
        }
    }
}

/// Running dashboard. The server stops when this value is dropped.
pub struct Dashboard {
    addr: SocketAddr,
    // Owns the server task; dropping it shuts the server down.
    _runtime: Runtime,
}

impl Dashboard {
    /// Bind the listener and start serving in the background.
    ///
    /// Must be called from outside any tokio runtime.
    pub fn start(broker: EventBroker, options: DashboardOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dashboard")
            .enable_all()
            .build()
            .context("build dashboard runtime")?;

        let addr: SocketAddr = format!("{}:{}", options.bind, options.port)
            .parse()
            .with_context(|| {
                format!("invalid dashboard address {}:{}", options.bind, options.port)
            })?;

        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(addr))
            .with_context(|| format!("bind dashboard on {addr}"))?;
        let addr = listener.local_addr().context("read dashboard address")?;

        let app = router(AppState::new(broker), options.ui_dir);
        runtime.spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                warn!(err = %err, "dashboard server stopped");
            }
        });

        info!(addr = %addr, "dashboard listening");
        Ok(Self {
            addr,
            _runtime: runtime,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn router(state: AppState, ui_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    match ui_dir {
        Some(dir) if dir.exists() => {
            info!(ui_dir = %dir.display(), "serving static UI files");
            app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
        }
        Some(dir) => info!(ui_dir = %dir.display(), "UI directory not found, API-only mode"),
        None => {}
    }

    app
}
