//! Process-variable REST façade server.
//!
//! Serves the variable endpoints of flowgate-core over HTTP, backed by the
//! in-memory engine adapter. Configuration is environment-driven:
//!
//! ```bash
//! FLOWGATE_ADDR=127.0.0.1:3000 \
//! FLOWGATE_DESERIALIZATION_CHECK=true \
//! FLOWGATE_ALLOWED_TYPES='com.acme.*,java.util.HashMap' \
//! cargo run --bin flowgate-rest
//! ```

mod dto;
mod routes;

use anyhow::Context;
use flowgate_core::adapter::DEFAULT_ENGINE;
use flowgate_core::adapter_memory::MemoryEngine;
use flowgate_core::guard::TypeAllowlist;
use flowgate_core::{DeserializationGuard, EngineRegistry, PatternAllowlist, VariablePipeline};
use routes::{create_variable_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // The allowlist is loaded once and read-only thereafter.
    let check_enabled = std::env::var("FLOWGATE_DESERIALIZATION_CHECK")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let allowlist = std::env::var("FLOWGATE_ALLOWED_TYPES")
        .ok()
        .map(|spec| Arc::new(PatternAllowlist::parse(&spec)) as Arc<dyn TypeAllowlist>);
    let guard = Arc::new(DeserializationGuard::new(check_enabled, allowlist));
    tracing::info!(
        deserialization_check = guard.is_active(),
        "deserialization guard configured"
    );

    let registry = Arc::new(
        EngineRegistry::new()
            .with_engine(DEFAULT_ENGINE, Arc::new(MemoryEngine::new(guard.clone()))),
    );
    let pipeline = Arc::new(VariablePipeline::new(guard));

    let app = create_variable_router(AppState::new(registry, pipeline))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("FLOWGATE_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .context("invalid FLOWGATE_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, "flowgate-rest listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
