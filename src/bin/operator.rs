use std::future::IntoFuture as _;

use envconfig::Envconfig;
use starburst_addon_operator::{
    config::AddonConfig,
    operator::{AddonController, State},
    telemetry,
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init().await?;
    let config = AddonConfig::init_from_env()?;

    // The web server only reads what the controller records
    let state = State::default();
    let controller = AddonController::new(state.clone());

    let listener = TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!("serving diagnostics on port {}", config.http_port);
    let server = axum::serve(listener, web::router(state));

    // Neither half is expected to return
    tokio::select! {
        c = controller.run(config) => {
            c?;
            anyhow::bail!("controller exited early")
        },
        s = server.into_future() => {
            s?;
            anyhow::bail!("server exited early")
        }
    }
}

/// Diagnostics and metrics endpoints
mod web {
    use axum::{
        extract::State,
        http::{header, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use prometheus::{Encoder, TextEncoder};
    use serde_json::{json, Value};

    use starburst_addon_operator::operator::{Diagnostics, State as OperatorState};

    pub fn router(state: OperatorState) -> Router {
        Router::new()
            .route("/", get(diagnostics))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .with_state(state)
    }

    /// Reconcile metrics in the prometheus text format
    async fn metrics(State(state): State<OperatorState>) -> Result<impl IntoResponse, (StatusCode, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&state.metrics(), &mut buffer)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer))
    }

    async fn health() -> Json<Value> {
        Json(json!({ "status": "healthy" }))
    }

    /// When the controller last reconciled an addon
    async fn diagnostics(State(state): State<OperatorState>) -> Json<Diagnostics> {
        Json(state.diagnostics().await)
    }
}
