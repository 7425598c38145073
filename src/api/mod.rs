use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::query::{QueryParams, TransactionPage, run_query};
use crate::store::TransactionStore;

/// Shared handler state. Each request opens its own store connection inside
/// `spawn_blocking`; rusqlite is synchronous and WAL mode keeps concurrent
/// readers cheap, so there is no pooled connection to share.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub db_path: PathBuf,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/transactions", get(get_transactions))
        .route("/health", get(health))
        .with_state(state)
}

/// `GET /transactions?start_date&end_date&cursor&limit`
///
/// Malformed dates and out-of-range limits are rejected with 400 before the
/// store is touched; store failures surface as 500.
async fn get_transactions(
    State(state): State<ApiState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<TransactionPage>, (StatusCode, String)> {
    let result = tokio::task::spawn_blocking(move || {
        let store = TransactionStore::open(&state.db_path)?;
        run_query(&store, &params)
    })
    .await
    .map_err(|err| {
        error!("query task panicked: {err}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error".to_string(),
        )
    })?;

    match result {
        Ok(page) => Ok(Json(page)),
        Err(err) if err.is_client_error() => Err((StatusCode::BAD_REQUEST, err.to_string())),
        Err(err) => {
            error!("transaction query failed: {err}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Binds the listener and serves until the process is stopped. Builds its
/// own runtime so the rest of the binary stays synchronous.
pub fn serve(addr: SocketAddr, state: ApiState) -> std::io::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("serving transaction query API on {addr}");
        axum::serve(listener, router(state)).await
    })
}
