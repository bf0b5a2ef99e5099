use std::sync::Arc;
use axum::extract::{Path, RawQuery, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use serde::Serialize;
use tracing::{info, warn};
use crate::construct::Catalog;
use crate::error::{CatalogError, Result};
use crate::frame::StudyTable;
use crate::interface::{Exploration, Explorer, FilterPage, VariableListing};
use crate::selection::Selection;

/// What every request handler reads from. The catalog is never written while serving.
pub struct AppState {
    pub catalog: Catalog,
    pub qualifier_code: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
}

pub enum ApiError {
    Catalog(CatalogError),
    Join(String),
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        ApiError::Catalog(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Catalog(e) => {
                let status = match e {
                    CatalogError::Input(_) => StatusCode::BAD_REQUEST,
                    CatalogError::Unknown { .. } => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::Join(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        warn!(%msg, code = %status.as_u16(), "request rejected");
        (status, Json(ErrorResponse { status: "error", error: msg })).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);
    Router::new()
        .route("/v1/studies", get(studies))
        .route("/v1/studies/list", get(study_list))
        .route("/v1/explore", get(explore))
        .route("/v1/domains/:code/variables", get(variables))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listen: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| CatalogError::Config(format!("Could not listen on {listen}: {e}")))?;
    info!(%listen, studies = state.catalog.study_count(), "serving catalog");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| CatalogError::Invariant(format!("Server stopped: {e}")))
}

async fn studies(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> std::result::Result<Json<FilterPage>, ApiError> {
    let page = run(state, query, |explorer, params| explorer.filter_page(params)).await?;
    Ok(Json(page))
}

async fn study_list(State(state): State<Arc<AppState>>) -> std::result::Result<Json<Option<StudyTable>>, ApiError> {
    let table = run(state, None, |explorer, _| Ok(explorer.study_list())).await?;
    Ok(Json(table))
}

async fn explore(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> std::result::Result<Json<Exploration>, ApiError> {
    let exploration = run(state, query, |explorer, params| explorer.explore(params)).await?;
    Ok(Json(exploration))
}

async fn variables(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    RawQuery(query): RawQuery,
) -> std::result::Result<Json<VariableListing>, ApiError> {
    let listing = run(state, query, move |explorer, params| explorer.variables(&code, params)).await?;
    Ok(Json(listing))
}

// The core is synchronous, so it runs on a blocking thread.
async fn run<T, F>(state: Arc<AppState>, query: Option<String>, work: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Explorer, &Selection) -> Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let params = Selection::from_query(query.as_deref().unwrap_or_default())?;
        let explorer = Explorer::new(&state.catalog, state.qualifier_code.as_str());
        work(&explorer, &params)
    })
    .await
    .map_err(|e| {
        warn!(error = %e, "Join error");
        ApiError::Join(e.to_string())
    })?;
    Ok(result?)
}
