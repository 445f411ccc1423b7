use axum::{
    extract::{ConnectInfo, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use shabad_engine::{
    history_markup, AppState, CacheStats, Config, DisplayJson, HistoryEntry, HistoryPost, LineId,
    LineSource, ScriptureId, SearchResults,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

/// Posted history carries the whole page JSON of a unit.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Pseudo id for whatever the display is showing.
const CURRENT_ID: &str = "current";

// === Request/Response types ===

#[derive(Deserialize)]
struct ShabadQuery {
    id: Option<String>,
}

#[derive(Deserialize)]
struct ResultsQuery {
    #[serde(default)]
    search: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    lines: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShabadResponse {
    id: String,
    body: String,
    #[serde(rename = "shabadJSON")]
    shabad_json: String,
    toggle_lines: String,
    #[serde(rename = "currentPK")]
    current_pk: String,
    total_pages: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (status, Json(ErrorResponse { error: error.to_string() }))
}

/// Maintenance routes answer only on the presenter's own machine.
fn require_local(addr: &SocketAddr) -> Result<(), ApiError> {
    if addr.ip().is_loopback() {
        Ok(())
    } else {
        tracing::warn!(remote = %addr, "rejected non-local request");
        Err(api_error(StatusCode::FORBIDDEN, "local requests only"))
    }
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let lines = state.source.line_count().unwrap_or(0);
    Json(HealthResponse {
        status: "ok".to_string(),
        lines,
    })
}

async fn shabad(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShabadQuery>,
) -> Result<Json<ShabadResponse>, ApiError> {
    let display = state.display();
    let requested = params.id.unwrap_or_else(|| CURRENT_ID.to_string());
    let raw_id = if requested == CURRENT_ID {
        display.shabad_id.clone()
    } else {
        requested
    };

    let id: ScriptureId = raw_id
        .parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let render = state.render(&id);
    if render.is_empty() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("nothing to show for {}", id)));
    }

    // Reopening the unit on screen keeps the display's line and toggles
    let (current_pk, toggle_lines) = if display.shabad_id == render.scripture_id {
        (display.primary_key, display.toggle_lines)
    } else {
        (render.default_primary_key.clone(), render.toggle_lines.clone())
    };

    Ok(Json(ShabadResponse {
        id: render.scripture_id.clone(),
        body: render.markup.clone(),
        shabad_json: render.json.clone(),
        toggle_lines,
        current_pk,
        total_pages: render.total_pages(),
    }))
}

async fn search_results(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResultsQuery>,
) -> Html<String> {
    Html(state.search(&params.search).markup())
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Json<SearchResults> {
    Json(state.search(&params.q))
}

async fn get_json(State(state): State<Arc<AppState>>) -> Json<DisplayJson> {
    Json(state.current_json())
}

async fn get_line_id(State(state): State<Arc<AppState>>) -> Json<LineId> {
    Json(state.current_line_id())
}

async fn post_history(State(state): State<Arc<AppState>>, Form(post): Form<HistoryPost>) -> StatusCode {
    state.post_history(&post);
    StatusCode::OK
}

async fn history(State(state): State<Arc<AppState>>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    state
        .recent_history()
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
}

async fn history_html(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    state
        .recent_history()
        .map(|entries| Html(history_markup(&entries)))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
}

async fn clear_history(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<StatusCode, ApiError> {
    require_local(&addr)?;
    state.clear_display();
    state
        .new_session()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(StatusCode::OK)
}

async fn update_first_letters(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<String, ApiError> {
    require_local(&addr)?;
    state
        .write_index_report()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache_stats())
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    state.render_cache.clear();
    Json(state.cache_stats())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(data_dir = ?config.data_dir, "using data directory");
    let bind = config.bind.clone();

    let state = Arc::new(AppState::new(config)?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/shabad", get(shabad))
        .route("/searchresults", get(search_results))
        .route("/search", get(search))
        .route("/getJSON", get(get_json))
        .route("/getLineID", get(get_line_id))
        .route("/postHistory", post(post_history))
        .route("/history", get(history))
        .route("/getHistoryHTML", get(history_html))
        .route("/clearHistory", post(clear_history))
        .route("/updateFirstLetters", post(update_first_letters))
        .route("/cache", get(cache_stats).delete(clear_cache))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Listening on http://{}", bind);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
