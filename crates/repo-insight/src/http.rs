/// HTTP API.
///
/// - `POST /api/v1/repositories/search` (rate limited per client IP)
/// - `GET  /api/v1/repositories/languages/search?query=<s>`
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::context::AppContext;
use crate::error::{generic_server_error, ErrorBody};
use crate::model::{LanguageSearchParams, LanguageSearchResponse, SearchRequest, SearchResponse};

pub fn router(context: Arc<AppContext>, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::list(origins));

    Router::new()
        .route(
            "/api/v1/repositories/search",
            post(search_repositories).layer(middleware::from_fn_with_state(
                Arc::clone(&context),
                rate_limit,
            )),
        )
        .route("/api/v1/repositories/languages/search", get(search_languages))
        .with_state(context)
        .layer(CatchPanicLayer::custom(|_| generic_server_error()))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

fn unprocessable(detail: String) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody::new(detail))).into_response()
}

async fn search_repositories(
    State(context): State<Arc<AppContext>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, Response> {
    let Json(request) = payload.map_err(|e| unprocessable(e.body_text()))?;
    request.validate().map_err(IntoResponse::into_response)?;

    info!(keyword = %request.keyword, languages = ?request.languages, "repository search");
    let results = context
        .search
        .search(&request.keyword, &request.languages, context.search_options)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(SearchResponse { results }))
}

async fn search_languages(
    State(context): State<Arc<AppContext>>,
    params: Result<Query<LanguageSearchParams>, QueryRejection>,
) -> Result<Json<LanguageSearchResponse>, Response> {
    let Query(params) = params.map_err(|e| unprocessable(e.body_text()))?;
    let results = context
        .search
        .catalog()
        .find_by_query(&params.query)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(LanguageSearchResponse { results }))
}

async fn rate_limit(State(context): State<Arc<AppContext>>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if let Err(detail) = context.rate_limiter.check(&client).await {
        return (StatusCode::TOO_MANY_REQUESTS, Json(ErrorBody::new(detail))).into_response();
    }
    next.run(request).await
}
