use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, Method, StatusCode},
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tandem_core::{MatchEngine, MatchSummary, MessagePage, ProfileView};
use tandem_shared::{constants::USER_ID_HEADER, MatchId, SwipeDirection, UserId};
use tandem_store::{Match, Message, Profile, Swipe};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine>,
    pub rate_limiter: RateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/profiles/me", get(get_profile).put(put_profile))
        .route("/swipes", post(record_swipe))
        .route("/swipes/targets", get(swiped_targets))
        .route("/matches", get(list_matches))
        .route("/matches/:id", get(get_match))
        .route("/matches/:id/activate", post(activate_match))
        .route("/matches/:id/end", post(end_match))
        .route("/matches/:id/messages", get(list_messages).post(send_message))
        .route("/matches/:id/read", post(mark_read))
        .route("/matches/:id/events", get(conversation_events))
        .route("/events", get(match_events))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The authenticated caller, read from the `x-user-id` header set by the
/// identity layer in front of this service.
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or(ServerError::Unauthenticated)
    }
}

/// Run a core operation on the blocking pool. Every engine call may wait on
/// the SQLite lock.
async fn run<T, F>(state: &AppState, op: F) -> Result<T, ServerError>
where
    F: FnOnce(&MatchEngine) -> tandem_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| ServerError::Internal(format!("Engine task failed: {e}")))?
        .map_err(ServerError::from)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize, Default)]
struct ProfileRequest {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct SwipeRequest {
    target: UserId,
    direction: SwipeDirection,
}

#[derive(Serialize)]
struct MatchRef {
    id: MatchId,
    created: bool,
}

#[derive(Serialize)]
struct SwipeResponse {
    swipe: Swipe,
    #[serde(rename = "match")]
    matched: Option<MatchRef>,
}

#[derive(Serialize)]
struct TargetsResponse {
    targets: Vec<UserId>,
}

#[derive(Deserialize)]
struct MessagesQuery {
    after: Option<i64>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct SendRequest {
    content: String,
}

#[derive(Serialize)]
struct MarkReadResponse {
    marked: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn put_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<Json<Profile>, ServerError> {
    // A bare PUT without a JSON body signs up with no display name.
    let req = match body {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => ProfileRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let profile = run(&state, move |engine| {
        engine.ensure_profile(user, req.display_name.as_deref())
    })
    .await?;
    Ok(Json(profile))
}

async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ProfileView>, ServerError> {
    Ok(Json(run(&state, move |engine| engine.profile(user)).await?))
}

async fn record_swipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<SwipeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SwipeResponse>), ServerError> {
    let Json(req) = body?;
    let outcome = run(&state, move |engine| {
        engine.record_swipe(user, req.target, req.direction)
    })
    .await?;

    let matched = outcome.resolution.match_id().map(|id| MatchRef {
        id,
        created: outcome.resolution.is_new(),
    });
    Ok((
        StatusCode::CREATED,
        Json(SwipeResponse {
            swipe: outcome.swipe,
            matched,
        }),
    ))
}

async fn swiped_targets(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<TargetsResponse>, ServerError> {
    let mut targets: Vec<UserId> = run(&state, move |engine| engine.swiped_targets(user))
        .await?
        .into_iter()
        .collect();
    targets.sort();
    Ok(Json(TargetsResponse { targets }))
}

async fn list_matches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<MatchSummary>>, ServerError> {
    Ok(Json(run(&state, move |engine| engine.list_matches(user)).await?))
}

async fn get_match(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
) -> Result<Json<Match>, ServerError> {
    let Path(id) = path?;
    Ok(Json(run(&state, move |engine| engine.get_match(id, user)).await?))
}

async fn activate_match(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
) -> Result<Json<Match>, ServerError> {
    let Path(id) = path?;
    Ok(Json(run(&state, move |engine| engine.activate(id, user)).await?))
}

async fn end_match(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
) -> Result<Json<Match>, ServerError> {
    let Path(id) = path?;
    Ok(Json(run(&state, move |engine| engine.end(id, user)).await?))
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<MessagePage>, ServerError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let page = run(&state, move |engine| {
        engine.list_messages(id, user, query.after, query.limit)
    })
    .await?;
    Ok(Json(page))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let message = run(&state, move |engine| engine.send(id, user, &req.content)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
) -> Result<Json<MarkReadResponse>, ServerError> {
    let Path(id) = path?;
    let marked = run(&state, move |engine| engine.mark_read(id, user)).await?;
    Ok(Json(MarkReadResponse { marked }))
}

/// SSE stream of new messages and read receipts for one match.
async fn conversation_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    path: Result<Path<MatchId>, PathRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ServerError> {
    let Path(id) = path?;
    let subscription = run(&state, move |engine| engine.subscribe_conversation(id, user)).await?;
    info!(match_id = %id, user = %user.short(), "conversation stream opened");

    let events = subscription
        .into_stream()
        .map(|event| Event::default().event(event.name()).json_data(&event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// SSE stream of status changes for every match the caller is part of.
async fn match_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!(user = %user.short(), "match event stream opened");
    let events = state
        .engine
        .subscribe_match_events(user)
        .into_stream()
        .map(|event| Event::default().event(event.name()).json_data(&event));
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
