//! HTTP surface for the consent subsystem.
//!
//! Identity arrives pre-authenticated from the upstream gateway as
//! `X-Company-Id` / `X-Candidate-Id` headers; this service trusts them and
//! performs no authentication of its own. Candidate token endpoints need no
//! identity at all: possession of the token is the capability.
//!
//! External error bodies are deliberately generic. Candidates get
//! `invalid_or_expired_link` for every token-resolution failure and
//! companies get `access_not_granted` for every authorization failure, so
//! neither valid tokens nor candidate ids can be enumerated. Detail goes to
//! the logs only.

use crate::errors::ConsentError;
use crate::gate::{AccessDecision, AccessGate};
use crate::issuer::TokenIssuer;
use crate::notify::Notifier;
use crate::profiles::ProfileDirectory;
use crate::projector;
use crate::settings::Settings;
use crate::state;
use crate::store::ConsentStore;
use crate::entities::consent_request;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: ConsentStore,
    pub issuer: TokenIssuer,
    pub gate: AccessGate,
    pub directory: Arc<dyn ProfileDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/consent/requests", post(create_request))
        .route("/consent/requests/{token}", get(get_request))
        .route("/consent/requests/{token}/approve", post(approve_request))
        .route("/consent/requests/{token}/deny", post(deny_request))
        .route("/consent/revoke", post(revoke_grant))
        .route("/consent/mine", get(list_mine))
        .route("/consent/issued", get(list_issued))
        .route("/candidates/{candidate_id}/profile", get(read_profile))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    // NOTE: Rate limiting belongs at the reverse proxy level; configure the
    // proxy with per-IP limits on the issue and token endpoints.
    let app = router(state);

    tracing::info!(%addr, "Consent API listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

fn header_identity(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Candidate-facing token failure: one shape for "wrong", "expired" and
/// "never existed".
fn invalid_link() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "invalid_or_expired_link"})),
    )
        .into_response()
}

/// Company-facing authorization failure: one shape for every deny reason.
fn access_not_granted() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"error": "access_not_granted"})),
    )
        .into_response()
}

fn missing_identity(header: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "error_description": format!("{header} header required"),
        })),
    )
        .into_response()
}

fn server_error(err: &ConsentError) -> Response {
    tracing::error!(error = %err, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "server_error"})),
    )
        .into_response()
}

/// The request as shown to its two parties. The bearer token itself is
/// only ever returned inside the shareable link at issue time.
#[derive(Debug, Serialize)]
struct RequestView {
    id: String,
    candidate_id: String,
    company_id: String,
    requested_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    granted_fields: Option<Vec<String>>,
    created_at: i64,
    expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_at: Option<i64>,
}

impl From<&consent_request::Model> for RequestView {
    fn from(m: &consent_request::Model) -> Self {
        RequestView {
            id: m.id.clone(),
            candidate_id: m.candidate_id.clone(),
            company_id: m.company_id.clone(),
            requested_fields: m
                .requested_fields
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            purpose: m.purpose.clone(),
            state: m.state.clone(),
            granted_fields: m
                .granted_fields
                .as_deref()
                .map(|f| f.split_whitespace().map(str::to_string).collect()),
            created_at: m.created_at,
            expires_at: m.expires_at,
            resolved_at: m.resolved_at,
        }
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Issue response: the request view plus the shareable link carrying the
/// bearer token. This is the only response that ever exposes the token.
#[derive(Debug, Serialize)]
struct IssueResponse {
    #[serde(flatten)]
    request: RequestView,
    consent_url: String,
}

#[derive(Debug, Deserialize)]
struct IssueRequest {
    candidate_id: String,
    fields: Vec<String>,
    purpose: Option<String>,
    ttl_secs: Option<i64>,
}

async fn create_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IssueRequest>,
) -> impl IntoResponse {
    let Some(company_id) = header_identity(&headers, "x-company-id") else {
        return missing_identity("X-Company-Id");
    };

    let ttl = state.settings.effective_ttl(req.ttl_secs);
    match state
        .issuer
        .issue(&req.candidate_id, &company_id, &req.fields, req.purpose, ttl)
        .await
    {
        Ok(created) => {
            // Best-effort; never part of the consent transaction
            state.notifier.consent_requested(&created).await;

            let body = IssueResponse {
                consent_url: format!(
                    "{}/consent?token={}",
                    state.settings.public_base(),
                    created.token
                ),
                request: RequestView::from(&created),
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(ConsentError::InvalidFieldSet(msg)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_field_set",
                "error_description": msg,
            })),
        )
            .into_response(),
        Err(ConsentError::CandidateNotFound) => {
            // Same body as any other not-found so candidate ids cannot be
            // probed through this endpoint
            tracing::info!(candidate_id = %req.candidate_id, company_id, "Issue for unknown candidate");
            (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))).into_response()
        }
        Err(e) => server_error(&e),
    }
}

async fn get_request(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let now = Utc::now().timestamp();
    match state.store.get_by_token(&token, now).await {
        Ok(Some(req)) if req.state == state::ConsentState::Expired.as_str() => invalid_link(),
        Ok(Some(req)) => (StatusCode::OK, Json(RequestView::from(&req))).into_response(),
        Ok(None) => invalid_link(),
        Err(e) => server_error(&e),
    }
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    fields: Vec<String>,
}

async fn approve_request(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> impl IntoResponse {
    let now = Utc::now().timestamp();
    match state::approve(&state.store, &token, &req.fields, now).await {
        Ok(updated) => {
            state.notifier.consent_resolved(&updated).await;
            (StatusCode::OK, Json(RequestView::from(&updated))).into_response()
        }
        Err(e) => candidate_action_failure(e),
    }
}

async fn deny_request(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let now = Utc::now().timestamp();
    match state::deny(&state.store, &token, now).await {
        Ok(updated) => {
            state.notifier.consent_resolved(&updated).await;
            (StatusCode::OK, Json(RequestView::from(&updated))).into_response()
        }
        Err(e) => candidate_action_failure(e),
    }
}

fn candidate_action_failure(err: ConsentError) -> Response {
    match err {
        ConsentError::EmptyGrant => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "empty_grant",
                "error_description": "select at least one field, or deny the request",
            })),
        )
            .into_response(),
        ConsentError::UnknownField(_) | ConsentError::InvalidFieldSet(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_field_set"})),
        )
            .into_response(),
        ConsentError::AlreadyResolved { current } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "already_resolved",
                "state": current.as_str(),
            })),
        )
            .into_response(),
        // Expired, revoked, unknown: all the same shape to the candidate
        ConsentError::NotFound | ConsentError::InvalidTransition { .. } => invalid_link(),
        e => server_error(&e),
    }
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    company_id: String,
}

async fn revoke_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RevokeRequest>,
) -> impl IntoResponse {
    let Some(candidate_id) = header_identity(&headers, "x-candidate-id") else {
        return missing_identity("X-Candidate-Id");
    };

    match state::revoke(&state.store, &candidate_id, &req.company_id).await {
        Ok(updated) => (StatusCode::OK, Json(RequestView::from(&updated))).into_response(),
        Err(ConsentError::NotFound) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))).into_response()
        }
        Err(ConsentError::InvalidTransition { current }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "invalid_state",
                "state": current.as_str(),
            })),
        )
            .into_response(),
        Err(e) => server_error(&e),
    }
}

async fn list_mine(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(candidate_id) = header_identity(&headers, "x-candidate-id") else {
        return missing_identity("X-Candidate-Id");
    };

    match state.store.list_for_candidate(&candidate_id).await {
        Ok(rows) => {
            let views: Vec<RequestView> = rows.iter().map(RequestView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => server_error(&e),
    }
}

async fn list_issued(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(company_id) = header_identity(&headers, "x-company-id") else {
        return missing_identity("X-Company-Id");
    };

    match state.store.list_for_company(&company_id).await {
        Ok(rows) => {
            let views: Vec<RequestView> = rows.iter().map(RequestView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => server_error(&e),
    }
}

async fn read_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(candidate_id): Path<String>,
) -> impl IntoResponse {
    let Some(company_id) = header_identity(&headers, "x-company-id") else {
        return missing_identity("X-Company-Id");
    };

    let decision = match state.gate.authorize(&company_id, &candidate_id).await {
        Ok(d) => d,
        Err(e) => return server_error(&e),
    };

    let granted_fields = match decision {
        AccessDecision::Allowed { granted_fields } => granted_fields,
        AccessDecision::Denied { reason } => {
            tracing::info!(company_id, candidate_id, ?reason, "Profile read denied");
            return access_not_granted();
        }
    };

    match state.directory.get_snapshot(&candidate_id).await {
        Ok(Some(snapshot)) => {
            let view = projector::project(&snapshot, &granted_fields);
            (StatusCode::OK, Json(view)).into_response()
        }
        // Profile vanished between gate and read; same generic shape
        Ok(None) => access_not_granted(),
        Err(e) => server_error(&e),
    }
}
