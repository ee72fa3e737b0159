//! HTTP handlers for the admin and serving surface
//!
//! Every `/domain/*` route takes a JSON body and answers with the
//! `{code, msg, data}` envelope: `code` is 0 on success and 1 on any
//! failure, with the reason in `msg`. Failures still use HTTP 200.
//!
//! Admin writes only touch storage. The engine sees them on the group's
//! next watcher cycle, or on the next catch-up pass for new groups.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, RawQuery, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::models::{
    ContentGroup, ContentItem, ContentKind, Domain, DomainGroup, DomainStatus, GroupKind,
};

use super::engine::EngineCounts;
use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

pub const RES_OK: i64 = 0;
pub const RES_ERR: i64 = 1;

/// Response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    pub msg: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: RES_OK,
            msg: String::new(),
            data: Some(data),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            code: RES_ERR,
            msg: msg.into(),
            data: None,
        }
    }
}

type Reply = Json<ApiResponse<serde_json::Value>>;

fn reply<T: Serialize>(result: Result<T, String>) -> Reply {
    match result.and_then(|data| serde_json::to_value(data).map_err(|e| e.to_string())) {
        Ok(data) => Json(ApiResponse::ok(data)),
        Err(msg) => Json(ApiResponse::err(msg)),
    }
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|e| format!("Request decode failed: {e}"))
}

/// Body carrying a single group id
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupIdRequest {
    #[serde(rename = "groupID")]
    pub group_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GetUrlRequest {
    #[serde(rename = "groupID")]
    pub group_id: i64,
    #[serde(rename = "type")]
    pub kind: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GetDataRequest {
    #[serde(rename = "groupID")]
    pub group_id: i64,
    #[serde(rename = "domainGroupID")]
    pub domain_group_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddVideoRequest {
    #[serde(rename = "groupID")]
    pub group_id: i64,
    pub video: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Created {
    id: i64,
}

/// Liveness report
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub show_groups: usize,
    pub jump_groups: usize,
    pub content_groups: usize,
}

// ============================================================================
// Client Address
// ============================================================================

/// Requesting client's address: the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the peer address. Empty when none is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let from = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    from("x-forwarded-for").or_else(|| from("x-real-ip"))
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = forwarded_ip(&parts.headers) {
            return Ok(Self(ip));
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();
        Ok(Self(peer))
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        // Domain groups
        .route("/domain/add_domain_group", post(add_domain_group))
        .route("/domain/add_domain", post(add_domain))
        .route("/domain/get_domain_groups", post(get_domain_groups))
        .route("/domain/get_domain_group_detail", post(get_domain_group_detail))
        .route("/domain/get_domain_list", post(get_domain_list))
        .route("/domain/setting_domain_group", post(setting_domain_group))
        .route("/domain/off_domain", post(off_domain))
        .route("/domain/set_domain_status", post(set_domain_status))
        .route("/domain/get_url", post(get_url))
        .route("/domain/get_all_domains", post(get_all_domains).get(get_all_domains))
        // Content groups
        .route("/domain/add_content_group", post(add_content_group))
        .route("/domain/get_content_group_detail", post(get_content_group_detail))
        .route("/domain/add_video_content", post(add_video_content))
        .route("/domain/get_content_group", post(get_content_group))
        .route("/domain/get_content_list", post(get_content_list))
        .route("/domain/get_data", post(get_data))
        .with_state(state)
}

// ============================================================================
// Service Handlers
// ============================================================================

async fn index() -> &'static str {
    concat!("rotor ", env!("CARGO_PKG_VERSION"))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let EngineCounts {
        show_groups,
        jump_groups,
        content_groups,
    } = state.engine.counts();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        show_groups,
        jump_groups,
        content_groups,
    })
}

async fn metrics_text() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Domain Handlers
// ============================================================================

async fn add_domain_group(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<DomainGroup>(&body).and_then(|group| {
        state
            .repo
            .insert_domain_group(&group)
            .map(|id| Created { id })
            .map_err(|e| format!("add domain group failed: {e}"))
    }))
}

async fn add_domain(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<Domain>(&body).and_then(|domain| {
        if domain.group_id == 0 || domain.domain.trim().is_empty() {
            return Err("domain and groupID are required".to_string());
        }
        state
            .repo
            .insert_domain(&domain)
            .map(|id| Created { id })
            .map_err(|e| format!("add domain failed: {e}"))
    }))
}

async fn get_domain_groups(State(state): State<AppState>) -> Reply {
    reply(
        state
            .repo
            .domain_groups_after(0)
            .map(|(groups, _)| groups)
            .map_err(|e| format!("get domain groups error: {e}")),
    )
}

async fn get_domain_group_detail(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<GroupIdRequest>(&body).and_then(|req| {
        state
            .repo
            .domain_group(req.group_id)
            .map_err(|e| format!("get domain group detail error: {e}"))
    }))
}

async fn get_domain_list(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<GroupIdRequest>(&body).and_then(|req| {
        state
            .repo
            .domain_list(req.group_id)
            .map_err(|e| format!("get domain list failed: {e}"))
    }))
}

async fn setting_domain_group(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<DomainGroup>(&body).and_then(|group| {
        if group.id == 0 {
            return Err("domain group id cannot be 0.".to_string());
        }
        state
            .repo
            .update_domain_group_status(&group)
            .map(|_| ())
            .map_err(|e| format!("setting domain group failed: {e}"))
    }))
}

async fn off_domain(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<Domain>(&body).and_then(|domain| {
        state
            .repo
            .update_domain_status(domain.id, domain.status)
            .map(|_| ())
            .map_err(|e| format!("off domain failed: {e}"))
    }))
}

/// Bulk status write by literal domain. Parameters come from the query
/// string or a form body.
async fn set_domain_status(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Reply {
    let mut domain = None;
    let mut status = None;
    let params = url::form_urlencoded::parse(query.as_deref().unwrap_or("").as_bytes())
        .chain(url::form_urlencoded::parse(&body));
    for (key, value) in params {
        match key.as_ref() {
            "domain" if domain.is_none() => domain = Some(value.into_owned()),
            "status" if status.is_none() => status = Some(value.into_owned()),
            _ => {}
        }
    }

    let result = match (domain, status) {
        (Some(domain), Some(status)) => status
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DomainStatus::from_code)
            .ok_or_else(|| format!("invalid status: {status}"))
            .and_then(|status| {
                state
                    .repo
                    .update_domains_status(&domain, status)
                    .map(|rows| {
                        tracing::info!(domain = %domain, status = ?status, rows, "domain status set");
                    })
                    .map_err(|e| format!("set domain failed: {e}"))
            }),
        _ => Err("domain and status are required".to_string()),
    };
    reply(result)
}

async fn get_url(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<GetUrlRequest>(&body).and_then(|req| {
        let kind = GroupKind::from_code(req.kind)
            .ok_or_else(|| format!("invalid domain group type: {}", req.kind))?;
        state
            .engine
            .select_domain(req.group_id, kind)
            .map_err(|e| format!("get url failed: {e}"))
    }))
}

async fn get_all_domains(State(state): State<AppState>) -> Reply {
    reply(
        state
            .repo
            .live_domains()
            .map_err(|e| format!("get all domain error: {e}")),
    )
}

// ============================================================================
// Content Handlers
// ============================================================================

async fn add_content_group(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<ContentGroup>(&body).and_then(|group| {
        if group.name.trim().is_empty() {
            return Err("content group name is required".to_string());
        }
        state
            .repo
            .insert_content_group(&group)
            .map(|id| Created { id })
            .map_err(|e| format!("add content group failed: {e}"))
    }))
}

async fn get_content_group_detail(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<GroupIdRequest>(&body).and_then(|req| {
        state
            .repo
            .content_group(req.group_id)
            .map_err(|e| format!("get content group detail error: {e}"))
    }))
}

async fn add_video_content(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<AddVideoRequest>(&body).and_then(|req| {
        let item = ContentItem {
            group_id: req.group_id,
            value: req.video.to_string(),
            kind: ContentKind::Video,
            ..Default::default()
        };
        state
            .repo
            .insert_content(&item)
            .map(|id| Created { id })
            .map_err(|e| format!("add content failed: {e}"))
    }))
}

async fn get_content_group(State(state): State<AppState>) -> Reply {
    reply(
        state
            .repo
            .content_groups_after(0)
            .map(|(groups, _)| groups)
            .map_err(|e| format!("get content groups error: {e}")),
    )
}

async fn get_content_list(State(state): State<AppState>, body: Bytes) -> Reply {
    reply(decode::<GroupIdRequest>(&body).and_then(|req| {
        state
            .repo
            .content_list(req.group_id)
            .map_err(|e| format!("get content list failed: {e}"))
    }))
}

async fn get_data(State(state): State<AppState>, ClientIp(ip): ClientIp, body: Bytes) -> Reply {
    reply(decode::<GetDataRequest>(&body).and_then(|req| {
        state
            .engine
            .select_content(req.group_id, req.domain_group_id, &ip)
            .map_err(|e| format!("get content failed: {e}"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(ApiResponse::ok(5)).unwrap();
        assert_eq!(ok, serde_json::json!({"code": 0, "msg": "", "data": 5}));

        let err = serde_json::to_value(ApiResponse::<()>::err("no useful domain!")).unwrap();
        assert_eq!(err["code"], 1);
        assert_eq!(err["msg"], "no useful domain!");
        assert!(err["data"].is_null());
    }

    #[test]
    fn test_forwarded_ip_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 1.2.3.4 , 10.0.0.1"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_decode_error_message() {
        let err = decode::<GroupIdRequest>(&Bytes::from_static(b"{")).unwrap_err();
        assert!(err.starts_with("Request decode failed"));
    }
}
