//! ABOUTME: Path/method dispatch from a raw hyper request onto the DashboardApi trait
//! ABOUTME: Bearer session tokens resolve to an owner id; missing/unknown tokens are 401

use crate::api::{ApiError, DashboardApi};
use crate::auth::AuthRegistry;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub type BoxBody = Full<Bytes>;

fn json_response(status: StatusCode, body: &Value) -> Response<BoxBody> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn not_found() -> Response<BoxBody> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": "not_found" }))
}

fn unauthorized() -> Response<BoxBody> {
    json_response(StatusCode::UNAUTHORIZED, &serde_json::json!({ "error": "unauthorized" }))
}

fn bad_request(message: &str) -> Response<BoxBody> {
    json_response(StatusCode::BAD_REQUEST, &serde_json::json!({ "error": message }))
}

fn api_err_response(err: ApiError) -> Response<BoxBody> {
    match err {
        ApiError::NotFound => not_found(),
        ApiError::BadRequest(message) => bad_request(&message),
        ApiError::Internal(message) => {
            warn!(error = %message, "dashboard api internal error");
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &serde_json::json!({ "error": "internal_error" }))
        }
    }
}

fn bearer_token(req: &Request<Incoming>) -> Option<String> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn query_param(req: &Request<Incoming>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

fn limit_param(req: &Request<Incoming>, default: usize) -> usize {
    query_param(req, "limit").and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Dispatches one request. `auth` resolves the bot-link handshake itself
/// (no session token needed); every other route requires a valid bearer
/// session token, resolved to an owner id before the handler runs.
pub async fn dispatch(api: Arc<dyn DashboardApi>, auth: Arc<AuthRegistry>, req: Request<Incoming>) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // GET /api/auth/request, GET /api/auth/check/{token} — unauthenticated.
    if let [_, "auth", "request"] = segments.as_slice() {
        if method == Method::GET {
            let token = auth.request();
            return json_response(
                StatusCode::OK,
                &serde_json::json!({ "authToken": token, "botLink": format!("tg://resolve?start={token}") }),
            );
        }
    }
    if let [_, "auth", "check", token] = segments.as_slice() {
        if method == Method::GET {
            return match auth.check(token) {
                Some((status, session_token)) => json_response(
                    StatusCode::OK,
                    &serde_json::json!({ "status": status, "session_token": session_token }),
                ),
                None => not_found(),
            };
        }
    }

    let Some(session_token) = bearer_token(&req) else { return unauthorized() };
    let Some(owner_id) = auth.owner_for_session(&session_token) else { return unauthorized() };

    match (method, segments.as_slice()) {
        (Method::GET, [_, "me"]) => api.me(owner_id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &v)),
        (Method::GET, [_, "agents"]) => match api.list_agents(owner_id).await {
            Ok(agents) => json_response(StatusCode::OK, &serde_json::json!(agents)),
            Err(e) => api_err_response(e),
        },
        (Method::POST, [_, "agents", id, "run"]) => match id.parse() {
            Ok(id) => api.run_agent(owner_id, id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &v)),
            Err(_) => bad_request("invalid agent id"),
        },
        (Method::POST, [_, "agents", id, "stop"]) => match id.parse() {
            Ok(id) => api.stop_agent(owner_id, id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &v)),
            Err(_) => bad_request("invalid agent id"),
        },
        (Method::GET, [_, "agents", id, "logs"]) => match id.parse() {
            Ok(id) => {
                let limit = limit_param(&req, 100);
                match api.agent_logs(owner_id, id, limit).await {
                    Ok(lines) => json_response(StatusCode::OK, &serde_json::json!(lines)),
                    Err(e) => api_err_response(e),
                }
            }
            Err(_) => bad_request("invalid agent id"),
        },
        (Method::GET, [_, "executions"]) => {
            let limit = limit_param(&req, 100);
            match api.executions(owner_id, limit).await {
                Ok(rows) => json_response(StatusCode::OK, &serde_json::json!(rows)),
                Err(e) => api_err_response(e),
            }
        }
        (Method::GET, [_, "activity"]) => {
            let limit = limit_param(&req, 50);
            match api.activity(owner_id, limit).await {
                Ok(lines) => json_response(StatusCode::OK, &serde_json::json!(lines)),
                Err(e) => api_err_response(e),
            }
        }
        (Method::GET, [_, "stats", "me"]) => {
            api.stats(owner_id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &serde_json::json!(v)))
        }
        (Method::GET, [_, "settings"]) => {
            api.get_settings(owner_id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &v))
        }
        (Method::POST, [_, "settings"]) => match read_json(req).await {
            Ok(body) => api.put_settings(owner_id, body).await.map_or_else(api_err_response, |()| json_response(StatusCode::OK, &serde_json::json!({}))),
            Err(e) => bad_request(&e),
        },
        (Method::GET, [_, "connectors"]) => {
            api.list_connectors(owner_id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &v))
        }
        (Method::POST, [_, "connectors", connector_id]) => {
            let connector_id = connector_id.to_string();
            match read_json(req).await {
                Ok(body) => api
                    .put_connector(owner_id, &connector_id, body)
                    .await
                    .map_or_else(api_err_response, |()| json_response(StatusCode::OK, &serde_json::json!({}))),
                Err(e) => bad_request(&e),
            }
        }
        (Method::DELETE, [_, "connectors", connector_id]) => api
            .delete_connector(owner_id, connector_id)
            .await
            .map_or_else(api_err_response, |()| json_response(StatusCode::OK, &serde_json::json!({}))),
        (Method::GET, [_, "plugins"]) => {
            api.list_plugins(owner_id).await.map_or_else(api_err_response, |v| json_response(StatusCode::OK, &v))
        }
        (Method::POST, [_, "plugins", plugin_id, "install"]) => api
            .install_plugin(owner_id, plugin_id)
            .await
            .map_or_else(api_err_response, |()| json_response(StatusCode::OK, &serde_json::json!({}))),
        (Method::DELETE, [_, "plugins", plugin_id]) => api
            .uninstall_plugin(owner_id, plugin_id)
            .await
            .map_or_else(api_err_response, |()| json_response(StatusCode::OK, &serde_json::json!({}))),
        _ => not_found(),
    }
}

async fn read_json(req: Request<Incoming>) -> Result<Value, String> {
    let bytes = req.collect().await.map_err(|e| e.to_string())?.to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid json body: {e}"))
}
