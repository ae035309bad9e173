//! Route handlers — the thin layer translating HTTP into `Site` calls.

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use cask_cluster::{Heartbeat, Node};
use cask_core::{CaskError, Key};
use cask_storage::Backend;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{header_secret, require_secret};
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /` — a minimal cluster status page.
pub async fn index_get(State(state): State<AppState>) -> Html<String> {
    let neighbors = state.site.cluster.get_neighbors().await;
    let mut body = format!(
        "<html><body><h1>cask</h1><p>node: {}</p><ul>",
        state.site.cluster.myself().uuid
    );
    for n in neighbors {
        body.push_str(&format!(
            "<li>{} ({}) writeable={}</li>",
            n.uuid, n.base_url, n.writeable
        ));
    }
    body.push_str("</ul></body></html>");
    Html(body)
}

#[derive(Serialize)]
struct IngestResponse {
    key: String,
    success: bool,
}

/// `POST /` — ingest a multipart-uploaded file and replicate it across the
/// cluster along `WriteOrder`.
pub async fn index_post(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let data = first_file_part(&mut multipart).await?;
    let (key, success) = state.site.add_file(data).await;
    Ok(Json(IngestResponse {
        key: key.to_string(),
        success,
    }))
}

/// `POST /local/` — secret-gated local write, used by peers fanning a
/// replica out to this node. Echoes `key.String()` in the body so the caller
/// can confirm the write landed on the content it sent.
pub async fn local_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<String, ApiError> {
    require_secret(&state.site, header_secret(&headers))?;
    let data = first_file_part(&mut multipart).await?;
    let key = Key::from_bytes(&data);
    state.site.backend.write(&key, data).await?;
    Ok(key.to_string())
}

async fn first_file_part(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(CaskError::InvalidKey(format!("bad multipart body: {e}"))))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError(CaskError::InvalidKey(format!("bad multipart body: {e}"))))?;
            return Ok(bytes);
        }
    }
    Err(ApiError(CaskError::InvalidKey(
        "missing multipart field \"file\"".to_string(),
    )))
}

/// `GET /local/<key>/` — secret-gated local existence/content check.
pub async fn local_key_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_secret(&state.site, header_secret(&headers))?;
    let key = Key::from_string(&key)?;
    let etag = format!("\"{key}\"");

    if let Some(inm) = headers.get(axum::http::header::IF_NONE_MATCH) {
        if inm.to_str().map(|v| v == etag).unwrap_or(false) {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let data = state.site.backend.read(&key).await?;
    Ok((
        StatusCode::OK,
        [(axum::http::header::ETAG, etag)],
        data,
    )
        .into_response())
}

/// `HEAD /local/<key>/` — existence only, same auth and ETag semantics as
/// [`local_key_get`] without the body.
pub async fn local_key_head(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_secret(&state.site, header_secret(&headers))?;
    let key = Key::from_string(&key)?;
    if state.site.backend.exists(&key).await {
        let etag = format!("\"{key}\"");
        Ok((StatusCode::OK, [(axum::http::header::ETAG, etag)]).into_response())
    } else {
        Ok(StatusCode::NOT_FOUND.into_response())
    }
}

/// `GET /file/<key>/` — public read: local copy first, cluster fan-out on a
/// local miss, 404 if no member has it.
pub async fn file_key_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let key = Key::from_string(&key)?;
    if let Ok(data) = state.site.backend.read(&key).await {
        return Ok((StatusCode::OK, data).into_response());
    }
    match state.site.cluster.retrieve(&key).await {
        Ok(data) => Ok((StatusCode::OK, data).into_response()),
        Err(_) => Err(ApiError(CaskError::NotFound(key.to_string()))),
    }
}

/// `HEAD /file/<key>/` — existence only, same local-then-cluster search.
pub async fn file_key_head(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let key = Key::from_string(&key)?;
    if state.site.backend.exists(&key).await {
        return Ok(StatusCode::OK.into_response());
    }
    match state.site.cluster.retrieve(&key).await {
        Ok(_) => Ok(StatusCode::OK.into_response()),
        Err(_) => Err(ApiError(CaskError::NotFound(key.to_string()))),
    }
}

/// `GET /join/` — a minimal HTML form for operators joining nodes by hand.
pub async fn join_get() -> Html<&'static str> {
    Html(
        "<html><body><form method=\"post\" action=\"/join/\">\
         <input name=\"url\" placeholder=\"http://peer:port\">\
         <input name=\"secret\" type=\"password\">\
         <button type=\"submit\">join</button></form></body></html>",
    )
}

#[derive(Deserialize)]
pub struct JoinForm {
    url: String,
    secret: String,
}

/// `POST /join/` — join the node at `url` into this node's cluster view, then
/// propagate the introduction both ways.
pub async fn join_post(
    State(state): State<AppState>,
    axum::Form(form): axum::Form<JoinForm>,
) -> Result<Json<Node>, ApiError> {
    require_secret(&state.site, Some(form.secret.as_str()))?;
    let node = state.site.cluster.join_neighbor(&form.url).await?;
    info!(peer = %node.base_url, "joined neighbor");
    Ok(Json(node))
}

/// `GET /config/` — this node's own descriptor, as learned by peers calling
/// `join_neighbor`.
pub async fn config_get(State(state): State<AppState>) -> Json<Node> {
    Json(state.site.cluster.myself().clone())
}

/// `POST /heartbeat/` — accept a peer's heartbeat and fold its view of the
/// world into ours.
pub async fn heartbeat_post(
    State(state): State<AppState>,
    Json(hb): Json<Heartbeat>,
) -> Result<StatusCode, ApiError> {
    require_secret(&state.site, Some(hb.secret.as_str()))?;

    let sender = Node::new(hb.uuid.clone(), hb.base_url.clone(), hb.writeable);
    state.site.cluster.observe_neighbor(sender).await;

    for summary in &hb.neighbors {
        if summary.uuid == state.site.cluster.myself().uuid {
            continue;
        }
        let known = Node::new(summary.uuid.clone(), summary.base_url.clone(), summary.writeable);
        state.site.cluster.observe_neighbor(known).await;
    }

    Ok(StatusCode::OK)
}

/// `GET /favicon.ico` — silences browser log noise.
pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn not_found() -> Json<serde_json::Value> {
    warn!("unmatched route");
    Json(json!({ "error": "not found" }))
}
