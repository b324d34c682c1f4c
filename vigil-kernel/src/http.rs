/**
 * API REST VIGIL - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose le registre de ressources : ingestion d'observations, consultation,
 * filtrage, recherche, hiérarchie et gestion des tags utilisateur.
 *
 * FONCTIONNEMENT :
 * - Routeur Axum avec middleware auth API key (header x-api-key)
 * - POST /observations : enveloppe décodée → pipeline d'ingestion
 * - GET /resources[?kind=host,container&status=online&label.team=sre&since=...]
 * - GET /resources/search?q=web1 team:sre&limit=20&offset=0
 * - GET /resources/{id}, /resources/{id}/children, /resources/orphans
 * - PUT /resources/{id}/tags (merge, ou remplacement avec ?replace=true)
 * - DELETE /resources/{id}/tags/{key}, DELETE /resources/{id}
 * - GET /stats : compteurs registre + activité kernel
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 * - Sans clé configurée, l'API est fermée
 */

use crate::monitor;
use crate::state::{AppState, KernelActivity};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;
use vigil_core::{
    Envelope, Labels, Observed, RegistryError, RegistryStats, Resource, ResourceFilter, ResourceSearchQuery,
};

/// Erreur HTTP : code + message JSON `{"error": "..."}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid parameter {name}: {reason}")]
    BadParam { name: String, reason: String },
}

impl ApiError {
    fn bad_param(name: &str, reason: impl Into<String>) -> Self {
        Self::BadParam { name: name.to_string(), reason: reason.into() }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Registry(RegistryError::OrphanParent { .. }) => StatusCode::CONFLICT,
            ApiError::Registry(_) | ApiError::BadParam { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref() else {
        warn!("SECURITY: VIGIL_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/observations", post(post_observation))
        .route("/resources", get(list_resources))
        .route("/resources/search", get(search_resources))
        .route("/resources/orphans", get(list_orphans))
        .route("/resources/{id}", get(get_resource).delete(purge_resource))
        .route("/resources/{id}/children", get(list_children))
        .route("/resources/{id}/tags", put(put_tags))
        .route("/resources/{id}/tags/{key}", delete(delete_tag))
        .route("/stats", get(get_stats))
        .route("/flush", post(flush_now))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

#[derive(Debug, Default, Deserialize)]
struct ObservationParams {
    /// "log" pour appliquer les labels spécifiques aux logs
    #[serde(default)]
    signal: String,
}

// POST /observations (une enveloppe décodée)
async fn post_observation(
    State(app): State<AppState>,
    Query(params): Query<ObservationParams>,
    Json(env): Json<Envelope>,
) -> Json<Observed> {
    let observed = if params.signal.eq_ignore_ascii_case("log") {
        app.ingestor.observe_log(&env)
    } else {
        app.ingestor.observe(&env)
    };
    app.activity.lock().observations += 1;
    Json(observed)
}

// GET /resources (liste filtrée)
async fn list_resources(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Resource>> {
    let filter = parse_filter(&params)?;
    Ok(Json(app.registry.filter(&filter)))
}

// GET /resources/search
async fn search_resources(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Resource>> {
    let query = ResourceSearchQuery {
        query: params.get("q").cloned().unwrap_or_default(),
        filter: parse_filter(&params)?,
        limit: parse_int(&params, "limit")?,
        offset: parse_int(&params, "offset")?,
    };
    Ok(Json(app.registry.search(&query)?))
}

// GET /resources/{id} (détail)
async fn get_resource(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Resource> {
    Ok(Json(app.registry.get(&id)?))
}

// DELETE /resources/{id} (purge explicite)
async fn purge_resource(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Resource> {
    Ok(Json(app.registry.purge(&id)?))
}

// GET /resources/{id}/children
async fn list_children(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Resource>> {
    app.registry.get(&id)?;
    Ok(Json(app.registry.children(&id)))
}

// GET /resources/orphans
async fn list_orphans(State(app): State<AppState>) -> Json<Vec<Resource>> {
    Json(app.registry.orphans())
}

#[derive(Debug, Default, Deserialize)]
struct TagParams {
    #[serde(default)]
    replace: bool,
}

// PUT /resources/{id}/tags
async fn put_tags(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TagParams>,
    Json(tags): Json<Labels>,
) -> ApiResult<Resource> {
    let updated = if params.replace {
        app.registry.replace_tags(&id, tags)?
    } else {
        app.registry.set_tags(&id, &tags)?
    };
    Ok(Json(updated))
}

// DELETE /resources/{id}/tags/{key}
async fn delete_tag(State(app): State<AppState>, Path((id, key)): Path<(String, String)>) -> ApiResult<Resource> {
    Ok(Json(app.registry.remove_tag(&id, &key)?))
}

#[derive(Debug, Serialize)]
struct StatsView {
    registry: RegistryStats,
    kernel: KernelActivity,
    store: &'static str,
}

// GET /stats
async fn get_stats(State(app): State<AppState>) -> Json<StatsView> {
    Json(StatsView {
        registry: app.registry.stats(),
        kernel: app.activity.lock().clone(),
        store: app.store.name(),
    })
}

// POST /flush (flush immédiat vers le store)
async fn flush_now(State(app): State<AppState>) -> Json<serde_json::Value> {
    let written = monitor::flush_once(&app).await;
    Json(serde_json::json!({ "written": written }))
}

/// Query params → filtre. Listes séparées par des virgules ; `label.<clé>` et
/// `tag.<clé>` pour les contraintes exactes ; `since` en RFC3339.
fn parse_filter(params: &HashMap<String, String>) -> Result<ResourceFilter, ApiError> {
    let mut filter = ResourceFilter::default();
    for (key, value) in params {
        match key.as_str() {
            "kind" => {
                for kind in split_list(value) {
                    filter.kinds.push(kind.parse()?);
                }
            }
            "status" => {
                for status in split_list(value) {
                    filter.statuses.push(status.parse()?);
                }
            }
            "group" => filter.groups.extend(split_list(value).map(String::from)),
            "environment" => filter.environments.extend(split_list(value).map(String::from)),
            "owner" => filter.owners.extend(split_list(value).map(String::from)),
            "since" => {
                let since = OffsetDateTime::parse(value, &Rfc3339)
                    .map_err(|e| ApiError::bad_param("since", e.to_string()))?;
                filter.last_seen_since = Some(since);
            }
            other => {
                if let Some(label) = other.strip_prefix("label.") {
                    filter.labels.insert(label.to_string(), value.clone());
                } else if let Some(tag) = other.strip_prefix("tag.") {
                    filter.tags.insert(tag.to_string(), value.clone());
                }
            }
        }
    }
    Ok(filter)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn parse_int(params: &HashMap<String, String>, name: &str) -> Result<i64, ApiError> {
    match params.get(name) {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| ApiError::bad_param(name, format!("not an integer: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn filter_from_query_params() {
        let filter = parse_filter(&params(&[
            ("kind", "host, container"),
            ("status", "online"),
            ("label.team", "sre"),
            ("tag.tier", "1"),
            ("since", "2025-06-01T12:00:00Z"),
            ("q", "ignored here"),
        ]))
        .unwrap();
        assert_eq!(filter.kinds.len(), 2);
        assert_eq!(filter.statuses.len(), 1);
        assert_eq!(filter.labels["team"], "sre");
        assert_eq!(filter.tags["tier"], "1");
        assert!(filter.last_seen_since.is_some());
    }

    #[test]
    fn unknown_kind_is_bad_request() {
        let err = parse_filter(&params(&[("kind", "vm")])).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_since_is_bad_request() {
        let err = parse_filter(&params(&[("since", "yesterday")])).unwrap_err();
        assert!(matches!(err, ApiError::BadParam { .. }));
    }

    #[test]
    fn missing_paging_defaults_to_zero() {
        assert_eq!(parse_int(&params(&[]), "limit").unwrap(), 0);
        assert_eq!(parse_int(&params(&[("limit", "-3")]), "limit").unwrap(), -3);
        assert!(parse_int(&params(&[("limit", "ten")]), "limit").is_err());
    }
}
