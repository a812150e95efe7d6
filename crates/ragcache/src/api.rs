//! HTTP surface of the knowledge-base service.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use ifox_domain::config::RagCacheConfig;
use ifox_domain::Error;

use crate::artifact::{tree_from_documents, write_tree};
use crate::cache::TreeCache;
use crate::query::{answer_question, merge_results, search_tree, MergeStrategy, SearchResult};

pub struct RagState {
    pub cache: Arc<TreeCache>,
    pub config: RagCacheConfig,
}

pub type SharedState = Arc<RagState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/search", post(search))
        .route("/api/v1/answer", post(answer))
        .route("/api/v1/retrieve", post(retrieve))
        .route("/api/v1/federated/search", post(federated_search))
        .route("/api/v1/trees", get(list_trees).post(create_tree))
        .route("/api/v1/trees/:name", delete(delete_tree))
        .route("/api/v1/trees/:name/documents", post(add_documents))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(e: &Error) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match e {
        // Internal details never leak to callers.
        Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal_error".to_string(),
        other => other.to_string(),
    };
    (status, Json(json!({"error": e.kind(), "detail": message}))).into_response()
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let cached = state.cache.cached();
    Json(json!({
        "status": "ok",
        "cached_trees": cached.len(),
        "cached_bytes": state.cache.total_bytes(),
        "max_trees": state.config.max_trees,
        "max_cache_gb": state.config.max_cache_gb,
    }))
}

fn d_top_k() -> usize {
    10
}
fn d_top_k_per_tree() -> usize {
    5
}
fn d_merge() -> String {
    "score".into()
}

// ── search / answer / retrieve ─────────────────────────────────────

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "d_top_k")]
    top_k: usize,
    #[serde(default)]
    tree: Option<String>,
}

async fn search(State(state): State<SharedState>, Json(req): Json<SearchRequest>) -> Response {
    let tree_name = req.tree.unwrap_or_else(|| state.config.default_tree.clone());
    let tree = match state.cache.load(&tree_name).await {
        Ok(tree) => tree,
        Err(e) => return error_response(&e),
    };
    let results = search_tree(&tree, &req.query, req.top_k);
    Json(json!({
        "query": req.query,
        "tree": tree_name,
        "results": results,
        "total_nodes_searched": tree.nodes.len(),
    }))
    .into_response()
}

#[derive(Deserialize)]
struct AnswerRequest {
    question: String,
    #[serde(default = "d_top_k")]
    top_k: usize,
    #[serde(default)]
    tree: Option<String>,
}

async fn answer(State(state): State<SharedState>, Json(req): Json<AnswerRequest>) -> Response {
    let tree_name = req.tree.unwrap_or_else(|| state.config.default_tree.clone());
    let tree = match state.cache.load(&tree_name).await {
        Ok(tree) => tree,
        Err(e) => return error_response(&e),
    };
    let (answer, context_chunks, citations) = answer_question(&tree, &req.question, req.top_k);
    Json(json!({
        "question": req.question,
        "answer": answer,
        "tree": tree_name,
        "context_chunks": context_chunks,
        "citations": citations,
    }))
    .into_response()
}

async fn retrieve(State(state): State<SharedState>, Json(req): Json<SearchRequest>) -> Response {
    let tree_name = req.tree.unwrap_or_else(|| state.config.default_tree.clone());
    let tree = match state.cache.load(&tree_name).await {
        Ok(tree) => tree,
        Err(e) => return error_response(&e),
    };
    let chunks = search_tree(&tree, &req.query, req.top_k);
    Json(json!({
        "query": req.query,
        "tree": tree_name,
        "chunks": chunks,
    }))
    .into_response()
}

// ── federated ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FederatedSearchRequest {
    query: String,
    tree_names: Vec<String>,
    #[serde(default = "d_top_k")]
    top_k: usize,
    #[serde(default = "d_top_k_per_tree")]
    top_k_per_tree: usize,
    #[serde(default = "d_merge")]
    merge_strategy: String,
}

async fn federated_search(
    State(state): State<SharedState>,
    Json(req): Json<FederatedSearchRequest>,
) -> Response {
    if req.tree_names.is_empty() {
        return error_response(&Error::Config("tree_names cannot be empty".into()));
    }

    let mut all_results: Vec<SearchResult> = Vec::new();
    let mut trees_searched = Vec::new();
    let mut trees_failed = Vec::new();

    for tree_name in &req.tree_names {
        match state.cache.load(tree_name).await {
            Ok(tree) => {
                let mut results = search_tree(&tree, &req.query, req.top_k_per_tree);
                for result in &mut results {
                    result.source_tree = Some(tree_name.clone());
                }
                all_results.extend(results);
                trees_searched.push(tree_name.clone());
            }
            Err(e) => {
                tracing::warn!(tree = %tree_name, error = %e, "federated search: tree unavailable");
                trees_failed.push(tree_name.clone());
            }
        }
    }

    let merged = merge_results(
        all_results,
        req.top_k,
        MergeStrategy::parse(&req.merge_strategy),
    );

    Json(json!({
        "query": req.query,
        "results": merged,
        "trees_searched": trees_searched,
        "trees_failed": trees_failed,
    }))
    .into_response()
}

// ── tree management (off the hot path) ─────────────────────────────

async fn list_trees(State(state): State<SharedState>) -> impl IntoResponse {
    let cached: Vec<serde_json::Value> = state
        .cache
        .cached()
        .into_iter()
        .map(|(name, bytes)| json!({"name": name, "bytes": bytes}))
        .collect();
    Json(json!({
        "available": state.cache.list_local(),
        "cached": cached,
    }))
}

#[derive(Deserialize)]
struct CreateTreeRequest {
    name: String,
    documents: Vec<String>,
}

async fn create_tree(
    State(state): State<SharedState>,
    Json(req): Json<CreateTreeRequest>,
) -> Response {
    if req.name.is_empty() || req.name.contains('/') || req.name.contains("..") {
        return error_response(&Error::Config("invalid tree name".into()));
    }
    let nodes = tree_from_documents(&req.documents);
    let path = state.cache.trees_dir().join(format!("{}.tree", req.name));
    if let Err(e) = write_tree(&path, &nodes) {
        return error_response(&e);
    }
    state.cache.invalidate(&req.name);
    tracing::info!(tree = %req.name, nodes = nodes.len(), "tree created");
    Json(json!({"message": format!("Tree '{}' created", req.name), "nodes": nodes.len()}))
        .into_response()
}

async fn delete_tree(State(state): State<SharedState>, Path(name): Path<String>) -> Response {
    match state.cache.evict_and_delete(&name) {
        Ok(true) => Json(json!({"message": format!("Tree '{name}' deleted")})).into_response(),
        Ok(false) => error_response(&Error::NotFound(format!("tree: {name}"))),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct AddDocumentsRequest {
    documents: Vec<String>,
}

async fn add_documents(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(req): Json<AddDocumentsRequest>,
) -> Response {
    let existing = match state.cache.load(&name).await {
        Ok(tree) => tree,
        Err(e) => return error_response(&e),
    };

    // Rebuild: existing leaves + new documents, fresh summary root.
    let mut documents: Vec<String> = existing
        .nodes
        .iter()
        .filter(|n| n.layer == 0)
        .map(|n| n.text.clone())
        .collect();
    documents.extend(req.documents.iter().cloned());
    let nodes = tree_from_documents(&documents);

    let path = state.cache.trees_dir().join(format!("{name}.tree"));
    if let Err(e) = write_tree(&path, &nodes) {
        return error_response(&e);
    }
    state.cache.invalidate(&name);
    tracing::info!(tree = %name, added = req.documents.len(), "documents added");
    Json(json!({"message": format!("Added {} document(s) to '{name}'", req.documents.len())}))
        .into_response()
}
