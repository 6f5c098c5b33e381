//! The axum smart-HTTP server.
//!
//! Requests are partitioned by repository name: each repository has a
//! singleton actor lock, so ref updates, index writes, and pack ingestion
//! never interleave within one repository while independent repositories
//! proceed in parallel. The synchronous wire handlers run on the blocking
//! pool with the actor lock held.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use harbor_repo::{InitOptions, Repository};
use harbor_storage::{AbortSignal, Storage};
use tokio::sync::Mutex;

use crate::pktline::PktWriter;
use crate::{advertise, receive_pack, upload_pack, Service, WireError};

/// Shared server state: the storage backend plus per-repository actors.
pub struct GitServer<S> {
    storage: S,
    actors: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S> GitServer<S>
where
    S: Storage + Clone + Send + Sync + 'static,
{
    pub fn new(storage: S) -> Arc<Self> {
        Arc::new(Self {
            storage,
            actors: Mutex::new(HashMap::new()),
        })
    }

    /// Build the HTTP router. `/<repo>` and `/<repo>.git` address the same
    /// repository.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/{repo}/HEAD", get(head_endpoint::<S>))
            .route("/{repo}/info/refs", get(info_refs::<S>))
            .route("/{repo}/git-upload-pack", post(upload_pack_endpoint::<S>))
            .route("/{repo}/git-receive-pack", post(receive_pack_endpoint::<S>))
            .fallback(not_found)
            .with_state(self)
    }

    /// The singleton lock for one repository.
    async fn actor(&self, repo: &str) -> Arc<Mutex<()>> {
        let mut actors = self.actors.lock().await;
        actors.entry(repo.to_string()).or_default().clone()
    }

    /// Run a synchronous handler under the repository's actor lock.
    async fn run_locked<T, F>(&self, repo: String, f: F) -> Result<T, WireError>
    where
        T: Send + 'static,
        F: FnOnce(&mut S, &AbortSignal) -> Result<T, WireError> + Send + 'static,
    {
        let actor = self.actor(&repo).await;
        let _guard = actor.lock().await;

        let mut storage = self.storage.clone();
        let abort = AbortSignal::new();
        tokio::task::spawn_blocking(move || {
            storage.init(&repo)?;
            f(&mut storage, &abort)
        })
        .await
        .map_err(|e| WireError::Internal(format!("handler task failed: {e}")))?
    }
}

/// Strip the optional `.git` suffix from a repository path segment.
pub fn normalize_repo(raw: &str) -> Result<String, WireError> {
    let name = raw.strip_suffix(".git").unwrap_or(raw);
    if name.is_empty() || name.contains('/') {
        return Err(WireError::RepoNotFound);
    }
    Ok(name.to_string())
}

fn require_initialized<S: Storage>(storage: &S) -> Result<(), WireError> {
    if storage.exists(".git/HEAD")? {
        Ok(())
    } else {
        Err(WireError::RepoNotFound)
    }
}

async fn head_endpoint<S>(
    State(server): State<Arc<GitServer<S>>>,
    Path(repo): Path<String>,
) -> Response
where
    S: Storage + Clone + Send + Sync + 'static,
{
    respond(
        async {
            let repo = normalize_repo(&repo)?;
            let body = server
                .run_locked(repo, |storage, _| advertise::head_content(storage))
                .await?;
            Ok((body, "text/plain"))
        }
        .await,
    )
}

async fn info_refs<S>(
    State(server): State<Arc<GitServer<S>>>,
    Path(repo): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response
where
    S: Storage + Clone + Send + Sync + 'static,
{
    respond(
        async {
            let repo = normalize_repo(&repo)?;
            let service = params
                .get("service")
                .and_then(|name| Service::from_name(name))
                .ok_or_else(|| {
                    WireError::InvalidInput("missing or unknown service parameter".into())
                })?;

            let body = server
                .run_locked(repo.clone(), move |storage, _| {
                    match service {
                        // Push targets may not exist yet; materialize them.
                        Service::ReceivePack => {
                            Repository::init_in_place(storage, &InitOptions::default())?;
                        }
                        Service::UploadPack => require_initialized(storage)?,
                    }
                    advertise::advertise_refs(storage, service)
                })
                .await?;

            tracing::debug!(%repo, service = service.as_str(), "advertised refs");
            Ok((
                body,
                match service {
                    Service::UploadPack => "application/x-git-upload-pack-advertisement",
                    Service::ReceivePack => "application/x-git-receive-pack-advertisement",
                },
            ))
        }
        .await,
    )
}

async fn upload_pack_endpoint<S>(
    State(server): State<Arc<GitServer<S>>>,
    Path(repo): Path<String>,
    body: Bytes,
) -> Response
where
    S: Storage + Clone + Send + Sync + 'static,
{
    respond(
        async {
            let repo = normalize_repo(&repo)?;
            let response = server
                .run_locked(repo.clone(), move |storage, abort| {
                    require_initialized(storage)?;
                    upload_pack::upload_pack(storage, &body, abort)
                })
                .await?;
            tracing::debug!(%repo, bytes = response.len(), "upload-pack served");
            Ok((response, "application/x-git-upload-pack-result"))
        }
        .await,
    )
}

async fn receive_pack_endpoint<S>(
    State(server): State<Arc<GitServer<S>>>,
    Path(repo): Path<String>,
    body: Bytes,
) -> Response
where
    S: Storage + Clone + Send + Sync + 'static,
{
    respond(
        async {
            let repo = normalize_repo(&repo)?;
            let response = server
                .run_locked(repo.clone(), move |storage, abort| {
                    Repository::init_in_place(storage, &InitOptions::default())?;
                    receive_pack::receive_pack(storage, &body, abort)
                })
                .await?;
            tracing::debug!(%repo, "receive-pack applied");
            Ok((response, "application/x-git-receive-pack-result"))
        }
        .await,
    )
}

async fn not_found() -> Response {
    json_response(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#)
}

fn respond(result: Result<(Vec<u8>, &'static str), WireError>) -> Response {
    match result {
        Ok((body, content_type)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// Translate a wire error into its HTTP shape.
pub fn error_response(err: WireError) -> Response {
    if err.is_aborted() {
        // 499 Client Closed Request; no body.
        return StatusCode::from_u16(499)
            .expect("valid status code")
            .into_response();
    }

    match &err {
        WireError::RepoNotFound => json_response(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#),
        WireError::Protocol(_) | WireError::InvalidInput(_) => {
            let mut writer = PktWriter::new();
            let _ = writer.write_text(&err.to_string());
            writer.write_flush();
            (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "text/plain")],
                writer.into_bytes(),
            )
                .into_response()
        }
        _ => {
            tracing::warn!(error = %err, "request failed");
            let body = serde_json::json!({ "error": err.to_string() }).to_string();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
    }
}

fn json_response(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
