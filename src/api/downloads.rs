//! Download lifecycle REST endpoints
//!
//! These are the calls a chat front-end makes on behalf of its users. Job
//! ids come back from enqueue and in every status event.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::downloads::{
    DownloadError, Enqueued, JobDescriptor, JobId, MessageRef, OwnerId, PersistedSnapshot, Source,
    ToggleOutcome,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddDownloadItem {
    /// Magnet link
    pub magnet: Option<String>,
    /// URL to .torrent file
    pub url: Option<String>,
    /// Release name; derived from the magnet or URL when missing.
    pub title: Option<String>,
    /// Override the season-pack classification of the search front-end.
    pub season_pack: Option<bool>,
    pub origin_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddDownloadRequest {
    pub owner: String,
    #[serde(flatten)]
    pub item: AddDownloadItem,
}

#[derive(Debug, Deserialize)]
pub struct AddBatchRequest {
    pub owner: String,
    pub items: Vec<AddDownloadItem>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Enqueued>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ToggleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn status_for(error: &DownloadError) -> StatusCode {
    match error {
        DownloadError::NotFound(_) => StatusCode::NOT_FOUND,
        DownloadError::InvalidState { .. } => StatusCode::CONFLICT,
        DownloadError::Validation(_) => StatusCode::BAD_REQUEST,
        DownloadError::ShuttingDown | DownloadError::EngineUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn action_result(result: Result<(), DownloadError>) -> (StatusCode, Json<ActionResponse>) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(ActionResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(ActionResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

fn enqueue_result(result: Result<Vec<Enqueued>, DownloadError>) -> (StatusCode, Json<EnqueueResponse>) {
    match result {
        Ok(results) => (
            StatusCode::CREATED,
            Json(EnqueueResponse {
                success: true,
                results,
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(EnqueueResponse {
                success: false,
                results: Vec::new(),
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Build a descriptor from a request item.
fn descriptor_for(owner: &OwnerId, item: AddDownloadItem) -> Result<JobDescriptor, DownloadError> {
    let source = match (item.magnet, item.url) {
        (Some(uri), _) if uri.starts_with("magnet:") => Source::Magnet { uri },
        (Some(_), _) => {
            return Err(DownloadError::Validation("'magnet' must be a magnet: URI".to_string()));
        }
        (None, Some(url)) => Source::Url { url },
        (None, None) => {
            return Err(DownloadError::Validation(
                "Either 'magnet' or 'url' must be provided".to_string(),
            ));
        }
    };

    let name = item
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| name_from_source(&source))
        .unwrap_or_else(|| source.to_string());

    let mut descriptor = JobDescriptor::new(source, owner.clone(), name);
    if let Some(season_pack) = item.season_pack {
        descriptor.parsed_info.is_season_pack = season_pack;
    }
    if let Some(message) = item.origin_message {
        descriptor = descriptor.with_origin_message(MessageRef(message));
    }
    Ok(descriptor)
}

/// `dn=` of a magnet, or the last path segment of a URL.
fn name_from_source(source: &Source) -> Option<String> {
    match source {
        Source::Magnet { uri } => url::Url::parse(uri)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == "dn")
            .map(|(_, v)| v.into_owned()),
        Source::Url { url } => url::Url::parse(url)
            .ok()?
            .path_segments()?
            .next_back()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
        Source::File { .. } => None,
    }
}

/// Active jobs and queued entries
async fn list_downloads(State(state): State<AppState>) -> Json<PersistedSnapshot> {
    Json(state.downloads.snapshot())
}

/// Enqueue one download
async fn add_download(
    State(state): State<AppState>,
    Json(body): Json<AddDownloadRequest>,
) -> (StatusCode, Json<EnqueueResponse>) {
    let owner = OwnerId::new(body.owner);
    let result = descriptor_for(&owner, body.item)
        .and_then(|descriptor| state.downloads.enqueue(descriptor))
        .map(|outcome| vec![outcome]);
    enqueue_result(result)
}

/// Enqueue several downloads in order (e.g. a season's episodes)
async fn add_batch(
    State(state): State<AppState>,
    Json(body): Json<AddBatchRequest>,
) -> (StatusCode, Json<EnqueueResponse>) {
    let owner = OwnerId::new(body.owner);
    let result = body
        .items
        .into_iter()
        .map(|item| descriptor_for(&owner, item))
        .collect::<Result<Vec<_>, _>>()
        .and_then(|descriptors| state.downloads.enqueue_batch(descriptors));
    enqueue_result(result)
}

/// Upload a .torrent file (multipart fields: `owner`, `file`, optional `title`)
async fn upload_download(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<EnqueueResponse>) {
    let mut owner: Option<String> = None;
    let mut title: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return enqueue_result(Err(DownloadError::Validation(format!(
                    "Malformed upload: {}",
                    e
                ))));
            }
        };
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "owner" => owner = field.text().await.ok(),
            "title" => title = field.text().await.ok(),
            "file" | "torrent" => match field.bytes().await {
                Ok(bytes) => file_data = Some(bytes.to_vec()),
                Err(e) => {
                    return enqueue_result(Err(DownloadError::Validation(format!(
                        "Failed to read file: {}",
                        e
                    ))));
                }
            },
            _ => {}
        }
    }

    let (Some(owner), Some(data)) = (owner, file_data) else {
        return enqueue_result(Err(DownloadError::Validation(
            "Fields 'owner' and 'file' are required".to_string(),
        )));
    };

    let info = match crate::services::metainfo::decode(&data) {
        Ok(info) => info,
        Err(e) => return enqueue_result(Err(DownloadError::Validation(e.to_string()))),
    };

    let dir = state.config.session_path.join("uploads");
    let path = dir.join(format!("{}.torrent", JobId::new()));
    let write = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, &data).await
    };
    if let Err(source) = write.await {
        warn!(path = %path.display(), error = %source, "Failed to store uploaded torrent");
        return enqueue_result(Err(DownloadError::Filesystem { path, source }));
    }

    let name = title.filter(|t| !t.trim().is_empty()).unwrap_or(info.name);
    let descriptor = JobDescriptor::new(Source::File { path }, OwnerId::new(owner), name);
    enqueue_result(state.downloads.enqueue(descriptor).map(|outcome| vec![outcome]))
}

/// Pause if transferring, resume if paused
async fn toggle_download(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> (StatusCode, Json<ToggleResponse>) {
    match state.downloads.toggle_pause(job_id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ToggleResponse {
                success: true,
                outcome: Some(outcome),
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(ToggleResponse {
                success: false,
                outcome: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn set_paused(state: AppState, job_id: JobId, paused: bool) -> (StatusCode, Json<ToggleResponse>) {
    match state.downloads.set_paused(job_id, paused).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ToggleResponse {
                success: true,
                outcome: Some(outcome),
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(ToggleResponse {
                success: false,
                outcome: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Pause a download
async fn pause_download(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> (StatusCode, Json<ToggleResponse>) {
    set_paused(state, job_id, true).await
}

/// Resume a download
async fn resume_download(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> (StatusCode, Json<ToggleResponse>) {
    set_paused(state, job_id, false).await
}

/// Ask for confirmation before cancelling
async fn request_cancel(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> (StatusCode, Json<ActionResponse>) {
    action_result(state.downloads.request_cancel(job_id))
}

async fn confirm_cancel(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(body): Json<ConfirmRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    action_result(state.downloads.confirm_cancel(job_id, body.confirm))
}

async fn request_cancel_all(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> (StatusCode, Json<ActionResponse>) {
    action_result(state.downloads.request_cancel_all(&OwnerId::new(owner)))
}

async fn confirm_cancel_all(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(body): Json<ConfirmRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    action_result(
        state
            .downloads
            .confirm_cancel_all(&OwnerId::new(owner), body.confirm),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/downloads", get(list_downloads).post(add_download))
        .route("/downloads/batch", post(add_batch))
        .route("/downloads/upload", post(upload_download))
        .route("/downloads/{job_id}/toggle", post(toggle_download))
        .route("/downloads/{job_id}/pause", post(pause_download))
        .route("/downloads/{job_id}/resume", post(resume_download))
        .route("/downloads/{job_id}/cancel", post(request_cancel))
        .route("/downloads/{job_id}/cancel/confirm", post(confirm_cancel))
        .route("/owners/{owner}/cancel-all", post(request_cancel_all))
        .route("/owners/{owner}/cancel-all/confirm", post(confirm_cancel_all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn item(magnet: Option<&str>, url: Option<&str>) -> AddDownloadItem {
        AddDownloadItem {
            magnet: magnet.map(str::to_string),
            url: url.map(str::to_string),
            title: None,
            season_pack: None,
            origin_message: None,
        }
    }

    #[test]
    fn name_comes_from_magnet_dn() {
        let owner = OwnerId::new("1");
        let d = descriptor_for(
            &owner,
            item(
                Some("magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Fargo.S02E03.720p"),
                None,
            ),
        )
        .unwrap();
        assert_eq!(d.name, "Fargo.S02E03.720p");
        assert_eq!(d.parsed_info.episode, Some(3));
    }

    #[test]
    fn name_comes_from_url_path() {
        let owner = OwnerId::new("1");
        let d = descriptor_for(&owner, item(None, Some("https://x.org/t/Heat.1995.torrent"))).unwrap();
        assert_eq!(d.name, "Heat.1995.torrent");
        assert_eq!(d.parsed_info.year, Some(1995));
    }

    #[test]
    fn season_pack_override() {
        let owner = OwnerId::new("1");
        let mut request = item(None, Some("https://x.org/a.torrent"));
        request.title = Some("Fargo S02E01".into());
        request.season_pack = Some(true);
        assert!(descriptor_for(&owner, request).unwrap().parsed_info.is_season_pack);
    }

    #[test]
    fn missing_source_is_rejected() {
        let err = descriptor_for(&OwnerId::new("1"), item(None, None)).unwrap_err();
        assert_matches!(err, DownloadError::Validation(_));
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(status_for(&DownloadError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&DownloadError::InvalidState {
                phase: crate::services::downloads::Phase::Completing,
                action: "pause",
            }),
            StatusCode::CONFLICT
        );
    }
}
