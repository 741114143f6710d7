use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Extension, Json,
};
use bytes::Bytes;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    CurrentUser, DeleteManyRequest, FailedUpload, FileListResponse, FileQuery, FileRecord,
    FileResponse, RenameFileRequest, UploadBatchResponse,
};
use crate::services::ingest::RawUpload;
use crate::services::FileService;
use crate::AppState;

/// Upload a batch of files
/// POST /api/v1/files/upload (multipart field "files", up to 10 parts)
pub async fn upload_files(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadBatchResponse>>> {
    let mut uploads: Vec<RawUpload> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to process multipart: {}", e)))?
    {
        if field.name() != Some("files") {
            continue;
        }

        // A part with no filename is still handed to the pipeline so its
        // rejection stays per-file instead of failing the whole batch
        let file_name = field.file_name().map(|s| s.to_string()).unwrap_or_default();
        let mime_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read {}: {}", file_name, e)))?;

        uploads.push(RawUpload {
            file_name,
            mime_type,
            data,
        });
    }

    let outcomes = state.pipeline.ingest(&current_user.id, uploads).await?;

    let mut drafts = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(draft) => drafts.push(draft),
            Err(e) => failed.push(FailedUpload {
                file_name: outcome.file_name,
                error: e.to_string(),
            }),
        }
    }

    let uploaded = FileService::create_records(&state.db, &current_user.id, drafts)
        .await?
        .into_iter()
        .map(FileResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(UploadBatchResponse {
        uploaded,
        failed,
    })))
}

/// List files for the current owner
/// GET /api/v1/files?search=&sort_by=&order=&page=&per_page=
pub async fn list_files(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<FileQuery>,
) -> Result<Json<ApiResponse<FileListResponse>>> {
    let files = FileService::list(&state.db, &current_user.id, query).await?;
    Ok(Json(ApiResponse::success(files)))
}

/// Download a file decrypted, as an attachment
/// GET /api/v1/files/:id/download
pub async fn download_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Response> {
    let (plaintext, file) = FileService::retrieve(
        &state.db,
        state.store.as_ref(),
        &state.cipher,
        state.blob_timeout(),
        &current_user.id,
        &id,
    )
    .await?;

    file_response(plaintext, &file, true)
}

/// Publicly shared file download, keyed by file id alone.
/// GET /api/v1/files/public/share/:id
///
/// Deliberately unauthenticated: the id acts as a capability token, anyone
/// who learns it can read the decrypted file.
pub async fn public_share_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let (plaintext, file) = FileService::retrieve_public(
        &state.db,
        state.store.as_ref(),
        &state.cipher,
        state.blob_timeout(),
        &id,
    )
    .await?;

    file_response(plaintext, &file, false)
}

/// Serve a file's thumbnail preview
/// GET /api/v1/files/:id/thumbnail
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Response> {
    let preview = FileService::retrieve_thumbnail(
        &state.db,
        state.store.as_ref(),
        state.blob_timeout(),
        &current_user.id,
        &id,
    )
    .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, preview.len())
        .body(Body::from(preview))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// Rename a file
/// PATCH /api/v1/files/:id/rename
pub async fn rename_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<RenameFileRequest>,
) -> Result<Json<ApiResponse<FileResponse>>> {
    let file = FileService::rename(&state.db, &current_user.id, &id, &req.name).await?;
    Ok(Json(ApiResponse::success(file)))
}

/// Delete a single file
/// DELETE /api/v1/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    FileService::delete(
        &state.db,
        state.store.as_ref(),
        state.blob_timeout(),
        &current_user.id,
        &id,
    )
    .await?;
    Ok(Json(ApiResponse::success(())))
}

/// Bulk delete files
/// POST /api/v1/files/delete-many
pub async fn delete_many_files(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<DeleteManyRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let deleted = FileService::delete_many(
        &state.db,
        state.store.as_ref(),
        state.blob_timeout(),
        &current_user.id,
        &req.ids,
    )
    .await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "deleted": deleted
    }))))
}

/// Build a file download response preserving the stored MIME type
fn file_response(plaintext: Vec<u8>, file: &FileRecord, attachment: bool) -> Result<Response> {
    let fallback_name = file.name.replace(['"', '\\'], "_");
    let encoded_name = urlencoding::encode(&file.name);
    let disposition = if attachment { "attachment" } else { "inline" };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.mime_type.clone())
        .header(header::CONTENT_LENGTH, plaintext.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "{}; filename=\"{}\"; filename*=UTF-8''{}",
                disposition, fallback_name, encoded_name
            ),
        )
        .body(Body::from(Bytes::from(plaintext)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
