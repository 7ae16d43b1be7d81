use crate::auth::AdminUser;
use crate::csv_import::parse_csv;
use crate::db_storage::{RecordPatch, RecordStorage};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{CompanyDirectorRecord, ImportBatch, ImportReport};
use crate::validation::import_file_name;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound for an uploaded CSV, matching the request body limit.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const RECENT_IMPORTS_LIMIT: i64 = 100;

/// GET /api/v1/admin/records/:id
///
/// Unmasked: admins see the stored contact fields.
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyDirectorRecord>, AppError> {
    let record = RecordStorage::new(state.db.clone()).get(id).await?;
    Ok(Json(record))
}

/// PATCH /api/v1/admin/records/:id
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<CompanyDirectorRecord>, AppError> {
    let patch = RecordPatch::from_json(body)?;
    let updated = RecordStorage::new(state.db.clone())
        .update(id, &patch)
        .await?;

    state.registry().invalidate_company(&updated.cin).await;
    tracing::info!("Admin {} updated record {}", admin.id, id);
    Ok(Json(updated))
}

/// DELETE /api/v1/admin/records/:id
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let deleted = RecordStorage::new(state.db.clone()).delete(id).await?;

    state.registry().invalidate_company(&deleted.cin).await;
    tracing::info!("Admin {} deleted record {}", admin.id, id);
    Ok(Json(json!({ "deleted": id, "cin": deleted.cin })))
}

/// POST /api/v1/admin/imports
///
/// Multipart upload with a single `file` field holding a `.csv`. A file name
/// that was imported before is refused with 409.
pub async fn upload_import(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImportReport>), AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(AppError::BadRequest(
                "Upload one CSV file per request".to_string(),
            ));
        }
        let Some(raw_name) = field.file_name().map(|s| s.to_string()) else {
            return Err(AppError::BadRequest("The file field needs a file name".to_string()));
        };
        let file_name = import_file_name(&raw_name)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        upload = Some((file_name, bytes.to_vec()));
    }

    let Some((file_name, bytes)) = upload else {
        return Err(AppError::BadRequest("Missing 'file' field".to_string()));
    };
    if bytes.is_empty() {
        return Err(AppError::BadRequest(format!("{} is empty", file_name)));
    }

    tracing::info!(
        "Admin {} uploading {} ({} bytes)",
        admin.id,
        file_name,
        bytes.len()
    );

    let storage = RecordStorage::new(state.db.clone());
    if storage.file_already_imported(&file_name).await? {
        return Err(AppError::Conflict(format!(
            "A file named '{}' has already been imported",
            file_name
        )));
    }

    let parsed = parse_csv(&bytes, &file_name)?;
    let report = storage.import(&file_name, parsed, Some(admin.id)).await?;

    if report.rows_inserted > 0 {
        state.registry().invalidate_all();
    }

    Ok((StatusCode::OK, Json(report)))
}

/// GET /api/v1/admin/imports
pub async fn list_imports(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<ImportBatch>>, AppError> {
    let batches = RecordStorage::new(state.db.clone())
        .recent_imports(RECENT_IMPORTS_LIMIT)
        .await?;
    Ok(Json(batches))
}
