//! Upload endpoints: create+validate, inspect, confirm, read result.

use crate::dtos::{
    ConfirmRequest, ConfirmResponse, UploadDetailResponse, UploadResponse, UploadResultResponse,
};
use crate::middleware::node::{NodeContext, UserContext};
use crate::models::NodeType;
use crate::services::uploads;
use crate::startup::AppState;
use crate::workers::ReconcileJob;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use platform_core::error::AppError;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use uuid::Uuid;

struct UploadForm {
    file_name: String,
    bytes: Vec<u8>,
    supply_chain_id: Uuid,
    template_id: Uuid,
    product_id: Uuid,
    unit: String,
    currency: String,
}

async fn read_upload_form(
    mut multipart: Multipart,
    max_file_bytes: usize,
) -> Result<UploadForm, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut supply_chain_id = None;
    let mut template_id = None;
    let mut product_id = None;
    let mut unit = None;
    let mut currency = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| {
                        AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e))
                    })?
                    .to_vec();

                if bytes.len() > max_file_bytes {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "File too large (max {} bytes)",
                        max_file_bytes
                    )));
                }
                file = Some((file_name, bytes));
            }
            "supply_chain" | "template" | "product" => {
                let text = field.text().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read field {}: {}", name, e))
                })?;
                let id = Uuid::from_str(text.trim()).map_err(|_| {
                    AppError::BadRequest(anyhow::anyhow!("Invalid {} id", name))
                })?;
                match name.as_str() {
                    "supply_chain" => supply_chain_id = Some(id),
                    "template" => template_id = Some(id),
                    _ => product_id = Some(id),
                }
            }
            "unit" | "currency" => {
                let text = field.text().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read field {}: {}", name, e))
                })?;
                if name == "unit" {
                    unit = Some(text.trim().to_string());
                } else {
                    currency = Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    Ok(UploadForm {
        file_name,
        bytes,
        supply_chain_id: supply_chain_id
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("supply_chain is required")))?,
        template_id: template_id
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("template is required")))?,
        product_id: product_id
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("product is required")))?,
        unit: unit.unwrap_or_else(|| "kg".to_string()),
        currency: currency.unwrap_or_else(|| "EUR".to_string()),
    })
}

/// `POST /uploads` — create the upload and run the validation pass
/// synchronously, returning the row-by-row preview.
pub async fn create_upload(
    State(state): State<AppState>,
    node: NodeContext,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_upload_form(multipart, state.config.upload.max_file_bytes).await?;

    let acting_node = state
        .db
        .get_node(node.0)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Node not found")))?;
    if NodeType::parse(&acting_node.node_type) != NodeType::Company {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Only company nodes can submit bulk uploads"
        )));
    }

    state
        .db
        .get_supply_chain(form.supply_chain_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Supply chain not found")))?;

    // Per-node duplicate-file guard, enforced before any row is parsed.
    let file_hash = hex::encode(Sha256::digest(&form.bytes));

    let upload = state
        .db
        .create_upload(
            node.0,
            form.supply_chain_id,
            form.template_id,
            form.product_id,
            &form.unit,
            &form.currency,
            &form.file_name,
            &file_hash,
        )
        .await?;

    tracing::info!(
        upload_id = %upload.upload_id,
        file_name = %form.file_name,
        size = form.bytes.len(),
        "Upload received"
    );

    let response = uploads::validate_upload(&state.db, &upload, &form.bytes).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /uploads/:id` — upload metadata plus the frozen validation data.
pub async fn get_upload(
    State(state): State<AppState>,
    node: NodeContext,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = state
        .db
        .get_upload(node.0, upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Upload not found")))?;

    let row_data = upload.row_data.take();

    Ok(Json(UploadDetailResponse {
        upload: UploadResponse::from(upload),
        row_data,
    }))
}

/// `POST /uploads/:id/confirm` — lock the upload and hand it to the
/// reconciliation workers. Fire-and-forget: the response only says the
/// job was scheduled.
pub async fn confirm_upload(
    State(state): State<AppState>,
    node: NodeContext,
    user: UserContext,
    Path(upload_id): Path<Uuid>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    state
        .db
        .get_upload(node.0, upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Upload not found")))?;

    // Guarded transition: only a `validated` upload can be consumed, and
    // only once.
    let upload = state
        .db
        .mark_upload_used(node.0, upload_id)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!("Upload is not ready for confirmation"))
        })?;

    let job = ReconcileJob {
        upload_id: upload.upload_id,
        node_id: node.0,
        user_id: user.0,
        selected_rows: request.rows,
    };

    if let Err(e) = state.job_tx.try_send(job) {
        // Give the caller a retry path instead of a permanently stuck
        // `used` upload.
        state.db.revert_upload_to_validated(upload_id).await?;
        tracing::error!(upload_id = %upload_id, error = %e, "Failed to enqueue reconciliation");
        return Err(AppError::ServiceUnavailable);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ConfirmResponse {
            id: upload_id,
            status: upload.status,
            message: "Reconciliation scheduled".to_string(),
        }),
    ))
}

/// `GET /uploads/:id/result` — post-commit summary once the worker has
/// finished; `completed = false` while the job is still pending.
pub async fn upload_result(
    State(state): State<AppState>,
    node: NodeContext,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let upload = state
        .db
        .get_upload(node.0, upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Upload not found")))?;

    Ok(Json(UploadResultResponse::from_upload(upload)))
}
