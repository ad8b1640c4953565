//! Request/response DTOs for bulk-upload-service.
//!
//! `RowResult`/`FieldResult` are also the frozen per-row validation data
//! persisted on the upload: the duplicate detector and the reconciliation
//! adapter consume exactly what the validator produced, never a re-read
//! of the sheet.

use crate::models::{Upload, UploadResult, UploadStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResult {
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateRef {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleEntry {
    pub double_entry: bool,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowResult {
    pub index: usize,
    pub is_select: bool,
    pub is_removed: bool,
    pub is_keep: bool,
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_entry: Option<DoubleEntry>,
    pub issue_count: u32,
    pub valid: bool,
    pub fields: Vec<FieldResult>,
}

impl RowResult {
    pub fn field(&self, key: &str) -> Option<&FieldResult> {
        self.fields.iter().find(|f| f.field == key)
    }

    /// Non-empty value of a field, if present and valid.
    pub fn valid_value(&self, key: &str) -> Option<&str> {
        self.field(key)
            .filter(|f| f.valid && !f.value.is_empty())
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: Uuid,
    pub name: String,
}

/// Preview returned from upload creation and `GET /uploads/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub id: Uuid,
    pub count: usize,
    pub valid: bool,
    pub message: String,
    pub product: ProductRef,
    pub row_data: Vec<RowResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub node_id: Uuid,
    pub supply_chain_id: Uuid,
    pub template_id: Uuid,
    pub file_name: String,
    pub file_hash: String,
    pub status: String,
    pub row_count: i32,
    pub created_utc: String,
    pub updated_utc: String,
}

impl From<Upload> for UploadResponse {
    fn from(u: Upload) -> Self {
        Self {
            id: u.upload_id,
            node_id: u.node_id,
            supply_chain_id: u.supply_chain_id,
            template_id: u.template_id,
            file_name: u.file_name,
            file_hash: u.file_hash,
            status: u.status,
            row_count: u.row_count,
            created_utc: u.created_utc.to_rfc3339(),
            updated_utc: u.updated_utc.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadDetailResponse {
    #[serde(flatten)]
    pub upload: UploadResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_data: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    /// Restrict the commit to these data-row indexes. Absent means every
    /// valid, non-duplicate row from the stored validation data.
    #[serde(default)]
    pub rows: Option<Vec<usize>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResultResponse {
    pub id: Uuid,
    pub status: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<UploadResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UploadResultResponse {
    pub fn from_upload(upload: Upload) -> Self {
        let result = upload
            .result
            .and_then(|v| serde_json::from_value::<UploadResult>(v).ok());
        Self {
            id: upload.upload_id,
            status: upload.status.clone(),
            completed: UploadStatus::parse(&upload.status) == UploadStatus::Used
                && result.is_some(),
            result,
            error_message: upload.error_message,
        }
    }
}
