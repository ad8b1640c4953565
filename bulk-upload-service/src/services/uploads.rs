//! Upload orchestration: the validation pass and the commit pass.
//!
//! Validation runs synchronously on upload creation and freezes its
//! output on the upload row. The commit pass runs on the worker and only
//! ever consumes that frozen data; the sheet is never re-read.

use crate::dedup::DoubleEntryDetector;
use crate::dtos::{DuplicateRef, ProductRef, RowResult, ValidationResponse};
use crate::models::{AdapterKind, Upload, UploadResult};
use crate::reconcile::{
    self, ConnectionAdapter, ReconcileContext, RowAdapter, TransactionAdapter,
};
use crate::services::database::Database;
use crate::services::metrics;
use crate::sheet;
use crate::template::{RowField, TemplateBindings, INCORRECT_LINKING};
use crate::validation::{parse_date, RowValidator, ValidationContext};
use platform_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// Run the full validation pass for a freshly created upload and freeze
/// the outcome on the upload row.
#[instrument(skip(db, bytes), fields(upload_id = %upload.upload_id, node_id = %upload.node_id))]
pub async fn validate_upload(
    db: &Database,
    upload: &Upload,
    bytes: &[u8],
) -> Result<ValidationResponse, AppError> {
    let product = db
        .get_product(upload.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    let template_fields = db.get_template_fields(upload.template_id).await?;
    if template_fields.is_empty() {
        metrics::record_validation("config_error");
        return Err(AppError::BadRequest(anyhow::anyhow!(INCORRECT_LINKING)));
    }
    let bindings = TemplateBindings::from_fields(&template_fields).map_err(|e| {
        metrics::record_validation("config_error");
        e
    })?;

    let grid = sheet::read_sheet(&upload.file_name, bytes).map_err(|e| {
        metrics::record_validation("structural_error");
        e
    })?;
    bindings.check_width(grid.width())?;

    let ctx = ValidationContext {
        farmers_by_fair_id: db
            .load_farmers_by_fair_id(upload.node_id, upload.supply_chain_id)
            .await?,
        connected_trace_ids: db
            .load_connected_trace_ids(upload.node_id, upload.supply_chain_id)
            .await?,
    };

    let validator = RowValidator::new(&bindings, &ctx);
    let mut detector = DoubleEntryDetector::new();
    let adapter_kind = adapter_kind_for(db, upload).await?;

    let mut rows: Vec<RowResult> = Vec::new();
    for raw_row in grid.data_rows() {
        if validator.is_blank_row(raw_row) {
            continue;
        }

        let mut row = validator.validate_row(rows.len(), raw_row);

        if row.valid {
            flag_persisted_duplicate(db, upload, adapter_kind, &mut row).await?;
        }
        detector.check(&mut row);

        metrics::record_row(classification(&row));
        rows.push(row);
    }

    let count = rows.len();
    let valid = rows.iter().all(|r| r.valid);

    let row_data = serde_json::to_value(&rows)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode row data: {}", e)))?;
    db.set_upload_validation(
        upload.upload_id,
        grid.title_row_index as i32,
        count as i32,
        &row_data,
    )
    .await?;

    metrics::record_validation(if valid { "ok" } else { "invalid_rows" });
    info!(count = count, valid = valid, "Upload validated");

    Ok(ValidationResponse {
        id: upload.upload_id,
        count,
        valid,
        message: String::new(),
        product: ProductRef {
            id: product.product_id,
            name: product.name,
        },
        row_data: rows,
    })
}

async fn adapter_kind_for(db: &Database, upload: &Upload) -> Result<AdapterKind, AppError> {
    let template = db
        .get_template(upload.template_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Template not found")))?;
    Ok(AdapterKind::parse(&template.adapter_kind))
}

/// Check one validated row against persisted data. Transaction sheets
/// match on the exact transaction tuple; onboarding sheets match on the
/// farmer identity tuple (rows updating a referenced farmer are not
/// duplicates of it).
async fn flag_persisted_duplicate(
    db: &Database,
    upload: &Upload,
    adapter_kind: AdapterKind,
    row: &mut RowResult,
) -> Result<(), AppError> {
    let duplicate_id = match adapter_kind {
        AdapterKind::Transaction => {
            let quantity = row.valid_value(RowField::Quantity.key());
            let date = row
                .valid_value(RowField::TransactionDate.key())
                .and_then(parse_date);
            match (quantity, date) {
                (Some(quantity), Some(date)) => {
                    db.find_duplicate_transaction(upload.node_id, upload.product_id, quantity, date)
                        .await?
                }
                _ => None,
            }
        }
        AdapterKind::Connection => {
            let references_existing = row.valid_value(RowField::FairId.key()).is_some();
            if references_existing {
                None
            } else {
                let value = |f: RowField| row.valid_value(f.key()).unwrap_or("");
                db.find_duplicate_farmer(
                    upload.node_id,
                    value(RowField::FirstName),
                    value(RowField::LastName),
                    value(RowField::City),
                    value(RowField::Province),
                    value(RowField::Country),
                    value(RowField::IdentificationNo),
                )
                .await?
            }
        }
    };

    if let Some(id) = duplicate_id {
        row.is_duplicate = true;
        row.duplicate = Some(DuplicateRef { id });
        row.valid = false;
        row.is_select = false;
    }

    Ok(())
}

fn classification(row: &RowResult) -> &'static str {
    if row.double_entry.is_some() {
        "double_entry"
    } else if row.is_duplicate {
        "duplicate"
    } else if row.valid {
        "valid"
    } else {
        "invalid"
    }
}

/// Commit pass, invoked by the reconciliation worker after the upload has
/// been locked. Consumes the frozen row data only.
#[instrument(skip(db), fields(upload_id = %upload_id, node_id = %node_id))]
pub async fn commit_upload(
    db: &Database,
    node_id: Uuid,
    upload_id: Uuid,
    selected_rows: Option<Vec<usize>>,
    user_id: &str,
) -> Result<UploadResult, AppError> {
    let upload = db
        .get_upload(node_id, upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Upload not found")))?;

    let row_data = upload
        .row_data
        .clone()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Upload has no validated data")))?;
    let rows: Vec<RowResult> = serde_json::from_value(row_data)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Corrupt row data: {}", e)))?;

    let committable: Vec<RowResult> = rows
        .into_iter()
        .filter(|row| {
            row.valid
                && !row.is_duplicate
                && row.double_entry.is_none()
                && !row.is_removed
                && selected_rows
                    .as_ref()
                    .map(|s| s.contains(&row.index))
                    .unwrap_or(true)
        })
        .collect();

    let adapter_kind = adapter_kind_for(db, &upload).await?;
    let known_farmers = db
        .load_farmers_by_fair_id(upload.node_id, upload.supply_chain_id)
        .await?;

    let ctx = ReconcileContext {
        upload_id: upload.upload_id,
        node_id: upload.node_id,
        supply_chain_id: upload.supply_chain_id,
        product_id: upload.product_id,
        unit: upload.unit.clone(),
        currency: upload.currency.clone(),
        user_id: user_id.to_string(),
    };

    let mut connection_adapter;
    let mut transaction_adapter;
    let adapter: &mut dyn RowAdapter = match adapter_kind {
        AdapterKind::Connection => {
            connection_adapter = ConnectionAdapter::new(&known_farmers);
            &mut connection_adapter
        }
        AdapterKind::Transaction => {
            transaction_adapter = TransactionAdapter::new(&known_farmers);
            &mut transaction_adapter
        }
    };

    let result = reconcile::run_batch(db, adapter, &ctx, &committable).await?;

    let result_json = serde_json::to_value(&result)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode result: {}", e)))?;
    db.set_upload_result(upload.upload_id, &result_json).await?;

    info!(
        farmers_added = result.farmers_added,
        farmers_updated = result.farmers_updated,
        transactions_added = result.transactions_added,
        errors = result.errors.len(),
        "Upload reconciled"
    );

    Ok(result)
}
