//! Reconciliation Adapter: validated rows to persisted writes.
//!
//! Two adapter variants sit behind one trait: connection-only onboarding
//! and connection-plus-transaction sheets. The batch runs inside one
//! top-level transaction; every row gets its own savepoint so a failed
//! row rolls back exactly its own writes and the batch carries on.

use crate::dtos::RowResult;
use crate::models::{Farmer, UploadResult};
use crate::services::database::{Database, FarmerDraft, TransactionDraft};
use crate::services::metrics;
use crate::template::RowField;
use crate::validation::{parse_date, parse_number, FarmerRef};
use async_trait::async_trait;
use chrono::Utc;
use platform_core::error::AppError;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::postgres::PgConnection;
use sqlx::Acquire;
use std::collections::HashMap;
use uuid::Uuid;

/// Shared per-batch context: the uploading node is the buyer and the
/// transaction destination.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub upload_id: Uuid,
    pub node_id: Uuid,
    pub supply_chain_id: Uuid,
    pub product_id: Uuid,
    pub unit: String,
    pub currency: String,
    pub user_id: String,
}

/// What one row actually wrote.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowWrites {
    pub farmer_created: bool,
    pub farmer_updated: bool,
    pub transaction_created: bool,
    pub plot_created: bool,
}

/// Per-row failure. Field errors carry the `{field: message}` shape the
/// result summary exposes; everything else is wrapped as a detail.
#[derive(Debug)]
pub enum RowError {
    Field(serde_json::Value),
    App(AppError),
}

impl From<AppError> for RowError {
    fn from(e: AppError) -> Self {
        Self::App(e)
    }
}

impl RowError {
    fn into_json(self) -> serde_json::Value {
        match self {
            Self::Field(v) => v,
            Self::App(e) => json!({ "detail": e.to_string() }),
        }
    }
}

#[async_trait]
pub trait RowAdapter: Send {
    async fn apply_row(
        &mut self,
        conn: &mut PgConnection,
        ctx: &ReconcileContext,
        row: &RowResult,
    ) -> Result<RowWrites, RowError>;
}

/// Build the farmer draft from a row's frozen field values.
pub fn draft_from_row(row: &RowResult) -> FarmerDraft {
    let opt = |field: RowField| {
        row.valid_value(field.key())
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty())
    };

    FarmerDraft {
        fair_id: String::new(),
        first_name: row
            .valid_value(RowField::FirstName.key())
            .unwrap_or("")
            .to_string(),
        last_name: row
            .valid_value(RowField::LastName.key())
            .unwrap_or("")
            .to_string(),
        phone: opt(RowField::Phone),
        email: opt(RowField::Email),
        street: opt(RowField::Street),
        city: opt(RowField::City),
        province: opt(RowField::Province),
        country: opt(RowField::Country),
        identification_no: opt(RowField::IdentificationNo),
    }
}

fn short_code(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, id[..8].to_uppercase())
}

/// Connection adapter: creates or updates the farmer and, for new
/// farmers, the connection/invitation pair. The fair-id cache is
/// per-instance and also picks up farmers created earlier in the same
/// batch.
pub struct ConnectionAdapter {
    farmer_ids: HashMap<String, Uuid>,
}

impl ConnectionAdapter {
    pub fn new(known_farmers: &HashMap<String, FarmerRef>) -> Self {
        Self {
            farmer_ids: known_farmers
                .iter()
                .map(|(fair_id, farmer)| (fair_id.clone(), farmer.farmer_id))
                .collect(),
        }
    }

    async fn upsert_farmer(
        &mut self,
        conn: &mut PgConnection,
        ctx: &ReconcileContext,
        row: &RowResult,
    ) -> Result<(Farmer, RowWrites), RowError> {
        let mut writes = RowWrites::default();
        let mut draft = draft_from_row(row);

        let fair_id = row
            .field(RowField::FairId.key())
            .map(|f| f.value.trim())
            .filter(|v| !v.is_empty());

        let farmer = match fair_id {
            Some(fair_id) => {
                let farmer_id = *self
                    .farmer_ids
                    .get(fair_id)
                    .ok_or_else(|| RowError::Field(json!({ "fair_id": "Invalid fair id" })))?;

                let farmer =
                    Database::update_farmer_partial(&mut *conn, ctx.node_id, farmer_id, &draft)
                        .await?
                        .ok_or_else(|| {
                            RowError::Field(json!({ "fair_id": "Invalid fair id" }))
                        })?;

                writes.farmer_updated = true;
                metrics::record_reconcile_operation("farmer_update", "ok");
                farmer
            }
            None => {
                draft.fair_id = short_code("FF");

                let display_name =
                    format!("{} {}", draft.first_name, draft.last_name).trim().to_string();
                let node =
                    Database::insert_farmer_node(&mut *conn, &display_name, &short_code("FT"))
                        .await?;
                let farmer = Database::insert_farmer(
                    &mut *conn,
                    node.node_id,
                    ctx.node_id,
                    ctx.supply_chain_id,
                    ctx.upload_id,
                    &draft,
                )
                .await?;
                let connection = Database::insert_connection(
                    &mut *conn,
                    ctx.supply_chain_id,
                    ctx.node_id,
                    node.node_id,
                )
                .await?;
                Database::insert_invitation(
                    &mut *conn,
                    connection.connection_id,
                    ctx.node_id,
                    &ctx.user_id,
                )
                .await?;

                self.farmer_ids.insert(farmer.fair_id.clone(), farmer.farmer_id);
                writes.farmer_created = true;
                metrics::record_reconcile_operation("farmer_create", "ok");
                farmer
            }
        };

        if let Some(plot_name) = row.valid_value(RowField::PlotName.key()) {
            let area = row
                .valid_value(RowField::PlotArea.key())
                .and_then(parse_number);
            Database::insert_farmer_plot(&mut *conn, farmer.farmer_id, plot_name, area).await?;
            writes.plot_created = true;
        }

        Ok((farmer, writes))
    }
}

#[async_trait]
impl RowAdapter for ConnectionAdapter {
    async fn apply_row(
        &mut self,
        conn: &mut PgConnection,
        ctx: &ReconcileContext,
        row: &RowResult,
    ) -> Result<RowWrites, RowError> {
        let (_, writes) = self.upsert_farmer(conn, ctx, row).await?;
        Ok(writes)
    }
}

/// Transaction adapter: everything the connection adapter does, plus an
/// external transaction whenever the row carries a positive quantity.
pub struct TransactionAdapter {
    inner: ConnectionAdapter,
}

impl TransactionAdapter {
    pub fn new(known_farmers: &HashMap<String, FarmerRef>) -> Self {
        Self {
            inner: ConnectionAdapter::new(known_farmers),
        }
    }
}

#[async_trait]
impl RowAdapter for TransactionAdapter {
    async fn apply_row(
        &mut self,
        conn: &mut PgConnection,
        ctx: &ReconcileContext,
        row: &RowResult,
    ) -> Result<RowWrites, RowError> {
        let (farmer, mut writes) = self.inner.upsert_farmer(conn, ctx, row).await?;

        let quantity = row
            .valid_value(RowField::Quantity.key())
            .and_then(parse_number)
            .unwrap_or(Decimal::ZERO);

        if quantity > Decimal::ZERO {
            let transaction_date = row
                .valid_value(RowField::TransactionDate.key())
                .and_then(parse_date)
                .unwrap_or_else(|| Utc::now().date_naive());
            let price = row.valid_value(RowField::Price.key()).and_then(parse_number);

            let draft = TransactionDraft {
                source_node_id: farmer.node_id,
                destination_node_id: ctx.node_id,
                supply_chain_id: ctx.supply_chain_id,
                product_id: ctx.product_id,
                quantity,
                unit: ctx.unit.clone(),
                currency: ctx.currency.clone(),
                price,
                transaction_date,
            };
            Database::insert_external_transaction(&mut *conn, ctx.upload_id, &draft).await?;

            writes.transaction_created = true;
            metrics::record_reconcile_operation("transaction_create", "ok");
        }

        Ok(writes)
    }
}

/// Drive one adapter over the committable rows, strictly in file order.
///
/// One top-level transaction wraps the batch; each row runs in its own
/// savepoint. A failed row is rolled back and recorded under its index,
/// and processing continues with the next row.
pub async fn run_batch(
    db: &Database,
    adapter: &mut dyn RowAdapter,
    ctx: &ReconcileContext,
    rows: &[RowResult],
) -> Result<UploadResult, AppError> {
    let mut tx = db.begin().await?;
    let mut result = UploadResult::default();

    for row in rows {
        let mut savepoint = tx.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin savepoint: {}", e))
        })?;

        match adapter.apply_row(&mut savepoint, ctx, row).await {
            Ok(writes) => {
                savepoint.commit().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to release savepoint: {}", e))
                })?;

                result.farmers_added += i32::from(writes.farmer_created);
                result.farmers_updated += i32::from(writes.farmer_updated);
                result.transactions_added += i32::from(writes.transaction_created);
                result.plots_added += i32::from(writes.plot_created);
            }
            Err(e) => {
                savepoint.rollback().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to roll back savepoint: {}", e))
                })?;

                metrics::record_reconcile_operation("row", "error");
                result.errors.insert(row.index.to_string(), e.into_json());
            }
        }
    }

    tx.commit().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit batch: {}", e))
    })?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::FieldResult;

    fn field(key: &str, value: &str, valid: bool) -> FieldResult {
        FieldResult {
            field: key.to_string(),
            field_type: "text".to_string(),
            value: value.to_string(),
            valid,
            message: None,
            meta: None,
        }
    }

    fn row(fields: Vec<FieldResult>) -> RowResult {
        RowResult {
            index: 0,
            is_select: true,
            is_removed: false,
            is_keep: false,
            is_duplicate: false,
            duplicate: None,
            double_entry: None,
            issue_count: 0,
            valid: true,
            fields,
        }
    }

    #[test]
    fn draft_picks_up_valid_fields_only() {
        let r = row(vec![
            field("first_name", "Anjuna", true),
            field("last_name", "X", true),
            field("city", "Kumasi", true),
            field("phone", "not-a-phone", false),
        ]);

        let draft = draft_from_row(&r);
        assert_eq!(draft.first_name, "Anjuna");
        assert_eq!(draft.last_name, "X");
        assert_eq!(draft.city.as_deref(), Some("Kumasi"));
        assert!(draft.phone.is_none());
    }

    #[test]
    fn generated_codes_are_prefixed_and_distinct() {
        let a = short_code("FF");
        let b = short_code("FF");
        assert!(a.starts_with("FF-"));
        assert_eq!(a.len(), "FF-".len() + 8);
        assert_ne!(a, b);
    }
}
