//! Database service for bulk-upload-service.

#![allow(clippy::too_many_arguments)]

use crate::models::{
    Connection, ExternalTransaction, Farmer, FarmerPlot, Invitation, Node, NodeType, Product,
    SupplyChain, Template, TemplateField, Upload, UploadStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::validation::FarmerRef;
use chrono::NaiveDate;
use platform_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Unique-violation SQLSTATE, used to map the per-node file-hash index
/// onto a 409.
const UNIQUE_VIOLATION: &str = "23505";

/// New-farmer fields assembled by the reconciliation adapter.
#[derive(Debug, Clone, Default)]
pub struct FarmerDraft {
    pub fair_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub identification_no: Option<String>,
}

/// External-transaction fields assembled by the reconciliation adapter.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub source_node_id: Uuid,
    pub destination_node_id: Uuid,
    pub supply_chain_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit: String,
    pub currency: String,
    pub price: Option<Decimal>,
    pub transaction_date: NaiveDate,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "bulk-upload-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Begin the top-level transaction for one reconciliation batch.
    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    // =========================================================================
    // Reference Lookups
    // =========================================================================

    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn get_node(&self, node_id: Uuid) -> Result<Option<Node>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_node"])
            .start_timer();

        let node = sqlx::query_as::<_, Node>(
            r#"
            SELECT node_id, name, node_type, trace_id, created_utc
            FROM nodes
            WHERE node_id = $1
            "#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get node: {}", e)))?;

        timer.observe_duration();
        Ok(node)
    }

    #[instrument(skip(self), fields(supply_chain_id = %supply_chain_id))]
    pub async fn get_supply_chain(
        &self,
        supply_chain_id: Uuid,
    ) -> Result<Option<SupplyChain>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_supply_chain"])
            .start_timer();

        let supply_chain = sqlx::query_as::<_, SupplyChain>(
            r#"
            SELECT supply_chain_id, name, created_utc
            FROM supply_chains
            WHERE supply_chain_id = $1
            "#,
        )
        .bind(supply_chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get supply chain: {}", e)))?;

        timer.observe_duration();
        Ok(supply_chain)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, supply_chain_id, name, created_utc
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get product: {}", e)))?;

        timer.observe_duration();
        Ok(product)
    }

    #[instrument(skip(self), fields(template_id = %template_id))]
    pub async fn get_template(&self, template_id: Uuid) -> Result<Option<Template>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_template"])
            .start_timer();

        let template = sqlx::query_as::<_, Template>(
            r#"
            SELECT template_id, node_id, name, adapter_kind, created_utc
            FROM templates
            WHERE template_id = $1
            "#,
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get template: {}", e)))?;

        timer.observe_duration();
        Ok(template)
    }

    #[instrument(skip(self), fields(template_id = %template_id))]
    pub async fn get_template_fields(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<TemplateField>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_template_fields"])
            .start_timer();

        let fields = sqlx::query_as::<_, TemplateField>(
            r#"
            SELECT field_id, template_id, column_index, field_key, field_type, required
            FROM template_fields
            WHERE template_id = $1
            ORDER BY column_index
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get template fields: {}", e))
        })?;

        timer.observe_duration();
        Ok(fields)
    }

    // =========================================================================
    // Upload Operations
    // =========================================================================

    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn create_upload(
        &self,
        node_id: Uuid,
        supply_chain_id: Uuid,
        template_id: Uuid,
        product_id: Uuid,
        unit: &str,
        currency: &str,
        file_name: &str,
        file_hash: &str,
    ) -> Result<Upload, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_upload"])
            .start_timer();

        let upload_id = Uuid::new_v4();

        let upload = sqlx::query_as::<_, Upload>(
            r#"
            INSERT INTO uploads (upload_id, node_id, supply_chain_id, template_id, product_id, unit, currency, file_name, file_hash, row_count, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10)
            RETURNING upload_id, node_id, supply_chain_id, template_id, product_id, unit, currency, file_name, file_hash, title_row_index, row_count, row_data, status, result, error_message, created_utc, updated_utc
            "#,
        )
        .bind(upload_id)
        .bind(node_id)
        .bind(supply_chain_id)
        .bind(template_id)
        .bind(product_id)
        .bind(unit)
        .bind(currency)
        .bind(file_name)
        .bind(file_hash)
        .bind(UploadStatus::New.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|d| d.code()) {
            Some(code) if code == UNIQUE_VIOLATION => AppError::Conflict(anyhow::anyhow!(
                "An identical file has already been uploaded for this node"
            )),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create upload: {}", e)),
        })?;

        timer.observe_duration();
        info!(upload_id = %upload.upload_id, "Upload created");

        Ok(upload)
    }

    #[instrument(skip(self), fields(node_id = %node_id, upload_id = %upload_id))]
    pub async fn get_upload(
        &self,
        node_id: Uuid,
        upload_id: Uuid,
    ) -> Result<Option<Upload>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_upload"])
            .start_timer();

        let upload = sqlx::query_as::<_, Upload>(
            r#"
            SELECT upload_id, node_id, supply_chain_id, template_id, product_id, unit, currency, file_name, file_hash, title_row_index, row_count, row_data, status, result, error_message, created_utc, updated_utc
            FROM uploads
            WHERE node_id = $1 AND upload_id = $2
            "#,
        )
        .bind(node_id)
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get upload: {}", e)))?;

        timer.observe_duration();
        Ok(upload)
    }

    /// Attach the validation pass output: title row anchor, processed row
    /// count, and the frozen per-row data. Transitions `new` to
    /// `validated`.
    #[instrument(skip(self, row_data), fields(upload_id = %upload_id))]
    pub async fn set_upload_validation(
        &self,
        upload_id: Uuid,
        title_row_index: i32,
        row_count: i32,
        row_data: &serde_json::Value,
    ) -> Result<Upload, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_upload_validation"])
            .start_timer();

        let upload = sqlx::query_as::<_, Upload>(
            r#"
            UPDATE uploads
            SET title_row_index = $2, row_count = $3, row_data = $4, status = $5, updated_utc = NOW()
            WHERE upload_id = $1
            RETURNING upload_id, node_id, supply_chain_id, template_id, product_id, unit, currency, file_name, file_hash, title_row_index, row_count, row_data, status, result, error_message, created_utc, updated_utc
            "#,
        )
        .bind(upload_id)
        .bind(title_row_index)
        .bind(row_count)
        .bind(row_data)
        .bind(UploadStatus::Validated.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to store validation data: {}", e))
        })?;

        timer.observe_duration();
        Ok(upload)
    }

    /// Guarded `validated -> used` transition. Returns `None` when the
    /// upload was not in `validated`, which is how a concurrent confirm
    /// loses the race.
    #[instrument(skip(self), fields(node_id = %node_id, upload_id = %upload_id))]
    pub async fn mark_upload_used(
        &self,
        node_id: Uuid,
        upload_id: Uuid,
    ) -> Result<Option<Upload>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_upload_used"])
            .start_timer();

        let upload = sqlx::query_as::<_, Upload>(
            r#"
            UPDATE uploads
            SET status = $3, updated_utc = NOW()
            WHERE node_id = $1 AND upload_id = $2 AND status = 'validated'
            RETURNING upload_id, node_id, supply_chain_id, template_id, product_id, unit, currency, file_name, file_hash, title_row_index, row_count, row_data, status, result, error_message, created_utc, updated_utc
            "#,
        )
        .bind(node_id)
        .bind(upload_id)
        .bind(UploadStatus::Used.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark upload used: {}", e)))?;

        timer.observe_duration();
        Ok(upload)
    }

    /// Undo a `mark_upload_used` when the job could not be enqueued.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn revert_upload_to_validated(&self, upload_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["revert_upload_to_validated"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE uploads
            SET status = $2, updated_utc = NOW()
            WHERE upload_id = $1 AND status = 'used'
            "#,
        )
        .bind(upload_id)
        .bind(UploadStatus::Validated.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to revert upload: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Persist the reconciliation summary produced by the worker.
    #[instrument(skip(self, result), fields(upload_id = %upload_id))]
    pub async fn set_upload_result(
        &self,
        upload_id: Uuid,
        result: &serde_json::Value,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_upload_result"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE uploads
            SET result = $2, error_message = NULL, updated_utc = NOW()
            WHERE upload_id = $1
            "#,
        )
        .bind(upload_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store result: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Record a job-level reconciliation failure on the upload.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn set_upload_error(&self, upload_id: Uuid, message: &str) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_upload_error"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE uploads
            SET error_message = $2, updated_utc = NOW()
            WHERE upload_id = $1
            "#,
        )
        .bind(upload_id)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to store error: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Validation Context Loaders
    // =========================================================================

    /// Fair-id lookup for every farmer the node manages in this supply
    /// chain. One query up front instead of one per farmer-id cell.
    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn load_farmers_by_fair_id(
        &self,
        node_id: Uuid,
        supply_chain_id: Uuid,
    ) -> Result<HashMap<String, FarmerRef>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_farmers_by_fair_id"])
            .start_timer();

        let rows = sqlx::query_as::<_, (String, Uuid, String, String)>(
            r#"
            SELECT fair_id, farmer_id, first_name, last_name
            FROM farmers
            WHERE managed_by = $1 AND supply_chain_id = $2
            "#,
        )
        .bind(node_id)
        .bind(supply_chain_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load farmers: {}", e)))?;

        timer.observe_duration();

        Ok(rows
            .into_iter()
            .map(|(fair_id, farmer_id, first_name, last_name)| {
                let name = format!("{} {}", first_name, last_name).trim().to_string();
                (fair_id, FarmerRef { farmer_id, name })
            })
            .collect())
    }

    /// Trace ids of every node connected to this node within the supply
    /// chain, on either side of the connection.
    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn load_connected_trace_ids(
        &self,
        node_id: Uuid,
        supply_chain_id: Uuid,
    ) -> Result<HashSet<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_connected_trace_ids"])
            .start_timer();

        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT n.trace_id
            FROM connections c
            JOIN nodes n
              ON n.node_id = CASE WHEN c.buyer_node_id = $1 THEN c.supplier_node_id ELSE c.buyer_node_id END
            WHERE c.supply_chain_id = $2
              AND (c.buyer_node_id = $1 OR c.supplier_node_id = $1)
            "#,
        )
        .bind(node_id)
        .bind(supply_chain_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load connected trace ids: {}", e))
        })?;

        timer.observe_duration();

        Ok(rows.into_iter().map(|(trace_id,)| trace_id).collect())
    }

    // =========================================================================
    // Duplicate Lookups
    // =========================================================================

    /// Exact-match duplicate check against persisted transactions. The
    /// quantity is compared as a canonical string to avoid float filter
    /// mismatch; the earliest created match is canonical.
    #[instrument(skip(self), fields(destination_node_id = %destination_node_id))]
    pub async fn find_duplicate_transaction(
        &self,
        destination_node_id: Uuid,
        product_id: Uuid,
        quantity: &str,
        transaction_date: NaiveDate,
    ) -> Result<Option<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_duplicate_transaction"])
            .start_timer();

        let found = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT transaction_id
            FROM external_transactions
            WHERE destination_node_id = $1
              AND product_id = $2
              AND quantity = $3::numeric
              AND transaction_date = $4
            ORDER BY created_utc
            LIMIT 1
            "#,
        )
        .bind(destination_node_id)
        .bind(product_id)
        .bind(quantity)
        .bind(transaction_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check duplicate transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(found.map(|(id,)| id))
    }

    /// Exact-match duplicate check against the node's managed farmers.
    #[instrument(skip(self), fields(managed_by = %managed_by))]
    pub async fn find_duplicate_farmer(
        &self,
        managed_by: Uuid,
        first_name: &str,
        last_name: &str,
        city: &str,
        province: &str,
        country: &str,
        identification_no: &str,
    ) -> Result<Option<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_duplicate_farmer"])
            .start_timer();

        let found = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT farmer_id
            FROM farmers
            WHERE managed_by = $1
              AND first_name = $2
              AND last_name = $3
              AND COALESCE(city, '') = $4
              AND COALESCE(province, '') = $5
              AND COALESCE(country, '') = $6
              AND COALESCE(identification_no, '') = $7
            ORDER BY created_utc
            LIMIT 1
            "#,
        )
        .bind(managed_by)
        .bind(first_name)
        .bind(last_name)
        .bind(city)
        .bind(province)
        .bind(country)
        .bind(identification_no)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check duplicate farmer: {}", e))
        })?;

        timer.observe_duration();
        Ok(found.map(|(id,)| id))
    }

    #[instrument(skip(self), fields(managed_by = %managed_by, farmer_id = %farmer_id))]
    pub async fn get_farmer(
        &self,
        managed_by: Uuid,
        farmer_id: Uuid,
    ) -> Result<Option<Farmer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_farmer"])
            .start_timer();

        let farmer = sqlx::query_as::<_, Farmer>(
            r#"
            SELECT farmer_id, node_id, managed_by, supply_chain_id, fair_id, first_name, last_name, phone, email, street, city, province, country, identification_no, created_upload_id, created_utc, updated_utc
            FROM farmers
            WHERE managed_by = $1 AND farmer_id = $2
            "#,
        )
        .bind(managed_by)
        .bind(farmer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get farmer: {}", e)))?;

        timer.observe_duration();
        Ok(farmer)
    }

    // =========================================================================
    // Reconciliation Writes (run inside the batch transaction)
    // =========================================================================

    /// Create the node row backing a new farmer.
    pub async fn insert_farmer_node(
        conn: &mut PgConnection,
        name: &str,
        trace_id: &str,
    ) -> Result<Node, AppError> {
        let node = sqlx::query_as::<_, Node>(
            r#"
            INSERT INTO nodes (node_id, name, node_type, trace_id)
            VALUES ($1, $2, $3, $4)
            RETURNING node_id, name, node_type, trace_id, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(NodeType::Farmer.as_str())
        .bind(trace_id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create farmer node: {}", e)))?;

        Ok(node)
    }

    pub async fn insert_farmer(
        conn: &mut PgConnection,
        node_id: Uuid,
        managed_by: Uuid,
        supply_chain_id: Uuid,
        created_upload_id: Uuid,
        draft: &FarmerDraft,
    ) -> Result<Farmer, AppError> {
        let farmer = sqlx::query_as::<_, Farmer>(
            r#"
            INSERT INTO farmers (farmer_id, node_id, managed_by, supply_chain_id, fair_id, first_name, last_name, phone, email, street, city, province, country, identification_no, created_upload_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING farmer_id, node_id, managed_by, supply_chain_id, fair_id, first_name, last_name, phone, email, street, city, province, country, identification_no, created_upload_id, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(node_id)
        .bind(managed_by)
        .bind(supply_chain_id)
        .bind(&draft.fair_id)
        .bind(&draft.first_name)
        .bind(&draft.last_name)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.street)
        .bind(&draft.city)
        .bind(&draft.province)
        .bind(&draft.country)
        .bind(&draft.identification_no)
        .bind(created_upload_id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create farmer: {}", e)))?;

        Ok(farmer)
    }

    /// Partial in-place update of an existing farmer; absent draft fields
    /// leave the stored values untouched.
    pub async fn update_farmer_partial(
        conn: &mut PgConnection,
        managed_by: Uuid,
        farmer_id: Uuid,
        draft: &FarmerDraft,
    ) -> Result<Option<Farmer>, AppError> {
        let first_name = (!draft.first_name.is_empty()).then_some(draft.first_name.as_str());
        let last_name = (!draft.last_name.is_empty()).then_some(draft.last_name.as_str());

        let farmer = sqlx::query_as::<_, Farmer>(
            r#"
            UPDATE farmers
            SET first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                phone = COALESCE($5, phone),
                email = COALESCE($6, email),
                street = COALESCE($7, street),
                city = COALESCE($8, city),
                province = COALESCE($9, province),
                country = COALESCE($10, country),
                identification_no = COALESCE($11, identification_no),
                updated_utc = NOW()
            WHERE managed_by = $1 AND farmer_id = $2
            RETURNING farmer_id, node_id, managed_by, supply_chain_id, fair_id, first_name, last_name, phone, email, street, city, province, country, identification_no, created_upload_id, created_utc, updated_utc
            "#,
        )
        .bind(managed_by)
        .bind(farmer_id)
        .bind(first_name)
        .bind(last_name)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.street)
        .bind(&draft.city)
        .bind(&draft.province)
        .bind(&draft.country)
        .bind(&draft.identification_no)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update farmer: {}", e)))?;

        Ok(farmer)
    }

    pub async fn insert_connection(
        conn: &mut PgConnection,
        supply_chain_id: Uuid,
        buyer_node_id: Uuid,
        supplier_node_id: Uuid,
    ) -> Result<Connection, AppError> {
        let connection = sqlx::query_as::<_, Connection>(
            r#"
            INSERT INTO connections (connection_id, supply_chain_id, buyer_node_id, supplier_node_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING connection_id, supply_chain_id, buyer_node_id, supplier_node_id, status, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(supply_chain_id)
        .bind(buyer_node_id)
        .bind(supplier_node_id)
        .bind(crate::models::ConnectionStatus::Pending.as_str())
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create connection: {}", e)))?;

        Ok(connection)
    }

    pub async fn insert_invitation(
        conn: &mut PgConnection,
        connection_id: Uuid,
        inviter_node_id: Uuid,
        invited_by: &str,
    ) -> Result<Invitation, AppError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (invitation_id, connection_id, inviter_node_id, invited_by)
            VALUES ($1, $2, $3, $4)
            RETURNING invitation_id, connection_id, inviter_node_id, invited_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(connection_id)
        .bind(inviter_node_id)
        .bind(invited_by)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invitation: {}", e)))?;

        Ok(invitation)
    }

    pub async fn insert_external_transaction(
        conn: &mut PgConnection,
        created_upload_id: Uuid,
        draft: &TransactionDraft,
    ) -> Result<ExternalTransaction, AppError> {
        let transaction = sqlx::query_as::<_, ExternalTransaction>(
            r#"
            INSERT INTO external_transactions (transaction_id, source_node_id, destination_node_id, supply_chain_id, product_id, quantity, unit, currency, price, transaction_date, created_upload_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING transaction_id, source_node_id, destination_node_id, supply_chain_id, product_id, quantity, unit, currency, price, transaction_date, created_upload_id, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.source_node_id)
        .bind(draft.destination_node_id)
        .bind(draft.supply_chain_id)
        .bind(draft.product_id)
        .bind(draft.quantity)
        .bind(&draft.unit)
        .bind(&draft.currency)
        .bind(draft.price)
        .bind(draft.transaction_date)
        .bind(created_upload_id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create transaction: {}", e)))?;

        Ok(transaction)
    }

    pub async fn insert_farmer_plot(
        conn: &mut PgConnection,
        farmer_id: Uuid,
        name: &str,
        area: Option<Decimal>,
    ) -> Result<FarmerPlot, AppError> {
        let plot = sqlx::query_as::<_, FarmerPlot>(
            r#"
            INSERT INTO farmer_plots (plot_id, farmer_id, name, area)
            VALUES ($1, $2, $3, $4)
            RETURNING plot_id, farmer_id, name, area, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(farmer_id)
        .bind(name)
        .bind(area)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create farmer plot: {}", e)))?;

        Ok(plot)
    }
}
