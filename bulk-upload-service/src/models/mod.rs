//! Domain models for bulk-upload-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Upload Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    New,
    Validated,
    Used,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Validated => "validated",
            Self::Used => "used",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "validated" => Self::Validated,
            "used" => Self::Used,
            _ => Self::New,
        }
    }
}

/// One submitted spreadsheet against a template. The frozen validated row
/// data lives in `row_data`; once written it is never re-validated, the
/// detector and the reconciliation adapter both consume the same tuples.
#[derive(Debug, Clone, FromRow)]
pub struct Upload {
    pub upload_id: Uuid,
    pub node_id: Uuid,
    pub supply_chain_id: Uuid,
    pub template_id: Uuid,
    pub product_id: Uuid,
    pub unit: String,
    pub currency: String,
    pub file_name: String,
    pub file_hash: String,
    pub title_row_index: Option<i32>,
    pub row_count: i32,
    pub row_data: Option<serde_json::Value>,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Post-commit summary persisted on the upload by the reconciliation
/// worker. `errors` is keyed by data-row index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResult {
    pub farmers_added: i32,
    pub farmers_updated: i32,
    pub transactions_added: i32,
    pub plots_added: i32,
    pub errors: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Node / Supply Chain Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Company,
    Farmer,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Farmer => "farmer",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "farmer" => Self::Farmer,
            _ => Self::Company,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Node {
    pub node_id: Uuid,
    pub name: String,
    pub node_type: String,
    pub trace_id: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SupplyChain {
    pub supply_chain_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub supply_chain_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Template Models
// ============================================================================

/// Which reconciliation adapter a template drives: connection-only
/// onboarding sheets, or sheets that also carry transaction columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Connection,
    Transaction,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Transaction => "transaction",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "transaction" => Self::Transaction,
            _ => Self::Connection,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Template {
    pub template_id: Uuid,
    pub node_id: Uuid,
    pub name: String,
    pub adapter_kind: String,
    pub created_utc: DateTime<Utc>,
}

/// Raw column binding as stored; `field_key`/`field_type` are parsed into
/// typed bindings before any row is validated.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateField {
    pub field_id: Uuid,
    pub template_id: Uuid,
    pub column_index: i32,
    pub field_key: String,
    pub field_type: String,
    pub required: bool,
}

// ============================================================================
// Farmer / Connection Models
// ============================================================================

/// Farmer profile. Every farmer is also a node (`node_id` points at its
/// own `nodes` row); `managed_by` is the company node that onboarded it.
#[derive(Debug, Clone, FromRow)]
pub struct Farmer {
    pub farmer_id: Uuid,
    pub node_id: Uuid,
    pub managed_by: Uuid,
    pub supply_chain_id: Uuid,
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
    pub created_upload_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Pending,
    Active,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            _ => Self::Pending,
        }
    }
}

/// Buyer-supplier edge between two nodes within one supply chain.
#[derive(Debug, Clone, FromRow)]
pub struct Connection {
    pub connection_id: Uuid,
    pub supply_chain_id: Uuid,
    pub buyer_node_id: Uuid,
    pub supplier_node_id: Uuid,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub connection_id: Uuid,
    pub inviter_node_id: Uuid,
    pub invited_by: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Transaction Models
// ============================================================================

/// Product quantity transferred between two distinct nodes.
#[derive(Debug, Clone, FromRow)]
pub struct ExternalTransaction {
    pub transaction_id: Uuid,
    pub source_node_id: Uuid,
    pub destination_node_id: Uuid,
    pub supply_chain_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit: String,
    pub currency: String,
    pub price: Option<Decimal>,
    pub transaction_date: NaiveDate,
    pub created_upload_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FarmerPlot {
    pub plot_id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub area: Option<Decimal>,
    pub created_utc: DateTime<Utc>,
}
