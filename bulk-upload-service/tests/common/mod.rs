//! Common test utilities for bulk-upload-service integration tests.

// Each integration test binary compiles this module separately and uses
// a different subset of the helpers.
#![allow(dead_code)]

use bulk_upload_service::config::{
    BulkUploadConfig, DatabaseConfig, UploadConfig, WorkerConfig,
};
use bulk_upload_service::services::Database;
use bulk_upload_service::startup::Application;
use platform_core::config::Config as CommonConfig;
use std::sync::Once;
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,bulk_upload_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> BulkUploadConfig {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests");

    BulkUploadConfig {
        common: CommonConfig {
            port: 0,
            environment: "test".to_string(),
        },
        service_name: "bulk-upload-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 4,
            min_connections: 1,
        },
        worker: WorkerConfig {
            enabled: true,
            worker_count: 1,
            queue_size: 16,
        },
        upload: UploadConfig {
            max_file_bytes: 1024 * 1024,
        },
    }
}

/// Test application wrapper. Every spawn seeds its own company node,
/// supply chain, and product, so tests never observe each other's data.
#[allow(dead_code)]
pub struct TestApp {
    pub client: reqwest::Client,
    pub base_url: String,
    pub db: Database,
    pub node_id: Uuid,
    pub supply_chain_id: Uuid,
    pub product_id: Uuid,
    pub user_id: String,
}

pub async fn spawn_app() -> TestApp {
    init_tracing();

    let config = test_config();

    // Migrations are idempotent and guarded by an advisory lock, so
    // concurrent test binaries can share one database.
    let app = Application::build(config)
        .await
        .expect("Failed to build application");

    let http_port = app.http_port();
    let db = app.db().clone();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let base_url = format!("http://127.0.0.1:{}", http_port);
    let client = reqwest::Client::new();

    // Wait for the server to accept connections.
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", base_url)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server did not come up after 20 attempts: {}", e),
        }
    }

    let node_id = seed_node(&db, "Test Trading Co", "company").await;
    let supply_chain_id = seed_supply_chain(&db, "Cocoa").await;
    let product_id = seed_product(&db, supply_chain_id, "Cocoa beans").await;

    TestApp {
        client,
        base_url,
        db,
        node_id,
        supply_chain_id,
        product_id,
        user_id: "test-user".to_string(),
    }
}

impl TestApp {
    /// POST a spreadsheet through the upload endpoint with the standard
    /// context headers.
    pub async fn upload(
        &self,
        template_id: Uuid,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> reqwest::Response {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            )
            .text("supply_chain", self.supply_chain_id.to_string())
            .text("template", template_id.to_string())
            .text("product", self.product_id.to_string())
            .text("unit", "kg")
            .text("currency", "EUR");

        self.client
            .post(format!("{}/uploads", self.base_url))
            .header("X-Node-ID", self.node_id.to_string())
            .header("X-User-ID", &self.user_id)
            .multipart(form)
            .send()
            .await
            .expect("upload request failed")
    }

    pub async fn confirm(&self, upload_id: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/uploads/{}/confirm", self.base_url, upload_id))
            .header("X-Node-ID", self.node_id.to_string())
            .header("X-User-ID", &self.user_id)
            .send()
            .await
            .expect("confirm request failed")
    }

    /// Poll the result endpoint until the worker reports completion.
    pub async fn wait_for_result(&self, upload_id: &str) -> serde_json::Value {
        for _ in 0..50 {
            let body: serde_json::Value = self
                .client
                .get(format!("{}/uploads/{}/result", self.base_url, upload_id))
                .header("X-Node-ID", self.node_id.to_string())
                .send()
                .await
                .expect("result request failed")
                .json()
                .await
                .expect("result body was not json");

            if body["completed"].as_bool() == Some(true) || body["error_message"].is_string() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("reconciliation did not complete in time");
    }
}

// ============================================================================
// Seed Helpers
// ============================================================================

pub async fn seed_node(db: &Database, name: &str, node_type: &str) -> Uuid {
    let node_id = Uuid::new_v4();
    sqlx::query("INSERT INTO nodes (node_id, name, node_type, trace_id) VALUES ($1, $2, $3, $4)")
        .bind(node_id)
        .bind(name)
        .bind(node_type)
        .bind(format!("FT-{}", &node_id.simple().to_string()[..8]))
        .execute(db.pool())
        .await
        .expect("failed to seed node");
    node_id
}

pub async fn seed_supply_chain(db: &Database, name: &str) -> Uuid {
    let supply_chain_id = Uuid::new_v4();
    sqlx::query("INSERT INTO supply_chains (supply_chain_id, name) VALUES ($1, $2)")
        .bind(supply_chain_id)
        .bind(name)
        .execute(db.pool())
        .await
        .expect("failed to seed supply chain");
    supply_chain_id
}

pub async fn seed_product(db: &Database, supply_chain_id: Uuid, name: &str) -> Uuid {
    let product_id = Uuid::new_v4();
    sqlx::query("INSERT INTO products (product_id, supply_chain_id, name) VALUES ($1, $2, $3)")
        .bind(product_id)
        .bind(supply_chain_id)
        .bind(name)
        .execute(db.pool())
        .await
        .expect("failed to seed product");
    product_id
}

/// Seed a template with `(column, field_key, field_type, required)`
/// bindings.
pub async fn seed_template(
    db: &Database,
    node_id: Uuid,
    adapter_kind: &str,
    fields: &[(i32, &str, &str, bool)],
) -> Uuid {
    let template_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO templates (template_id, node_id, name, adapter_kind) VALUES ($1, $2, $3, $4)",
    )
    .bind(template_id)
    .bind(node_id)
    .bind("test template")
    .bind(adapter_kind)
    .execute(db.pool())
    .await
    .expect("failed to seed template");

    for (column_index, field_key, field_type, required) in fields {
        sqlx::query(
            "INSERT INTO template_fields (field_id, template_id, column_index, field_key, field_type, required) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(template_id)
        .bind(column_index)
        .bind(field_key)
        .bind(field_type)
        .bind(required)
        .execute(db.pool())
        .await
        .expect("failed to seed template field");
    }

    template_id
}

/// Seed a farmer (with its backing node) managed by `managed_by`.
/// Returns `(farmer_id, fair_id)`.
pub async fn seed_farmer(
    db: &Database,
    managed_by: Uuid,
    supply_chain_id: Uuid,
    first_name: &str,
    last_name: &str,
) -> (Uuid, String) {
    let farmer_node = seed_node(db, &format!("{} {}", first_name, last_name), "farmer").await;
    let farmer_id = Uuid::new_v4();
    let fair_id = format!("FF-{}", &farmer_id.simple().to_string()[..8]);

    sqlx::query(
        "INSERT INTO farmers (farmer_id, node_id, managed_by, supply_chain_id, fair_id, first_name, last_name) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(farmer_id)
    .bind(farmer_node)
    .bind(managed_by)
    .bind(supply_chain_id)
    .bind(&fair_id)
    .bind(first_name)
    .bind(last_name)
    .execute(db.pool())
    .await
    .expect("failed to seed farmer");

    (farmer_id, fair_id)
}

pub async fn seed_connection(
    db: &Database,
    supply_chain_id: Uuid,
    buyer_node_id: Uuid,
    supplier_node_id: Uuid,
) -> Uuid {
    let connection_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO connections (connection_id, supply_chain_id, buyer_node_id, supplier_node_id, status) VALUES ($1, $2, $3, $4, 'active')",
    )
    .bind(connection_id)
    .bind(supply_chain_id)
    .bind(buyer_node_id)
    .bind(supplier_node_id)
    .execute(db.pool())
    .await
    .expect("failed to seed connection");
    connection_id
}
