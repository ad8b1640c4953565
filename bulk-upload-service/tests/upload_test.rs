//! Integration tests for upload creation and the validation preview.

mod common;

use common::{seed_template, spawn_app};

const FARMER_SHEET: &str = "\
First name,Last name,City,Country\n\
Anjuna,X,Kumasi,Ghana\n\
Kofi,Mensah,Accra,Ghana\n";

fn farmer_fields() -> Vec<(i32, &'static str, &'static str, bool)> {
    vec![
        (0, "first_name", "text", true),
        (1, "last_name", "text", true),
        (2, "city", "text", false),
        (3, "country", "country", false),
    ]
}

#[tokio::test]
async fn upload_returns_row_level_preview() {
    let app = spawn_app().await;
    let template = seed_template(&app.db, app.node_id, "connection", &farmer_fields()).await;

    let response = app
        .upload(template, "farmers.csv", FARMER_SHEET.as_bytes().to_vec())
        .await;

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["count"], 2);
    assert_eq!(body["valid"], true);
    assert_eq!(body["product"]["name"], "Cocoa beans");

    let rows = body["row_data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row["valid"], true);
        assert_eq!(row["issue_count"], 0);
        assert_eq!(row["is_duplicate"], false);
    }
    assert_eq!(rows[0]["fields"][0]["value"], "Anjuna");
}

#[tokio::test]
async fn identical_file_is_rejected_for_the_same_node() {
    let app = spawn_app().await;
    let template = seed_template(&app.db, app.node_id, "connection", &farmer_fields()).await;

    let first = app
        .upload(template, "farmers.csv", FARMER_SHEET.as_bytes().to_vec())
        .await;
    assert_eq!(first.status(), 201);

    // Same bytes, same node: rejected before any row-level processing.
    let second = app
        .upload(template, "farmers.csv", FARMER_SHEET.as_bytes().to_vec())
        .await;
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn missing_node_header_is_unauthorized() {
    let app = spawn_app().await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(FARMER_SHEET.as_bytes().to_vec())
            .file_name("farmers.csv"),
    );

    let response = app
        .client
        .post(format!("{}/uploads", app.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn upload_without_file_is_a_bad_request() {
    let app = spawn_app().await;
    let template = seed_template(&app.db, app.node_id, "connection", &farmer_fields()).await;

    let form = reqwest::multipart::Form::new()
        .text("supply_chain", app.supply_chain_id.to_string())
        .text("template", template.to_string())
        .text("product", app.product_id.to_string());

    let response = app
        .client
        .post(format!("{}/uploads", app.base_url))
        .header("X-Node-ID", app.node_id.to_string())
        .header("X-User-ID", &app.user_id)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn empty_sheet_is_a_bad_request() {
    let app = spawn_app().await;
    let template = seed_template(&app.db, app.node_id, "connection", &farmer_fields()).await;

    let response = app
        .upload(template, "farmers.csv", b",,,\n,,,\n".to_vec())
        .await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn template_binding_past_sheet_width_is_incorrect_linking() {
    let app = spawn_app().await;
    // Column 9 does not exist in a four-column sheet.
    let template = seed_template(
        &app.db,
        app.node_id,
        "connection",
        &[(9, "first_name", "text", true)],
    )
    .await;

    let response = app
        .upload(template, "farmers.csv", FARMER_SHEET.as_bytes().to_vec())
        .await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Incorrect linking of template fields"));
}

#[tokio::test]
async fn get_upload_returns_the_frozen_row_data() {
    let app = spawn_app().await;
    let template = seed_template(&app.db, app.node_id, "connection", &farmer_fields()).await;

    let created: serde_json::Value = app
        .upload(template, "farmers.csv", FARMER_SHEET.as_bytes().to_vec())
        .await
        .json()
        .await
        .unwrap();
    let upload_id = created["id"].as_str().unwrap().to_string();

    let response = app
        .client
        .get(format!("{}/uploads/{}", app.base_url, upload_id))
        .header("X-Node-ID", app.node_id.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "validated");
    assert_eq!(body["row_count"], 2);
    // The stored rows are exactly what the preview returned.
    assert_eq!(body["row_data"], created["row_data"]);
}
