//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tally_core::AnalyticsConfig;
use tempfile::TempDir;
use tower::ServiceExt;

const SALES_CSV: &str = "sales\n10\n12\n11\n13\n100\n12\n11\n";

fn shop_csv() -> String {
    let cost = [20, 21, 19, 20, 22, 21, 20, 19, 21, 20, 90, 20];
    let mut csv = String::from("revenue,cost\n");
    for (i, c) in cost.iter().enumerate() {
        csv.push_str(&format!("{},{}\n", 100 + 5 * i, c));
    }
    csv
}

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("sales.csv"), SALES_CSV).unwrap();
    std::fs::write(dir.path().join("shop.csv"), shop_csv()).unwrap();
    dir
}

fn setup_test_app(dir: &TempDir) -> Router {
    let engine = AnalyticsEngine::new(AnalyticsConfig::default()).unwrap();
    let config = ServerConfig {
        require_auth: false,
        ..Default::default()
    };
    create_router(engine, dir.path(), config)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ========== Advanced Analytics Tests ==========

#[tokio::test]
async fn test_anomaly_query() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({
                "query": "Anomali tespiti ve kritik içgörüler",
                "dataset": "sales"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["intent"], "insights");
    assert_eq!(json["ambiguous"], false);
    assert_eq!(json["dataset"], "sales");
    assert_eq!(json["chart"]["type"], "bar");
    assert_eq!(json["findings"][0]["row"], 4);
    assert_eq!(json["findings"][0]["severity"], "high");
    assert!(json["text"].as_str().unwrap().contains("sales, row 4"));
    assert!(json["session_id"].as_str().unwrap().starts_with("ses_"));
    assert!(json["caveats"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({ "query": "   ", "dataset": "sales" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Query must not be empty");
}

#[tokio::test]
async fn test_unknown_column_returns_suggestion() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({ "query": "forecast `revnue`", "dataset": "shop" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Unknown column: revnue");
    assert!(json["suggestion"].as_str().unwrap().contains("'revenue'"));
}

#[tokio::test]
async fn test_unknown_dataset() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({ "query": "overview", "dataset": "missing" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hint_alone_falls_back_to_comprehensive() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({
                "query": "Bu veriye bir bak",
                "analysis_type": "forecast",
                "dataset": "shop"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["intent"], "comprehensive");
    assert_eq!(json["ambiguous"], true);
    assert!(json["text"]
        .as_str()
        .unwrap()
        .contains("Dataset shop: 12 rows and 2 columns"));
}

#[tokio::test]
async fn test_follow_up_uses_session_history() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .clone()
        .oneshot(post_json("/api/session", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = get_body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({
                "query": "revenue forecast",
                "dataset": "shop",
                "session_id": session_id
            }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["intent"], "forecast");
    assert_eq!(json["findings"][0]["column"], "revenue");
    assert_eq!(json["chart"]["type"], "line");

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/advanced-analytics",
            serde_json::json!({
                "query": "and cost?",
                "dataset": "shop",
                "session_id": session_id
            }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["intent"], "forecast");
    assert_eq!(json["findings"][0]["column"], "cost");
    assert_eq!(json["session_id"], session_id.as_str());

    let response = app
        .oneshot(get(&format!("/api/session/{}", session_id)))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["turn_count"], 2);
    assert_eq!(json["last_intent"], "forecast");
}

// ========== Session Tests ==========

#[tokio::test]
async fn test_delete_session() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app
        .clone()
        .oneshot(post_json("/api/session", serde_json::json!({})))
        .await
        .unwrap();
    let session_id = get_body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/session/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["deleted"], true);

    let response = app
        .oneshot(get(&format!("/api/session/{}", session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Status and Dataset Tests ==========

#[tokio::test]
async fn test_system_status() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app.oneshot(get("/api/system-status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["core_system"], true);
    assert_eq!(json["smart_intent"], true);
    assert_eq!(json["anomaly_detection"], true);
    assert_eq!(json["trend_forecast"], true);
    assert_eq!(json["segmentation"], true);
    assert_eq!(json["recommendations"], true);
    assert_eq!(json["data_files"], serde_json::json!(["sales", "shop"]));
    assert!(chrono::DateTime::parse_from_rfc3339(json["last_updated"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_status_reflects_disabled_modules() {
    let dir = data_dir();
    let mut analytics = AnalyticsConfig::default();
    analytics.modules.segmentation = false;
    let engine = AnalyticsEngine::new(analytics).unwrap();
    let config = ServerConfig {
        require_auth: false,
        ..Default::default()
    };
    let app = create_router(engine, dir.path(), config);

    let response = app.oneshot(get("/api/system-status")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["segmentation"], false);
    assert_eq!(json["anomaly_detection"], true);
}

#[tokio::test]
async fn test_list_datasets() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app.oneshot(get("/api/datasets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let datasets = json.as_array().unwrap();
    assert_eq!(datasets.len(), 2);
    assert_eq!(datasets[0]["name"], "sales");
    assert_eq!(datasets[0]["file"], "sales.csv");
    assert_eq!(datasets[0]["size_bytes"], SALES_CSV.len() as u64);
}

#[tokio::test]
async fn test_data_insights() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app.oneshot(get("/api/data-insights/shop")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["filename"], "shop");
    assert_eq!(json["analysis_summary"]["rows"], 12);
    assert_eq!(json["analysis_summary"]["columns"], 2);
    assert!(!json["insights"].as_array().unwrap().is_empty());
    assert!(json["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "Forecast revenue for the next 3 periods"));
}

#[tokio::test]
async fn test_data_insights_not_found() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app.oneshot(get("/api/data-insights/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Authentication Tests ==========

fn setup_auth_app(dir: &TempDir) -> Router {
    let engine = AnalyticsEngine::new(AnalyticsConfig::default()).unwrap();
    let config = ServerConfig {
        require_auth: true,
        api_keys: vec!["secret-key".to_string()],
        ..Default::default()
    };
    create_router(engine, dir.path(), config)
}

#[tokio::test]
async fn test_auth_required() {
    let dir = data_dir();
    let app = setup_auth_app(&dir);

    let response = app.oneshot(get("/api/system-status")).await.unwrap();

    // Should get 401 without an API key
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_with_api_key() {
    let dir = data_dir();
    let app = setup_auth_app(&dir);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/system-status")
                .header("authorization", "Bearer secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_wrong_api_key() {
    let dir = data_dir();
    let app = setup_auth_app(&dir);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/system-status")
                .header("authorization", "Bearer secret-kez")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_security_headers() {
    let dir = data_dir();
    let app = setup_test_app(&dir);

    let response = app.oneshot(get("/api/datasets")).await.unwrap();
    let headers = response.headers();
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
}

#[test]
fn test_parse_api_keys() {
    assert_eq!(parse_api_keys("a, b,,c "), vec!["a", "b", "c"]);
    assert!(parse_api_keys("").is_empty());
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["secret-key".to_string()];
    assert!(validate_api_key("secret-key", &keys));
    assert!(!validate_api_key("secret", &keys));
    assert!(!validate_api_key("secret-key", &[]));
}
