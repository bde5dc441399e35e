use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use cashflow_anomaly::server::{self, REQUEST_ID_HEADER, StatsResponse};
use cashflow_anomaly::{AppConfig, DetectorConfig};

async fn spawn_gateway(config: AppConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, config, std::future::pending()));
    format!("http://{}", addr)
}

fn rows(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let value = if i == 13 {
                750_000.0
            } else {
                100_000.0 + (i % 7) as f64 * 1_200.0
            };
            json!({ "date": format!("2024-03-{:02}", i % 30 + 1), "cashflow": value })
        })
        .collect()
}

#[tokio::test]
async fn test_generate_pdf_returns_attachment() {
    let base = spawn_gateway(AppConfig::default()).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/reports/generate-pdf"))
        .json(&rows(30))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(headers["content-type"], "application/pdf");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=anomaly_report.pdf"
    );
    assert!(headers.contains_key(REQUEST_ID_HEADER));

    let body = resp.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF"));
    assert!(lopdf::Document::load_mem(&body).is_ok());
}

#[tokio::test]
async fn test_missing_feature_column_is_500_with_detail() {
    let base = spawn_gateway(AppConfig::default()).await;
    let bad: Vec<Value> = (0..5)
        .map(|i| json!({ "date": format!("2024-03-{:02}", i + 1), "revenue": 10.0 }))
        .collect();
    let resp = reqwest::Client::new()
        .post(format!("{base}/reports/generate-pdf"))
        .json(&bad)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    let body: Value = resp.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Report generation failed: "), "{detail}");
    assert!(detail.contains("cashflow"));
}

#[tokio::test]
async fn test_single_row_is_500() {
    let base = spawn_gateway(AppConfig::default()).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/reports/generate-pdf"))
        .json(&rows(1))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let base = spawn_gateway(AppConfig::default()).await;
    let client = reqwest::Client::new();

    for body in ["not json", r#"{"cashflow": 1}"#] {
        let resp = client
            .post(format!("{base}/reports/generate-pdf"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid JSON"));
    }
}

#[tokio::test]
async fn test_detect_returns_report_json() {
    let config = AppConfig {
        detector: DetectorConfig::default().with_contamination(0.05),
        ..AppConfig::default()
    };
    let base = spawn_gateway(config).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/anomalies/detect"))
        .json(&rows(30))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["total_observations"], 30);
    assert_eq!(report["primary_feature"], "cashflow");
    assert_eq!(report["visualization"]["status"], "chart");

    let records = report["records"].as_array().unwrap();
    assert!(records.iter().any(|r| r["row"] == 13));
    for record in records {
        let severity = record["severity"].as_str().unwrap();
        assert!(["low", "medium", "high"].contains(&severity));
    }
}

#[tokio::test]
async fn test_health_stats_and_metrics() {
    let base = spawn_gateway(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "OK");

    let stats: StatsResponse = client
        .get(format!("{base}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats.feature_columns, vec!["cashflow".to_string()]);
    assert_eq!(stats.timestamp_column.as_deref(), Some("date"));
    assert_eq!(stats.contamination, 0.1);
    assert_eq!(stats.status, "operational");

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("cashflow_reports_total"));
    assert!(metrics.contains("cashflow_pipeline_duration_seconds"));
}
