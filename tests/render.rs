use chrono::NaiveDate;
use lopdf::Document;
use serde_json::{Value, json};

use cashflow_anomaly::render::TABLE_HEADER;
use cashflow_anomaly::{
    AnomalyDetector, AnomalyReport, CompanyInfo, DetectorConfig, PipelineError, RenderConfig,
    ReportRenderer,
};

fn frozen() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 14).unwrap()
}

fn company() -> CompanyInfo {
    CompanyInfo::new("Demo Corp", "2024-01-01 – 2024-04-09")
}

fn rows(n: usize, spikes: &[usize]) -> Vec<Value> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..n)
        .map(|i| {
            let base = 100_000.0 + ((i * 37) % 11) as f64 * 900.0;
            let value = if spikes.contains(&i) { base * 4.0 } else { base };
            let date = start + chrono::Duration::days(i as i64);
            json!({ "date": date.to_string(), "cashflow": value })
        })
        .collect()
}

fn detect(rows: &[Value], contamination: f64) -> AnomalyReport {
    AnomalyDetector::new(DetectorConfig::default().with_contamination(contamination))
        .detect_rows(rows, &["cashflow".to_string()], Some("date"))
        .unwrap()
}

fn text_of(pdf: &[u8]) -> (usize, String) {
    let doc = Document::load_mem(pdf).unwrap();
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    (pages.len(), doc.extract_text(&pages).unwrap())
}

#[test]
fn test_sections_in_order() {
    let report = detect(&rows(100, &[10, 40, 70]), 0.03);
    assert!(!report.is_empty());
    let pdf = ReportRenderer::default()
        .render_at(&report, &company(), frozen())
        .unwrap();
    let (pages, text) = text_of(&pdf);
    assert_eq!(pages, 1);

    let needles: Vec<String> = vec![
        "Anomaly Analysis Report".to_string(),
        "Company: Demo Corp".to_string(),
        "Analysis period: 2024-01-01 – 2024-04-09".to_string(),
        "Report date: 14/07/2024".to_string(),
        "Anomaly summary".to_string(),
        format!("- Total anomalies: {}", report.anomaly_count()),
        format!("- Anomaly rate: {:.2}%", report.anomaly_rate * 100.0),
        "Anomaly details".to_string(),
        TABLE_HEADER[0].to_string(),
        TABLE_HEADER[3].to_string(),
    ];
    let positions: Vec<usize> = needles
        .iter()
        .map(|needle| {
            text.find(needle.as_str())
                .unwrap_or_else(|| panic!("missing {needle:?} in {text}"))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert!(!text.contains("No anomalies detected."));
    for record in &report.records {
        assert!(text.contains(&format!("{:.4}", record.anomaly_score)));
    }
}

#[test]
fn test_values_use_thousands_separators() {
    let report = detect(&rows(50, &[25]), 0.02);
    let spiked = report.records.iter().find(|r| r.row == 25).expect("spike flagged");
    let pdf = ReportRenderer::default()
        .render_at(&report, &company(), frozen())
        .unwrap();
    let (_, text) = text_of(&pdf);

    let value = spiked.primary_value.unwrap();
    let whole = value.trunc() as u64;
    let expected = format!("{},{:03}.", whole / 1000, whole % 1000);
    assert!(text.contains(&expected), "{expected} not in {text}");
    assert!(text.contains("2024-01-26"));
}

#[test]
fn test_rendering_is_deterministic() {
    let report = detect(&rows(100, &[5, 55]), 0.05);
    let renderer = ReportRenderer::default();
    let a = renderer.render_at(&report, &company(), frozen()).unwrap();
    let b = renderer.render_at(&report, &company(), frozen()).unwrap();
    assert_eq!(a, b);

    let later = renderer
        .render_at(&report, &company(), frozen().succ_opt().unwrap())
        .unwrap();
    assert_ne!(a, later);
}

#[test]
fn test_no_anomalies_replaces_table() {
    let detected = detect(&rows(30, &[]), 0.05);
    let report = AnomalyReport::new(
        Vec::new(),
        detected.total_observations,
        detected.primary_feature.clone(),
        detected.timestamp_column.clone(),
        detected.visualization.clone(),
    );
    let pdf = ReportRenderer::default()
        .render_at(&report, &company(), frozen())
        .unwrap();
    let (_, text) = text_of(&pdf);

    assert!(text.contains("No anomalies detected."));
    assert!(text.contains("- Total anomalies: 0"));
    assert!(text.contains("- Anomaly rate: 0.00%"));
    assert!(!text.contains("Anomaly details"));
    assert!(!text.contains(TABLE_HEADER[3]));

    // No table means no filled cell rectangles
    let doc = Document::load_mem(&pdf).unwrap();
    let page = *doc.get_pages().values().next().unwrap();
    let content = doc.get_and_decode_page_content(page).unwrap();
    assert!(content.operations.iter().all(|op| op.operator != "re"));
}

#[test]
fn test_long_table_paginates_with_header() {
    let spikes: Vec<usize> = (0..400).step_by(4).collect();
    let report = detect(&rows(400, &spikes), 0.25);
    assert!(report.anomaly_count() > 60);

    let pdf = ReportRenderer::default()
        .render_at(&report, &company(), frozen())
        .unwrap();
    let doc = Document::load_mem(&pdf).unwrap();
    let pages = doc.get_pages();
    assert!(pages.len() > 1);

    for number in pages.keys() {
        let text = doc.extract_text(&[*number]).unwrap();
        assert!(text.contains(TABLE_HEADER[3]), "page {number} lacks header");
    }
}

#[test]
fn test_custom_title_and_unencodable_text() {
    let report = detect(&rows(20, &[3]), 0.05);
    let renderer = ReportRenderer::new(RenderConfig {
        title: "Rapport d'anomalies 📄".to_string(),
        ..RenderConfig::default()
    });
    let pdf = renderer
        .render_at(&report, &CompanyInfo::new("Société Générale", ""), frozen())
        .unwrap();
    let (_, text) = text_of(&pdf);
    assert!(text.contains("Rapport d'anomalies ?"));
    assert!(text.contains("Company: Société Générale"));
    assert!(text.contains("Analysis period: N/A"));
}

#[test]
fn test_render_to_path_writes_complete_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    let report = detect(&rows(40, &[12]), 0.05);

    ReportRenderer::default()
        .render_to_path(&report, &company(), &path)
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert!(Document::load_mem(&bytes).is_ok());
    // Only the persisted report remains, no temp files
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_render_to_missing_directory_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("report.pdf");
    let report = detect(&rows(40, &[12]), 0.05);

    let err = ReportRenderer::default()
        .render_to_path(&report, &company(), &path)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Render(_)));
    assert!(!path.exists());
}
