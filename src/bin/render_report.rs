//! render-report: offline detection + PDF report from a JSON rows file
//!
//! Usage:
//!   render-report --input rows.json --output report.pdf
//!   render-report -i rows.json -o report.pdf --company "Acme" --contamination 0.05

use clap::Parser;
use serde_json::Value as Json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use cashflow_anomaly::report::analysis_period;
use cashflow_anomaly::{
    AnomalyDetector, AppConfig, CompanyInfo, PipelineError, ReportRenderer, ingest,
};

#[derive(Parser)]
#[command(name = "render-report")]
#[command(about = "Detect anomalies in a JSON row file and write a PDF report")]
struct Cli {
    /// JSON array of row objects
    #[arg(short, long)]
    input: PathBuf,

    /// Destination PDF path
    #[arg(short, long)]
    output: PathBuf,

    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Company name printed on the report
    #[arg(long)]
    company: Option<String>,

    /// Analysis period text (defaults to the timestamp range)
    #[arg(long)]
    period: Option<String>,

    /// Expected anomaly fraction in (0, 0.5]
    #[arg(long)]
    contamination: Option<f64>,

    /// Feature column (repeatable)
    #[arg(short, long = "feature")]
    features: Vec<String>,

    /// Timestamp column
    #[arg(short, long)]
    timestamp: Option<String>,
}

fn run(cli: Cli) -> cashflow_anomaly::Result<usize> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(c) = cli.contamination {
        config.detector.contamination = c;
    }
    if !cli.features.is_empty() {
        config.server.feature_columns = cli.features;
    }
    if let Some(ts) = cli.timestamp {
        config.server.timestamp_column = Some(ts);
    }

    let raw = std::fs::read(&cli.input).map_err(|e| {
        PipelineError::invalid_input(format!("{}: {}", cli.input.display(), e))
    })?;
    let rows: Vec<Json> = serde_json::from_slice(&raw).map_err(|e| {
        PipelineError::invalid_input(format!("{}: {}", cli.input.display(), e))
    })?;

    let features = &config.server.feature_columns;
    let ts = config.server.timestamp_column.as_deref();
    let batch = ingest(&rows, features, ts)?;
    let report = AnomalyDetector::new(config.detector.clone()).detect(&batch, features, ts)?;

    let company = CompanyInfo::new(
        cli.company.unwrap_or(config.server.company_name.clone()),
        cli.period.unwrap_or_else(|| analysis_period(&batch, ts)),
    );
    ReportRenderer::new(config.render).render_to_path(&report, &company, &cli.output)?;
    Ok(report.anomaly_count())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let output = cli.output.clone();
    match run(cli) {
        Ok(anomalies) => {
            info!(path = %output.display(), anomalies, "Report generated.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Report generation failed.");
            ExitCode::FAILURE
        }
    }
}
