//! report-gateway: HTTP front end for anomaly detection and PDF reports
//!
//! Usage:
//!   report-gateway
//!   report-gateway --config gateway.json --port 8080
//!   report-gateway --contamination 0.05 --feature cashflow --feature fees

use clap::Parser;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::{error, info};

use cashflow_anomaly::{AppConfig, server};

#[derive(Parser)]
#[command(name = "report-gateway")]
#[command(about = "Anomaly detection and PDF report service")]
struct Cli {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<String>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Expected anomaly fraction in (0, 0.5]
    #[arg(long)]
    contamination: Option<f64>,

    /// Feature column (repeatable, first one is charted and tabulated)
    #[arg(short, long = "feature")]
    features: Vec<String>,

    /// Timestamp column
    #[arg(short, long)]
    timestamp: Option<String>,

    /// Company name printed on reports
    #[arg(long)]
    company: Option<String>,
}

impl Cli {
    fn load_config(&self) -> cashflow_anomaly::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(c) = self.contamination {
            config.detector.contamination = c;
        }
        if !self.features.is_empty() {
            config.server.feature_columns = self.features.clone();
        }
        if let Some(ts) = &self.timestamp {
            config.server.timestamp_column = Some(ts.clone());
        }
        if let Some(company) = &self.company {
            config.server.company_name = company.clone();
        }
        config.detector.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.load_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration.");
            return ExitCode::FAILURE;
        }
    };

    info!(
        features = ?config.server.feature_columns,
        timestamp = ?config.server.timestamp_column,
        contamination = config.detector.contamination,
        estimators = config.detector.n_estimators,
        "Detector configured."
    );

    let addr = config.server.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr, error = %e, "Failed to bind.");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler.");
            std::future::pending::<()>().await;
        }
        info!("Shutting down... (Waiting for in-flight reports)");
    };

    if let Err(e) = server::serve(listener, config, shutdown).await {
        error!(error = %e, "Server crash.");
        return ExitCode::FAILURE;
    }
    info!("Goodbye.");
    ExitCode::SUCCESS
}
