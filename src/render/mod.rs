//! PDF Report Renderer
//!
//! Turns an `AnomalyReport` plus company metadata into a paginated A4
//! document with a fixed section order:
//! 1. Title
//! 2. Company, analysis period, generation date
//! 3. Summary: anomaly count and rate
//! 4. Detail table, or the no-anomalies sentence when nothing was flagged
//!
//! Output bytes depend only on the inputs and the generation date: objects
//! are written in id order, content streams are left uncompressed and the
//! trailer `/ID` is a hash of the content.

mod fonts;
pub mod format;
mod layout;

use chrono::{Local, NaiveDate};
use lopdf::content::Content;
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use std::io::Write as _;
use std::path::Path;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_128;

use crate::config::RenderConfig;
use crate::error::{PipelineError, Result};
use crate::report::{AnomalyReport, CompanyInfo};

pub use fonts::{Font, encode_win_ansi};
use layout::{Align, PAGE_HEIGHT, PAGE_WIDTH, PageBuilder, Table};

pub const TABLE_HEADER: [&str; 4] = ["Date", "Value", "Score", "Severity"];

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 10.0;
const SECTION_GAP: f32 = 12.0;
const REPORT_DATE_FORMAT: &str = "%d/%m/%Y";
const PRODUCER: &str = concat!("cashflow-anomaly ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default)]
pub struct ReportRenderer {
    config: RenderConfig,
}

impl ReportRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render with today's local date as the generation date
    pub fn render(&self, report: &AnomalyReport, company: &CompanyInfo) -> Result<Vec<u8>> {
        self.render_at(report, company, Local::now().date_naive())
    }

    /// Render with an explicit generation date
    pub fn render_at(
        &self,
        report: &AnomalyReport,
        company: &CompanyInfo,
        date: NaiveDate,
    ) -> Result<Vec<u8>> {
        let pages = self.compose(report, company, &report_date(date));
        let page_count = pages.len();
        let bytes = assemble(pages, &self.config.title, date)?;
        debug!(
            pages = page_count,
            bytes = bytes.len(),
            anomalies = report.anomaly_count(),
            "Rendered report."
        );
        Ok(bytes)
    }

    /// Render and write to `path` atomically: a temp file in the target
    /// directory is persisted over `path` only once fully written.
    pub fn render_to_path(
        &self,
        report: &AnomalyReport,
        company: &CompanyInfo,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.render(report, company)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PipelineError::from(e.error))?;

        info!(path = %path.display(), bytes = bytes.len(), "Report written.");
        Ok(())
    }

    fn compose(
        &self,
        report: &AnomalyReport,
        company: &CompanyInfo,
        generated: &str,
    ) -> Vec<Vec<lopdf::content::Operation>> {
        let mut page = PageBuilder::new();

        page.paragraph(&self.config.title, Font::Bold, TITLE_SIZE, Align::Center);
        page.spacer(SECTION_GAP);

        page.paragraph(
            &format!("Company: {}", or_na(&company.name)),
            Font::Regular,
            BODY_SIZE,
            Align::Left,
        );
        page.paragraph(
            &format!("Analysis period: {}", or_na(&company.analysis_period)),
            Font::Regular,
            BODY_SIZE,
            Align::Left,
        );
        page.paragraph(
            &format!("Report date: {}", generated),
            Font::Regular,
            BODY_SIZE,
            Align::Left,
        );
        page.spacer(SECTION_GAP);

        page.paragraph("Anomaly summary", Font::Bold, HEADING_SIZE, Align::Left);
        page.paragraph(
            &format!("- Total anomalies: {}", report.anomaly_count()),
            Font::Regular,
            BODY_SIZE,
            Align::Left,
        );
        page.paragraph(
            &format!("- Anomaly rate: {}", format::rate(report.anomaly_rate)),
            Font::Regular,
            BODY_SIZE,
            Align::Left,
        );
        page.spacer(SECTION_GAP);

        if report.is_empty() {
            page.paragraph(&self.config.no_anomalies_text, Font::Regular, BODY_SIZE, Align::Left);
        } else {
            page.paragraph("Anomaly details", Font::Bold, HEADING_SIZE, Align::Left);
            page.table(&detail_table(report));
        }

        page.finish()
    }
}

fn report_date(date: NaiveDate) -> String {
    date.format(REPORT_DATE_FORMAT).to_string()
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() { "N/A" } else { s }
}

fn detail_table(report: &AnomalyReport) -> Table {
    Table {
        header: TABLE_HEADER.iter().map(|h| h.to_string()).collect(),
        rows: report
            .records
            .iter()
            .map(|r| {
                vec![
                    format::timestamp(r.timestamp),
                    format::value(r.primary_value),
                    format::score(r.anomaly_score),
                    r.severity.to_string(),
                ]
            })
            .collect(),
    }
}

/// Build the object graph and serialize it
fn assemble(
    pages: Vec<Vec<lopdf::content::Operation>>,
    title: &str,
    date: NaiveDate,
) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |f: Font| {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => f.base_font(),
            "Encoding" => "WinAnsiEncoding",
        }
    };
    let regular_id = doc.add_object(font(Font::Regular));
    let bold_id = doc.add_object(font(Font::Bold));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource() => regular_id,
            Font::Bold.resource() => bold_id,
        },
    });

    let mut fingerprint: Vec<u8> = Vec::new();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let encoded = Content { operations }.encode()?;
        fingerprint.extend_from_slice(&encoded);
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });

    let created = date.format("D:%Y%m%d000000Z").to_string();
    fingerprint.extend_from_slice(created.as_bytes());
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_win_ansi(title)),
        "Producer" => Object::string_literal(PRODUCER),
        "CreationDate" => Object::string_literal(created),
    });

    let id = xxh3_128(&fingerprint).to_be_bytes().to_vec();
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id, StringFormat::Hexadecimal),
        ],
    );

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}
