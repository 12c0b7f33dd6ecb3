//! Cleanup reports.
//!
//! Reports are placeholders for now: the JSON form carries zeroed
//! counters and the PDF form is a single page with a title line.

use chrono::{DateTime, Utc};
use lopdf::{dictionary, Document, Object, Stream};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to render PDF: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub unread_senders: u64,
    pub labels_created: u64,
    pub unsubscribe_candidates: u64,
}

/// The latest cleanup report.
#[derive(Debug, Clone, Serialize)]
pub struct LatestReport {
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub status: &'static str,
}

impl LatestReport {
    pub fn stub(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            summary: ReportSummary::default(),
            status: "stub",
        }
    }
}

/// Title line of the PDF report, e.g.
/// `Gmail Inbox Cleaner - Report (2026-01-31 09:15:00 UTC)`.
pub fn report_title(app_name: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{} - Report ({})",
        app_name,
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Renders a one-page Letter-sized PDF showing `title`.
pub fn render_pdf(title: &str) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::with_version("1.4");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let content = format!("BT\n/F1 14 Tf\n72 720 Td\n({}) Tj\nET\n", escape_pdf_string(title));
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ReportError::Pdf(e.to_string()))?;
    Ok(buffer)
}

/// Escapes a string for a PDF literal; non-ASCII becomes `?`
/// (Type1 fonts use a single-byte encoding).
fn escape_pdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_title() {
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 9, 15, 0).unwrap();
        assert_eq!(
            report_title("Gmail Inbox Cleaner", at),
            "Gmail Inbox Cleaner - Report (2026-01-31 09:15:00 UTC)"
        );
    }

    #[test]
    fn test_stub_report_json() {
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 9, 15, 0).unwrap();
        let value = serde_json::to_value(LatestReport::stub(at)).unwrap();
        assert_eq!(value["status"], "stub");
        assert_eq!(value["summary"]["unread_senders"], 0);
        assert_eq!(value["summary"]["labels_created"], 0);
        assert_eq!(value["summary"]["unsubscribe_candidates"], 0);
        assert!(value["generated_at"].as_str().unwrap().starts_with("2026-01-31T09:15:00"));
    }

    #[test]
    fn test_render_pdf() {
        let bytes = render_pdf("Gmail Inbox Cleaner - Report (2026-01-31 09:15:00 UTC)").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("a (b) \\ c"), "a \\(b\\) \\\\ c");
        assert_eq!(escape_pdf_string("café"), "caf?");
    }
}
