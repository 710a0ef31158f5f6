//! Uploaded-document text extraction and PDF property reports.

pub mod extract;
pub mod report;

pub use extract::{ExtractionError, TextExtractor, TikaExtractor};
pub use report::{
    report_filename, HttpPdfRenderer, PropertyReport, RenderError, RenderedReport, ReportError,
    ReportRenderer, ReportService,
};

/// Upload formats accepted by file analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Xlsx,
    Xls,
    Docx,
    Doc,
}

impl DocumentKind {
    pub const ACCEPTED: [DocumentKind; 5] = [
        DocumentKind::Pdf,
        DocumentKind::Xlsx,
        DocumentKind::Xls,
        DocumentKind::Docx,
        DocumentKind::Doc,
    ];

    /// Match a `Content-Type` value, ignoring parameters such as `; charset=`.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        Self::ACCEPTED
            .into_iter()
            .find(|kind| kind.mime() == essence)
    }

    pub fn mime(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            DocumentKind::Xls => "application/vnd.ms-excel",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Doc => "application/msword",
        }
    }
}

/// Replace every line break with a space so the text reads as one question.
pub fn flatten_text(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
