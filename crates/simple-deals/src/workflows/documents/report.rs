use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::assistant::model::ModelError;
use crate::assistant::report_writer::ReportWriter;
use crate::assistant::summarizer::{grouped, plain_number};
use crate::config::{ConfigError, DocumentServiceConfig};
use crate::workflows::search::domain::ListingRecord;

const DISCLAIMER: &str = "This report was generated automatically from listing data. \
It is not an appraisal, and figures marked unavailable were not supplied by the listing.";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no PDF renderer is configured")]
    NotConfigured,
    #[error("PDF render request failed: {0}")]
    Network(String),
    #[error("PDF renderer returned {0}")]
    Status(u16),
    #[error("PDF renderer returned an empty document")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report narrative failed: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// HTML in, PDF bytes out.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render_pdf(&self, html: &str) -> Result<Vec<u8>, RenderError>;
}

/// Posts the document as `text/html` to a rendering endpoint that answers with PDF bytes.
#[derive(Debug, Clone)]
pub struct HttpPdfRenderer {
    http: Client,
    endpoint: Option<Url>,
}

impl HttpPdfRenderer {
    pub fn from_config(config: &DocumentServiceConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .renderer_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|_| ConfigError::InvalidValue {
                    name: "RENDERER_URL",
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|_| ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS",
                value: format!("{:?}", config.request_timeout),
            })?;

        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl ReportRenderer for HttpPdfRenderer {
    async fn render_pdf(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let endpoint = self.endpoint.clone().ok_or(RenderError::NotConfigured)?;
        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .header(ACCEPT, "application/pdf")
            .body(html.to_string())
            .send()
            .await
            .map_err(|err| RenderError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| RenderError::Network(err.to_string()))?;
        if bytes.is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(bytes.to_vec())
    }
}

/// One listing plus the model-written analysis, laid out as a printable document.
#[derive(Debug, Clone)]
pub struct PropertyReport {
    listing: ListingRecord,
    analysis_html: String,
    generated_at: DateTime<Utc>,
}

impl PropertyReport {
    pub fn new(listing: ListingRecord, analysis_html: String, generated_at: DateTime<Utc>) -> Self {
        Self {
            listing,
            analysis_html,
            generated_at,
        }
    }

    pub fn title(&self) -> String {
        match self.listing.street() {
            Some(street) if !street.trim().is_empty() => {
                format!("Property Report: {}", street.trim())
            }
            _ => "Property Report".to_string(),
        }
    }

    pub fn filename(&self) -> String {
        report_filename(&self.listing, self.generated_at)
    }

    pub fn to_html(&self) -> String {
        let listing = &self.listing;
        let locality = [
            listing.city.as_deref(),
            listing.state.as_deref(),
            listing.zipcode.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

        let facts = [
            ("Price", listing.price.map(|price| format!("${}", grouped(price)))),
            ("Bedrooms", listing.bedrooms.map(plain_number)),
            ("Bathrooms", listing.bathrooms.map(plain_number)),
            (
                "Living area",
                listing.living_area.map(|area| format!("{} sq ft", grouped(area))),
            ),
            ("Year built", listing.year_built.map(|year| year.to_string())),
        ];
        let rows: String = facts
            .iter()
            .map(|(label, value)| {
                format!(
                    "<tr><th>{label}</th><td>{}</td></tr>",
                    escape_html(value.as_deref().unwrap_or("Unavailable"))
                )
            })
            .collect();

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
<style>body{{font-family:Helvetica,Arial,sans-serif;margin:40px;color:#222}}\
table{{border-collapse:collapse}}th,td{{padding:4px 12px;text-align:left;border-bottom:1px solid #ddd}}\
footer{{margin-top:32px;font-size:11px;color:#666}}</style>\n</head>\n<body>\n\
<header><h1>{title}</h1><p>{locality}</p></header>\n\
<table>{rows}</table>\n<section>\n{analysis}\n</section>\n\
<footer><p>{disclaimer}</p><p>Generated {generated}</p></footer>\n</body>\n</html>\n",
            title = escape_html(&self.title()),
            locality = escape_html(&locality),
            rows = rows,
            analysis = self.analysis_html,
            disclaimer = DISCLAIMER,
            generated = self.generated_at.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

/// `property-report-<street-with-dashes>-<unix-millis>.pdf`, or `property` when the listing
/// has no street address.
pub fn report_filename(listing: &ListingRecord, generated_at: DateTime<Utc>) -> String {
    let street = listing
        .street()
        .map(|street| {
            street
                .split_whitespace()
                .map(|word| {
                    word.chars()
                        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                        .collect::<String>()
                })
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>()
                .join("-")
        })
        .filter(|street| !street.is_empty())
        .unwrap_or_else(|| "property".to_string());

    format!(
        "property-report-{street}-{}.pdf",
        generated_at.timestamp_millis()
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// A finished PDF and the name it should be downloaded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Writes, lays out and renders a property report.
#[derive(Clone)]
pub struct ReportService {
    writer: ReportWriter,
    renderer: Arc<dyn ReportRenderer>,
}

impl ReportService {
    pub fn new(writer: ReportWriter, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self { writer, renderer }
    }

    pub async fn generate(&self, listing: ListingRecord) -> Result<RenderedReport, ReportError> {
        let analysis_html = self.writer.write(&listing).await?;
        debug!(chars = analysis_html.len(), "report narrative written");

        let report = PropertyReport::new(listing, analysis_html, Utc::now());
        let bytes = self.renderer.render_pdf(&report.to_html()).await?;
        let filename = report.filename();

        info!(%filename, bytes = bytes.len(), "property report rendered");
        Ok(RenderedReport { filename, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing() -> ListingRecord {
        ListingRecord {
            street_address: Some("1200 S Congress Ave #4".to_string()),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            zipcode: Some("78704".to_string()),
            price: Some(685_000.0),
            bedrooms: Some(3.0),
            ..ListingRecord::default()
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).single().expect("valid time")
    }

    #[test]
    fn filename_uses_dashed_street_and_millis() {
        assert_eq!(
            report_filename(&listing(), at()),
            "property-report-1200-S-Congress-Ave-4-1700000000123.pdf"
        );
        assert_eq!(
            report_filename(&ListingRecord::default(), at()),
            "property-report-property-1700000000123.pdf"
        );
    }

    #[test]
    fn listing_fields_are_escaped_and_gaps_reported() {
        let mut listing = listing();
        listing.city = Some("<script>".to_string());
        let html = PropertyReport::new(listing, "<h2>Valuation</h2>".to_string(), at()).to_html();

        assert!(html.contains("&lt;script&gt; TX 78704"));
        assert!(html.contains("<h2>Valuation</h2>"));
        assert!(html.contains("<tr><th>Price</th><td>$685,000</td></tr>"));
        assert!(html.contains("<tr><th>Year built</th><td>Unavailable</td></tr>"));
        assert!(html.contains("Generated 2023-11-14"));
    }

    #[tokio::test]
    async fn unconfigured_renderer_fails_without_network() {
        let renderer = HttpPdfRenderer::from_config(&DocumentServiceConfig {
            extractor_url: None,
            renderer_url: None,
            request_timeout: std::time::Duration::from_secs(5),
        })
        .expect("valid");
        let err = renderer.render_pdf("<p></p>").await.expect_err("not configured");
        assert!(matches!(err, RenderError::NotConfigured));
    }
}
