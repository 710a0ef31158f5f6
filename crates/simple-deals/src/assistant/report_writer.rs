use std::sync::Arc;

use super::model::{strip_code_fences, LanguageModel, ModelError};
use super::prompts::PromptTemplate;
use crate::workflows::search::domain::ListingRecord;

/// Asks the model for the HTML body of a single-property investment report.
#[derive(Clone)]
pub struct ReportWriter {
    model: Arc<dyn LanguageModel>,
}

impl ReportWriter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Returns an HTML fragment; fences and any stray document wrapper are removed.
    pub async fn write(&self, listing: &ListingRecord) -> Result<String, ModelError> {
        let listing_json =
            serde_json::to_string_pretty(listing).map_err(|err| ModelError::Decode(err.to_string()))?;
        let messages = PromptTemplate::PropertyReport.messages("", &[("listing", &listing_json)]);
        let raw = self.model.complete(messages).await?;
        Ok(unwrap_document(&strip_code_fences(&raw)))
    }
}

/// Keep only what sits inside `<body>` when the model returned a full document.
fn unwrap_document(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let Some(open) = lower.find("<body") else {
        return html.trim().to_string();
    };
    let Some(start) = lower[open..].find('>').map(|offset| open + offset + 1) else {
        return html.trim().to_string();
    };
    let end = lower[start..]
        .find("</body>")
        .map_or(html.len(), |offset| start + offset);
    html[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_pass_through() {
        assert_eq!(unwrap_document("<h2>Valuation</h2>"), "<h2>Valuation</h2>");
    }

    #[test]
    fn full_documents_are_reduced_to_the_body() {
        let html = "<html><head><title>x</title></head><BODY class=\"r\">\n<p>Risks</p>\n</BODY></html>";
        assert_eq!(unwrap_document(html), "<p>Risks</p>");
    }
}
