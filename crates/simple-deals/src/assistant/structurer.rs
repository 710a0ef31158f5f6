use std::sync::Arc;

use tracing::{debug, warn};

use super::model::{strip_code_fences, LanguageModel, ModelError};
use super::prompts::PromptTemplate;
use crate::workflows::search::domain::{PropertyFlag, RangeFilter, StructuredSearch};

#[derive(Debug, thiserror::Error)]
pub enum StructuringError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("structured search is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} range is invalid: {reason}")]
    InvalidRange {
        field: &'static str,
        reason: &'static str,
    },
}

/// Turns free text into a [`StructuredSearch`] through the model, then cleans up what the
/// model returned.
#[derive(Clone)]
pub struct QueryStructurer {
    model: Arc<dyn LanguageModel>,
}

impl QueryStructurer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn structure(&self, text: &str) -> Result<StructuredSearch, StructuringError> {
        let messages = PromptTemplate::StructureSearch.messages(text, &[]);
        let raw = self.model.complete(messages).await?;
        let search = parse_structured_search(&raw)?;
        debug!(location = ?search.location_label(), "structured search built");
        Ok(search)
    }
}

/// Parse model output into a normalized, validated search.
pub fn parse_structured_search(raw: &str) -> Result<StructuredSearch, StructuringError> {
    let cleaned = strip_trailing_commas(&strip_code_fences(raw));
    let search: StructuredSearch = serde_json::from_str(&cleaned)?;
    normalize(search)
}

fn normalize(mut search: StructuredSearch) -> Result<StructuredSearch, StructuringError> {
    search.city = clean_text(search.city.take());
    search.state = clean_text(search.state.take()).map(|state| {
        if state.len() == 2 {
            state.to_ascii_uppercase()
        } else {
            state
        }
    });
    search.search_term = clean_text(search.search_term.take());

    if let Some(bounds) = search.bounds {
        if !bounds.is_plausible() {
            warn!(?bounds, "dropping implausible map bounds");
            search.bounds = None;
        }
    }

    let filters = &mut search.filters;
    filters.price = check_range("price", filters.price.take())?;
    filters.beds = check_range("beds", filters.beds.take())?;
    filters.baths = check_range("baths", filters.baths.take())?;

    if filters
        .sort
        .as_ref()
        .map_or(false, |sort| sort.value.as_deref().map_or(true, str::is_empty))
    {
        filters.sort = None;
    }

    for flag in PropertyFlag::ALL {
        let slot = filters.flag_filter_mut(flag);
        if slot.as_ref().map_or(false, |filter| filter.value.is_none()) {
            *slot = None;
        }
    }

    Ok(search)
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn check_range(
    field: &'static str,
    range: Option<RangeFilter>,
) -> Result<Option<RangeFilter>, StructuringError> {
    let Some(range) = range else {
        return Ok(None);
    };
    if range.is_unbounded() {
        return Ok(None);
    }
    if range.min.map_or(false, |min| min < 0.0) || range.max.map_or(false, |max| max < 0.0) {
        return Err(StructuringError::InvalidRange {
            field,
            reason: "bounds must not be negative",
        });
    }
    if let (Some(min), Some(max)) = (range.min, range.max) {
        if min > max {
            return Err(StructuringError::InvalidRange {
                field,
                reason: "minimum exceeds maximum",
            });
        }
    }
    Ok(Some(range))
}

/// Drop commas that directly precede a closing brace or bracket, outside string literals.
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut output = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (index, &ch) in chars.iter().enumerate() {
        if in_string {
            output.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                output.push(ch);
            }
            ',' => {
                let next = chars[index + 1..]
                    .iter()
                    .find(|candidate| !candidate.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    output.push(ch);
                }
            }
            _ => output.push(ch),
        }
    }

    output
}
