//! Turns listings and market data into the text the caller sees.
//!
//! The model writes the prose, but which data is authoritative, when a metric must be
//! reported as unavailable, whether the caller gets property cards, and the single
//! `!!!`-delimited follow-up question are all decided here.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::model::{strip_code_fences, LanguageModel, ModelError};
use super::prompts::PromptTemplate;
use crate::workflows::analysis::domain::Intent;
use crate::workflows::search::domain::ListingRecord;
use crate::workflows::search::market::MarketSnapshot;

/// Marker wrapped around the follow-up question of an analysis memo.
pub const FOLLOW_UP_MARKER: &str = "!!!";

/// Listings beyond this many are summarized by the statistics block only.
const PROMPT_LISTING_LIMIT: usize = 40;

const AGGREGATE_PHRASES: [&str; 9] = [
    "median",
    "average",
    "mean price",
    "how many",
    "total number",
    "percentage",
    "typical price",
    "price per square",
    "what is the price range",
];

const BROWSE_PHRASES: [&str; 9] = [
    "show me",
    "find",
    "list ",
    "for sale",
    "homes in",
    "houses in",
    "properties",
    "listings",
    "looking for",
];

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub description: String,
    pub card_view: Option<bool>,
}

#[derive(Clone)]
pub struct NarrativeSummarizer {
    model: Arc<dyn LanguageModel>,
}

impl NarrativeSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn summarize(
        &self,
        intent: Intent,
        listings: &[ListingRecord],
        market: Option<&MarketSnapshot>,
        user_text: &str,
        location: Option<&str>,
    ) -> Result<Narrative, SummaryError> {
        match intent {
            Intent::Listing => self.describe_listings(listings, user_text).await,
            Intent::Analysis => {
                self.write_memo(listings, market, user_text, location)
                    .await
            }
        }
    }

    async fn describe_listings(
        &self,
        listings: &[ListingRecord],
        user_text: &str,
    ) -> Result<Narrative, SummaryError> {
        let statistics = ListingStats::from_listings(listings).describe();
        let listing_json = listings_for_prompt(listings);
        let messages = PromptTemplate::SummarizeListings.messages(
            user_text,
            &[
                ("question", user_text),
                ("statistics", &statistics),
                ("listings", &listing_json),
            ],
        );

        let raw = self.model.complete(messages).await?;
        let (description, model_card_view) = parse_listing_reply(&raw);
        let card_view = card_view_hint(user_text).or(model_card_view).unwrap_or(true);
        debug!(card_view, "listing narrative ready");

        Ok(Narrative {
            description,
            card_view: Some(card_view),
        })
    }

    async fn write_memo(
        &self,
        listings: &[ListingRecord],
        market: Option<&MarketSnapshot>,
        user_text: &str,
        location: Option<&str>,
    ) -> Result<Narrative, SummaryError> {
        let statistics = ListingStats::from_listings(listings).describe();
        let market_json = market
            .and_then(|snapshot| serde_json::to_string_pretty(snapshot).ok())
            .unwrap_or_else(|| "null".to_string());
        let missing = match market {
            Some(snapshot) if snapshot.missing_slices().is_empty() => "none".to_string(),
            Some(snapshot) => snapshot.missing_slices().join(", "),
            None => "all market sources".to_string(),
        };
        let location_text = location.unwrap_or("the requested area");

        let messages = PromptTemplate::AnalyzeMarket.messages(
            user_text,
            &[
                ("question", user_text),
                ("location", location_text),
                ("statistics", &statistics),
                ("market", &market_json),
                ("missing", &missing),
            ],
        );

        let memo = strip_code_fences(&self.model.complete(messages).await?);
        Ok(Narrative {
            description: finish_memo(&memo, market, location),
            card_view: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListingReply {
    #[serde(default)]
    description: String,
    #[serde(rename = "cardView", default)]
    card_view: Option<bool>,
}

fn parse_listing_reply(raw: &str) -> (String, Option<bool>) {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<ListingReply>(&cleaned) {
        Ok(reply) if !reply.description.trim().is_empty() => {
            (reply.description.trim().to_string(), reply.card_view)
        }
        _ => (cleaned, None),
    }
}

fn listings_for_prompt(listings: &[ListingRecord]) -> String {
    let rows: Vec<Value> = listings
        .iter()
        .take(PROMPT_LISTING_LIMIT)
        .map(|listing| {
            json!({
                "address": listing.street(),
                "city": listing.city,
                "state": listing.state,
                "zipcode": listing.zipcode,
                "price": listing.price,
                "bedrooms": listing.bedrooms,
                "bathrooms": listing.bathrooms,
                "livingArea": listing.living_area,
                "yearBuilt": listing.year_built,
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Whether the phrasing alone settles the card-view question.
///
/// Aggregate wording ("median", "how many") wins over browsing wording because questions
/// like "find the median price" ask for one number.
pub fn card_view_hint(text: &str) -> Option<bool> {
    let lower = text.to_lowercase();
    if AGGREGATE_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        Some(false)
    } else if BROWSE_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        Some(true)
    } else {
        None
    }
}

/// Append unavailable-data notes and normalize the follow-up question.
pub fn finish_memo(memo: &str, market: Option<&MarketSnapshot>, location: Option<&str>) -> String {
    let (body, question) = split_follow_up(memo);

    let question = match (question, location) {
        (Some(question), Some(location)) if mentions_location(&question, location) => question,
        (_, Some(location)) => {
            format!("Should I find the most popular homes currently for sale in {location}?")
        }
        (Some(question), None) => question,
        (None, None) => {
            "Should I find the most popular homes currently for sale in your area?".to_string()
        }
    };

    let note = match market {
        None => Some("Unavailable data: market statistics could not be retrieved.".to_string()),
        Some(snapshot) => {
            let missing = snapshot.missing_slices();
            (!missing.is_empty()).then(|| format!("Unavailable data: {}.", missing.join(", ")))
        }
    };

    let mut sections: Vec<String> = Vec::new();
    if !body.is_empty() {
        sections.push(body);
    }
    sections.extend(note);
    sections.push(format!("{FOLLOW_UP_MARKER}{question}{FOLLOW_UP_MARKER}"));
    sections.join("\n\n")
}

/// Separate the memo body from the model's follow-up question, removing every marker.
fn split_follow_up(memo: &str) -> (String, Option<String>) {
    if let Some(position) = memo.find(FOLLOW_UP_MARKER) {
        let body = memo[..position].trim().to_string();
        let tail = memo[position..].replace(FOLLOW_UP_MARKER, " ");
        return (body, first_question(&tail));
    }

    let lines: Vec<&str> = memo.lines().collect();
    let question_line = lines
        .iter()
        .rposition(|line| line.trim().trim_end_matches(['*', '_']).ends_with('?'));

    match question_line {
        Some(index) => {
            let body = lines
                .iter()
                .enumerate()
                .filter(|(line_index, _)| *line_index != index)
                .map(|(_, line)| *line)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            (body, first_question(lines[index]))
        }
        None => (memo.trim().to_string(), None),
    }
}

fn first_question(text: &str) -> Option<String> {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '_');
    let end = text.find('?')?;
    let question = text[..=end]
        .trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, '*' | '_' | '-' | '"' | '\u{201c}' | '\u{201d}')
        })
        .trim();
    (question.len() > 1).then(|| question.to_string())
}

/// True when the question names the city or state of `location` (`"Austin, TX"`).
/// Short parts such as state codes must match a whole word.
fn mentions_location(question: &str, location: &str) -> bool {
    let lower = question.to_lowercase();
    location
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .any(|part| {
            if part.len() <= 2 {
                question
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word.eq_ignore_ascii_case(part))
            } else {
                lower.contains(&part.to_lowercase())
            }
        })
}

/// Min, max and mean of one numeric listing field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Spread {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (count, sum, min, max) = values.filter(|value| value.is_finite()).fold(
            (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(count, sum, min, max), value| (count + 1, sum + value, min.min(value), max.max(value)),
        );
        (count > 0).then(|| Spread {
            min,
            max,
            mean: sum / count as f64,
        })
    }
}

/// Statistics computed from listing data alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingStats {
    pub count: usize,
    pub zipcode: Option<String>,
    pub bedrooms: Option<Spread>,
    pub bathrooms: Option<Spread>,
    pub living_area: Option<Spread>,
    pub year_built: Option<Spread>,
    pub price: Option<Spread>,
}

impl ListingStats {
    pub fn from_listings(listings: &[ListingRecord]) -> Self {
        Self {
            count: listings.len(),
            zipcode: listings.iter().find_map(|listing| listing.zipcode.clone()),
            bedrooms: Spread::from_values(listings.iter().filter_map(|l| l.bedrooms)),
            bathrooms: Spread::from_values(listings.iter().filter_map(|l| l.bathrooms)),
            living_area: Spread::from_values(listings.iter().filter_map(|l| l.living_area)),
            year_built: Spread::from_values(
                listings.iter().filter_map(|l| l.year_built.map(f64::from)),
            ),
            price: Spread::from_values(listings.iter().filter_map(|l| l.price)),
        }
    }

    pub fn describe(&self) -> String {
        if self.count == 0 {
            return "No listings matched the search.".to_string();
        }

        let noun = if self.count == 1 { "listing" } else { "listings" };
        let mut lines = vec![match &self.zipcode {
            Some(zip) => format!("I found {} {noun} in the {zip} ZIP code area.", self.count),
            None => format!("I found {} {noun}.", self.count),
        }];

        lines.push(match self.bedrooms {
            Some(beds) => format!(
                "- Bedrooms range from {} to {}, with an average of {:.1} bedrooms",
                plain_number(beds.min),
                plain_number(beds.max),
                beds.mean
            ),
            None => "- Bedroom counts are unavailable".to_string(),
        });
        lines.push(match self.bathrooms {
            Some(baths) => format!(
                "- Bathrooms range from {} to {}",
                plain_number(baths.min),
                plain_number(baths.max)
            ),
            None => "- Bathroom counts are unavailable".to_string(),
        });
        lines.push(match self.living_area {
            Some(area) => format!(
                "- Living areas range from {} to {} square feet",
                grouped(area.min),
                grouped(area.max)
            ),
            None => "- Living area is unavailable".to_string(),
        });
        lines.push(match self.year_built {
            Some(years) => format!(
                "- Built between {} and {}",
                years.min.round() as i64,
                years.max.round() as i64
            ),
            None => "- Construction years are unavailable".to_string(),
        });
        lines.push(match self.price {
            Some(price) => format!(
                "- Prices range from ${} to ${}",
                grouped(price.min),
                grouped(price.max)
            ),
            None => "- Prices are unavailable".to_string(),
        });

        lines.join("\n")
    }
}

/// `3.0` -> `3`, `2.5` -> `2.5`.
pub(crate) fn plain_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}

/// Whole number with thousands separators: `2145000.4` -> `2,145,000`.
pub(crate) fn grouped(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0 {
        format!("-{out}")
    } else {
        out
    }
}
