//! Prompt templates, one per model-facing component.
//!
//! Templates carry `{name}` placeholders that [`PromptTemplate::render`] fills in.
//! Unknown placeholders are left untouched so a missing variable is visible in logs.

use super::model::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    ClassifyIntent,
    ResolveAffirmation,
    StructureSearch,
    SummarizeListings,
    AnalyzeMarket,
    PropertyReport,
}

const CLASSIFY_INTENT: &str = "\
You are a real estate assistant. Classify the user's question into one of two categories.

- listing: the question asks to search for or find specific properties by price, location or features.
- analysis: the question asks about market trends, predictions, macroeconomic factors or overall summaries.

Respond with exactly one word: listing or analysis.";

const RESOLVE_AFFIRMATION: &str = "\
You are a validation assistant.

If the input is an affirmative reply such as \"yes\", \"yeah\", \"ok\", \"sure\" or \"yup\" (any case), answer: true
If the input is a negative reply such as \"no\", \"nope\", \"not now\" or \"no way\" (any case), answer: false
If the input is neither, or is unrelated, answer: null

Answer with one word only.

Input: {input}";

const STRUCTURE_SEARCH: &str = "\
You convert natural-language property searches into a searchQueryState JSON object.

Schema (every key is optional):
{
  \"city\": string,
  \"state\": string (two-letter code),
  \"usersSearchTerm\": string,
  \"mapBounds\": { \"north\": number, \"south\": number, \"east\": number, \"west\": number },
  \"filterState\": {
    \"sort\": { \"value\": string },
    \"price\": { \"min\": number, \"max\": number },
    \"beds\": { \"min\": number, \"max\": number },
    \"baths\": { \"min\": number, \"max\": number },
    \"mf\": { \"value\": boolean },
    \"con\": { \"value\": boolean },
    \"apa\": { \"value\": boolean },
    \"apco\": { \"value\": boolean },
    \"pool\": { \"value\": boolean }
  }
}

Rules:
- Include only filters the user explicitly asked for; remove every other key.
- Never add keys outside the schema.
- Respect city boundaries; do not widen to nearby areas.
- Use real coordinates for mapBounds when a city or state is named.
- Return only the JSON object, with no commentary.";

const SUMMARIZE_LISTINGS: &str = "\
You are a real estate data assistant. Describe the listings below for the user.

User question: {question}

Authoritative statistics (computed from the listings, do not recompute or contradict):
{statistics}

Listings:
{listings}

Rules:
- Use only the listing data above. Never invent statistics, records or market figures.
- Set cardView to true when the user wants to browse individual properties and to false when
  the user asks for a single aggregate figure such as a median or an average.

Respond with a JSON object: {\"description\": string, \"cardView\": boolean}";

const ANALYZE_MARKET: &str = "\
You are a senior real estate investment analyst writing a short investment memo.

User question: {question}
Location: {location}

Listing statistics:
{statistics}

Market data (JSON, one key per source):
{market}

Unavailable sources: {missing}

Rules:
- Ground every number in the data above. When a metric is unavailable, say so; never estimate it.
- Sections: Market Overview, Opportunities, Risks, Comparative Insights, Recommendations.
- End with exactly one short, specific follow-up question that names {location},
  wrapped in !!! markers, for example: !!!Should I find the most popular homes for sale in {location}?!!!";

const PROPERTY_REPORT: &str = "\
You are a real estate investment analyst. Write an investment report for the property below as an
HTML fragment (h2, h3, p, ul, li and table elements only, no html/head/body tags).

Property (JSON):
{listing}

Cover: valuation against the listed price, rental potential, neighborhood context, risks and a
recommendation. When a figure is not in the data, say it is unavailable.";

impl PromptTemplate {
    fn body(self) -> &'static str {
        match self {
            PromptTemplate::ClassifyIntent => CLASSIFY_INTENT,
            PromptTemplate::ResolveAffirmation => RESOLVE_AFFIRMATION,
            PromptTemplate::StructureSearch => STRUCTURE_SEARCH,
            PromptTemplate::SummarizeListings => SUMMARIZE_LISTINGS,
            PromptTemplate::AnalyzeMarket => ANALYZE_MARKET,
            PromptTemplate::PropertyReport => PROPERTY_REPORT,
        }
    }

    /// Fill in `{name}` placeholders.
    pub fn render(self, vars: &[(&str, &str)]) -> String {
        fill_placeholders(self.body(), vars)
    }

    /// Build the message list sent to the model.
    ///
    /// Classification and structuring send the template as a system message with the user's
    /// text as a separate user turn; the remaining templates embed their inputs and go out as a
    /// single user message.
    pub fn messages(self, user_text: &str, vars: &[(&str, &str)]) -> Vec<ChatMessage> {
        match self {
            PromptTemplate::ClassifyIntent | PromptTemplate::StructureSearch => vec![
                ChatMessage::system(self.render(vars)),
                ChatMessage::user(user_text),
            ],
            _ => vec![ChatMessage::user(self.render(vars))],
        }
    }
}

/// Substitute placeholders in one left-to-right pass over the template, so substituted
/// values are never scanned again.
fn fill_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, value)| (close, *value))
        });
        match value {
            Some((close, value)) => {
                output.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}
