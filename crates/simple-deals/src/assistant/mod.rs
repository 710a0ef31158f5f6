//! Model-facing components. Each one owns its prompt template and the policy applied to
//! the model's answer; the model itself sits behind [`LanguageModel`].

pub mod affirmation;
pub mod classifier;
pub mod model;
pub mod prompts;
pub mod report_writer;
pub mod structurer;
pub mod summarizer;

pub use affirmation::{Affirmation, AffirmationResolver};
pub use classifier::{ClassificationError, IntentClassifier};
pub use model::{ChatMessage, LanguageModel, ModelError, OpenAiChatModel, Role};
pub use prompts::PromptTemplate;
pub use report_writer::ReportWriter;
pub use structurer::{parse_structured_search, QueryStructurer, StructuringError};
pub use summarizer::{
    card_view_hint, ListingStats, Narrative, NarrativeSummarizer, SummaryError, FOLLOW_UP_MARKER,
};
