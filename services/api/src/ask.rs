use crate::infra::{analysis_service, language_model, InMemoryHistoryStore};
use clap::Args;
use serde_json::json;
use simple_deals::assistant::QueryStructurer;
use simple_deals::config::AppConfig;
use simple_deals::error::AppError;
use simple_deals::telemetry;
use simple_deals::workflows::analysis::{AnalysisError, AnalysisStage, UserQuery};
use simple_deals::workflows::search::{search_url, RapidApiClient};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct AskArgs {
    /// Question or reply to send through the pipeline
    pub(crate) question: String,
    /// Follow-up question the reply answers, as returned by a previous analysis
    #[arg(long)]
    pub(crate) last_question: Option<String>,
    /// Email to store the answer under
    #[arg(long)]
    pub(crate) email: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct StructureArgs {
    /// Free-text search to convert
    pub(crate) question: String,
}

pub(crate) async fn run_ask(args: AskArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let model = language_model(&config)?;
    let rapidapi = RapidApiClient::from_config(&config.providers)?;
    let service = analysis_service(
        &config,
        model,
        rapidapi,
        Arc::new(InMemoryHistoryStore::default()),
    );

    let mut query = UserQuery::new(args.question);
    if let Some(pending) = args.last_question {
        query = query.with_pending_question(pending);
    }
    query.email = args.email;

    let outcome = service.analyze(query).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub(crate) async fn run_structure(args: StructureArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let structurer = QueryStructurer::new(language_model(&config)?);
    let search = structurer
        .structure(&args.question)
        .await
        .map_err(|err| AnalysisError::delegate(AnalysisStage::Structure, err))?;

    let output = json!({
        "searchQueryState": search,
        "url": search_url(&search),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
