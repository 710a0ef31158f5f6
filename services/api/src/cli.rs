use crate::ask::{run_ask, run_structure, AskArgs, StructureArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use simple_deals::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Simple Deals",
    about = "Answer real-estate questions with listing search and market analysis",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one question through the full pipeline and print the response payload
    Ask(AskArgs),
    /// Print the structured search and provider URL built for a question
    Structure(StructureArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Ask(args) => run_ask(args).await,
        Command::Structure(args) => run_structure(args).await,
    }
}
