mod ask;
mod cli;
mod infra;
mod routes;
mod server;

use simple_deals::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
