mod cli;
mod infra;
mod routes;
mod server;
mod simulate;

use exposure_pipeline::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
