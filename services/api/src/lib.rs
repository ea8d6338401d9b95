mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use caisse_imprevue::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
