use caisse_imprevue_api::run;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("caisse-imprevue: {err}");
            ExitCode::FAILURE
        }
    }
}
