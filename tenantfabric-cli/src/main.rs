//! Tenant fabric migration runner — command-line entrypoint.

use clap::Parser;

use tenantfabric_cli::cli::Cli;
use tenantfabric_cli::output;
use tenantfabric_cli::runner::{self, EXIT_ERROR};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit_code = match runner::run_standalone(cli).await {
        Ok(code) => code,
        Err(err) => {
            output::newline();
            output::error(&err.to_string());
            if let Some(source) = std::error::Error::source(&err) {
                output::error(&source.to_string());
            }
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
