use clap::Parser;
use growpromise_client::{Cli, run};

#[tokio::main]
async fn main() -> Result<(), growpromise_client::AppError> {
    run(Cli::parse()).await
}
