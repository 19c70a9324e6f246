// src/main.rs

use stagedag::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("stagedag error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every finished run succeeded.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let summaries = run(args).await?;
    Ok(summaries.iter().all(|s| s.is_success()))
}
