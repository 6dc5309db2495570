//! `tagbatch run` – process the library one artist at a time.

use anyhow::Result;
use tagbatch_core::config::BatchConfig;
use tagbatch_core::orchestrator::BatchOrchestrator;

use crate::cli::describe;

pub async fn run_batch(cfg: &BatchConfig, artists: Vec<String>) -> Result<()> {
    tracing::info!("tagbatch starting: {}", describe(cfg));
    let orchestrator = BatchOrchestrator::from_config(cfg)?.with_only(artists);
    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };
    if report.segments.is_empty() {
        println!("No artist folders found.");
    }
    Ok(())
}
