//! `tagbatch status` – show per-artist progress without submitting anything.

use anyhow::Result;
use serde_json::json;
use tagbatch_core::config::BatchConfig;
use tagbatch_core::orchestrator::BatchOrchestrator;
use tagbatch_core::segment::SegmentStatus;

pub async fn run_status(cfg: &BatchConfig, as_json: bool) -> Result<()> {
    let orchestrator = BatchOrchestrator::from_config(cfg)?;
    let segments = orchestrator.survey().await?;
    let depth = orchestrator.oracle().queue_depth().await;

    if as_json {
        let segments: Vec<_> = segments
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "total_items": s.total_items,
                    "completed_items": s.completed_items,
                    "status": s.status(),
                })
            })
            .collect();
        let out = json!({ "queue_depth": depth, "segments": segments });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if segments.is_empty() {
        println!("No artist folders found.");
    } else {
        println!("{:<10} {:>7} {:>7}  {}", "STATUS", "DONE", "TRACKS", "ARTIST");
        for s in &segments {
            let status = match s.status() {
                SegmentStatus::NoWork => "empty",
                SegmentStatus::AlreadyComplete => "complete",
                SegmentStatus::Pending => "pending",
            };
            let done = s
                .completed_items
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("{:<10} {:>7} {:>7}  {}", status, done, s.total_items, s.name);
        }
    }
    let depth = depth
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("Queue depth: {}", depth);
    Ok(())
}
