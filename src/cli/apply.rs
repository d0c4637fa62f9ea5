//! Apply command implementation

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use emerge::dispatch::{DispatchReport, Dispatcher};
use emerge::ingest::read_events;
use emerge::notify::{JsonlSink, MultiSink, TracingSink};

use super::AppContext;

/// Dispatch every event in `input` ("-" reads stdin)
pub async fn apply_command(
    ctx: &AppContext,
    input: &Path,
    outbox: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = File::open(input)
            .with_context(|| format!("Failed to open events file: {}", input.display()))?;
        Box::new(BufReader::new(file))
    };
    let batch = read_events(reader)?;

    let mut sink = MultiSink::new().with(TracingSink);
    if let Some(path) = outbox.or_else(|| ctx.config.dispatch.outbox.clone()) {
        sink = sink.with(JsonlSink::new(path));
    }

    let dispatcher = Dispatcher::new(
        Arc::new(ctx.engine()),
        Arc::new(sink),
        ctx.config.dispatch.clone(),
    );
    let mut report = dispatcher.run(batch.events).await;
    report.dropped += batch.rejected.len();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.failed > 0 {
        anyhow::bail!("{} events could not be applied", report.failed);
    }
    Ok(())
}

fn print_report(report: &DispatchReport) {
    println!("Events: {}", report.total());
    println!("  applied:    {}", report.applied);
    println!("  duplicates: {}", report.duplicates);
    println!("  ignored:    {}", report.ignored);
    println!("  dropped:    {}", report.dropped);
    println!("  failed:     {}", report.failed);

    if !report.level_ups.is_empty() {
        println!("\nLevel ups:");
        for level_up in &report.level_ups {
            println!(
                "  {} {} -> {}",
                level_up.user_id, level_up.old_level, level_up.new_level
            );
        }
    }
}
