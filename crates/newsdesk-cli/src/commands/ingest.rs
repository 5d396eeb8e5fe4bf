use clap::Parser;
use newsdesk_memory::memory::{IngestReport, IngestRequest};
use newsdesk_memory::{Config, MemoryManager};
use tracing::info;

use super::parse_style;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, truncate_string};

#[derive(Parser)]
pub struct IngestCommand {
    #[clap(required = true, help = "Source references to ingest")]
    pub source_refs: Vec<String>,

    #[clap(long, short, help = "Per-item budget in characters")]
    pub budget: Option<usize>,

    #[clap(long, short, help = "Summary style (brief, balanced, detailed, technical)")]
    pub style: Option<String>,

    #[clap(long, help = "Session capacity in characters")]
    pub capacity: Option<usize>,
}

impl IngestCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let manager = MemoryManager::from_config(config).await?;
        let style = parse_style(self.style.as_deref(), manager.settings().default_style)?;
        let session = manager.open_session(self.capacity);

        let requests = self
            .source_refs
            .iter()
            .map(|source_ref| {
                let request = IngestRequest::new(source_ref.clone()).with_style(style);
                match self.budget {
                    Some(budget) => request.with_budget(budget),
                    None => request,
                }
            })
            .collect();
        let results = manager.ingest_batch(&session, requests).await;

        let stored = results.iter().filter(|r| r.is_ok()).count();
        if stored > 0 {
            manager.save(config).await?;
            info!("Saved index snapshot to {}", config.storage.snapshot_path().display());
        }
        let budget = session.budget_status();

        match format {
            OutputFormat::Json => {
                let items: Vec<_> = self
                    .source_refs
                    .iter()
                    .zip(&results)
                    .map(|(source_ref, result)| match result {
                        Ok(report) => serde_json::to_value(report).unwrap_or_default(),
                        Err(e) => serde_json::json!({
                            "source_ref": source_ref,
                            "error": e.to_string(),
                        }),
                    })
                    .collect();
                let output = serde_json::json!({
                    "session": session.id().to_string(),
                    "budget": budget,
                    "items": items,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table =
                    new_table(["Content ID", "Source", "Level", "Size", "Charged", "Status"]);
                for (source_ref, result) in self.source_refs.iter().zip(&results) {
                    match result {
                        Ok(report) => table.add_row(report_row(report)),
                        Err(e) => table.add_row([
                            "-".to_string(),
                            truncate_string(source_ref, 48),
                            "-".to_string(),
                            "-".to_string(),
                            "0".to_string(),
                            truncate_string(&e.to_string(), 48),
                        ]),
                    };
                }
                println!("{table}\n");
                println!(
                    "Stored {stored}/{} items, session used {} of {} chars",
                    results.len(),
                    budget.used,
                    budget.capacity
                );
            }
        }

        if stored == 0 {
            return Err("no items were ingested".into());
        }
        Ok(())
    }
}

fn report_row(report: &IngestReport) -> [String; 6] {
    let status = if report.cache_hit {
        "cached".to_string()
    } else if report.evicted.is_empty() {
        "stored".to_string()
    } else {
        format!("stored, evicted {}", report.evicted.len())
    };
    [
        report.content_id.clone(),
        truncate_string(&report.source_ref, 48),
        report.level.to_string(),
        format!("{} / {}", report.size, report.raw_size),
        report.charged.to_string(),
        status,
    ]
}
