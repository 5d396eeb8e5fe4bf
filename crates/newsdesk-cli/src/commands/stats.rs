use clap::Parser;
use newsdesk_memory::{Config, MemoryManager};
use tracing::info;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "Remove items older than index.max_age_days first")]
    pub prune: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let manager = MemoryManager::from_config(config).await?;

        let pruned = if self.prune {
            let pruned = manager.prune_expired().await?;
            if !pruned.is_empty() {
                manager.save(config).await?;
                info!("Pruned {} expired items", pruned.len());
            }
            pruned.len()
        } else {
            0
        };

        let stats = manager.stats().await?;

        match format {
            OutputFormat::Json => {
                let mut output = serde_json::to_value(&stats)?;
                output["pruned"] = serde_json::json!(pruned);
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Newsdesk Memory");
                println!("======================\n");

                let mut levels = new_table(["Level", "Items"]);
                for (level, count) in &stats.by_level {
                    levels.add_row([level.clone(), count.to_string()]);
                }
                println!("{levels}\n");

                if !stats.by_host.is_empty() {
                    let mut hosts = new_table(["Source", "Items"]);
                    for (host, count) in &stats.by_host {
                        hosts.add_row([host.clone(), count.to_string()]);
                    }
                    println!("{hosts}\n");
                }

                println!(
                    "Total: {} of {} items, {} chars",
                    stats.total_items, stats.capacity, stats.total_chars
                );
                if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                    println!(
                        "Range: {} to {}",
                        format_timestamp(&oldest),
                        format_timestamp(&newest)
                    );
                }
                if self.prune {
                    println!("Pruned: {pruned}");
                }
            }
        }

        Ok(())
    }
}
