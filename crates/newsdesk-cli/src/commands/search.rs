use clap::Parser;
use newsdesk_memory::{Config, MemoryManager};

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, truncate_string};

#[derive(Parser)]
pub struct SearchCommand {
    #[clap(help = "Natural language query")]
    pub query: String,

    #[clap(short, default_value = "5", help = "Maximum number of results")]
    pub k: usize,

    #[clap(long, help = "Session capacity in characters the results must fit")]
    pub capacity: Option<usize>,

    #[clap(long, help = "Only return content from this host or its subdomains")]
    pub host: Option<String>,
}

impl SearchCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let manager = MemoryManager::from_config(config).await?;
        let session = manager.open_session(self.capacity);
        let results = manager
            .retrieve_filtered(&session, &self.query, self.k, self.host.as_deref())
            .await?;
        if !results.is_empty() {
            // access statistics changed
            manager.save(config).await?;
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            OutputFormat::Table => {
                if results.is_empty() {
                    println!("No matching content found.");
                    return Ok(());
                }

                let mut table =
                    new_table(["Content ID", "Source", "Score", "Level", "Read", "Excerpt"]);
                for hit in &results {
                    table.add_row([
                        hit.content_id.clone(),
                        truncate_string(&hit.source_ref, 40),
                        format!("{:.3}", hit.similarity),
                        hit.level.to_string(),
                        format!("{} min", hit.reading_time_minutes),
                        truncate_string(&hit.text, 60),
                    ]);
                }
                println!("{table}");
                println!("\nTotal: {} results", results.len());
            }
        }

        Ok(())
    }
}
