use std::path::PathBuf;

use clap::Parser;
use newsdesk_memory::{Config, MemoryManager};

use super::parse_style;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table};

#[derive(Parser)]
pub struct CompressCommand {
    #[clap(help = "Text file to compress")]
    pub file: PathBuf,

    #[clap(long, short, help = "Target size in characters")]
    pub budget: Option<usize>,

    #[clap(long, short, help = "Summary style (brief, balanced, detailed, technical)")]
    pub style: Option<String>,
}

impl CompressCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let text = tokio::fs::read_to_string(&self.file)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", self.file.display()))?;

        let manager = MemoryManager::from_config(config).await?;
        let budget = self.budget.unwrap_or(manager.settings().default_item_budget);
        if budget == 0 {
            return Err("budget must be greater than zero".into());
        }
        let style = parse_style(self.style.as_deref(), manager.settings().default_style)?;

        let compressor = manager.compressor();
        let input_chars = text.chars().count();
        let out = compressor.compress(&text, budget, style).await;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "level": out.level,
                    "style": style.as_str(),
                    "budget": budget,
                    "ceiling": compressor.ceiling(budget),
                    "input_chars": input_chars,
                    "output_chars": out.len(),
                    "text": out.text,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = new_table(["Level", "Style", "Budget", "Input", "Output"]);
                table.add_row([
                    out.level.to_string(),
                    style.to_string(),
                    format!("{budget} (max {})", compressor.ceiling(budget)),
                    input_chars.to_string(),
                    out.len().to_string(),
                ]);
                println!("{table}\n");
                println!("{}", out.text);
            }
        }

        Ok(())
    }
}
