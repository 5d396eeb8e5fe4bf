use clap::Parser;
use newsdesk_memory::fingerprint::{SourceRef, fingerprint_source};

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table};

#[derive(Parser)]
pub struct FingerprintCommand {
    #[clap(help = "URL, file:// path or turn:<conversation>:<n> reference")]
    pub source_ref: String,

    #[clap(
        long = "param",
        short,
        value_parser = parse_param,
        help = "Fetch parameter as key=value (repeatable)"
    )]
    pub params: Vec<(String, String)>,
}

impl FingerprintCommand {
    pub async fn execute(&self, format: OutputFormat) -> CliResult<()> {
        let source = SourceRef::parse(&self.source_ref)?;
        let fingerprint = fingerprint_source(&source, &self.params);
        let content_id = fingerprint.short_id(&source);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "fingerprint": fingerprint.as_str(),
                    "content_id": content_id,
                    "canonical": source.canonical(),
                    "host": source.host(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = new_table(["Property", "Value"]);
                table.add_row(["Fingerprint", fingerprint.as_str()]);
                table.add_row(["Content ID", &content_id]);
                table.add_row(["Canonical", &source.canonical()]);
                table.add_row(["Host", source.host().unwrap_or("-")]);
                println!("{table}");
            }
        }

        Ok(())
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty parameter name in {raw:?}"));
    }
    Ok((key.trim().to_string(), value.trim().to_string()))
}
