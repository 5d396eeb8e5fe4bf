pub mod compress;
pub mod fingerprint;
pub mod ingest;
pub mod search;
pub mod stats;

pub use compress::CompressCommand;
pub use fingerprint::FingerprintCommand;
pub use ingest::IngestCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use newsdesk_memory::SummaryStyle;

use crate::error::CliResult;

pub(crate) fn parse_style(raw: Option<&str>, fallback: SummaryStyle) -> CliResult<SummaryStyle> {
    match raw {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(fallback),
    }
}
