//! Source fingerprinting
//!
//! Derives stable cache keys from content sources. A source is either a URL
//! (normalized so that cosmetic differences map to the same key) or a
//! conversation turn of the form `turn:<conversation-id>:<turn-number>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{MemoryError, Result};

/// Query parameters that only carry click attribution and never change content
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src",
    "_hsenc", "_hsmi",
];

const TURN_PREFIX: &str = "turn:";

/// Maximum length for conversation ids in turn references
const MAX_CONVERSATION_ID_LEN: usize = 128;

/// Stable deterministic key identifying a content source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Get the fingerprint as a hex string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compact content id for agent-facing references, e.g. `cnt_example_1a2b3c4d`
    pub fn short_id(&self, source: &SourceRef) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("cnt_{}_{}", source.slug(), prefix)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed, normalized content source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// A web resource (http, https or file)
    Url(Url),
    /// A turn in an agent conversation
    Turn { conversation_id: String, turn: u64 },
}

impl SourceRef {
    /// Parse and normalize a raw source reference.
    ///
    /// Returns `InvalidSource` for empty input, unparsable URLs, unsupported
    /// schemes, http(s) URLs without a host and malformed turn references.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::InvalidSource("empty source reference".into()));
        }

        if trimmed
            .get(..TURN_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(TURN_PREFIX))
        {
            let rest = trimmed.get(TURN_PREFIX.len()..).unwrap_or_default();
            return Self::parse_turn(rest);
        }

        let url = Url::parse(trimmed)
            .map_err(|e| MemoryError::InvalidSource(format!("{trimmed}: {e}")))?;
        normalize_url(url).map(SourceRef::Url)
    }

    fn parse_turn(rest: &str) -> Result<Self> {
        let (conversation_id, turn) = rest.rsplit_once(':').ok_or_else(|| {
            MemoryError::InvalidSource(format!(
                "turn reference must look like turn:<conversation>:<n>, got turn:{rest}"
            ))
        })?;

        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty()
            || conversation_id.len() > MAX_CONVERSATION_ID_LEN
            || !conversation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(MemoryError::InvalidSource(format!(
                "invalid conversation id in turn reference: {conversation_id:?}"
            )));
        }

        let turn = turn.trim().parse::<u64>().map_err(|_| {
            MemoryError::InvalidSource(format!("invalid turn number: {turn:?}"))
        })?;

        Ok(SourceRef::Turn {
            conversation_id: conversation_id.to_string(),
            turn,
        })
    }

    /// Canonical string form; equal sources always render identically
    pub fn canonical(&self) -> String {
        match self {
            SourceRef::Url(url) => url.as_str().to_string(),
            SourceRef::Turn {
                conversation_id,
                turn,
            } => format!("{TURN_PREFIX}{conversation_id}:{turn}"),
        }
    }

    /// Host of a URL source, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            SourceRef::Url(url) => url.host_str(),
            SourceRef::Turn { .. } => None,
        }
    }

    /// Short label used in content ids
    pub fn slug(&self) -> String {
        match self {
            SourceRef::Turn { .. } => "turn".to_string(),
            SourceRef::Url(url) => match url.host_str() {
                Some(host) => {
                    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
                    let label = if labels.len() >= 2 {
                        labels[labels.len() - 2]
                    } else {
                        labels.first().copied().unwrap_or("web")
                    };
                    label
                        .chars()
                        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                        .collect()
                }
                None => url.scheme().to_string(),
            },
        }
    }
}

impl FromStr for SourceRef {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        SourceRef::parse(s)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn normalize_url(mut url: Url) -> Result<Url> {
    match url.scheme() {
        "http" | "https" => {
            if url.host_str().is_none_or(str::is_empty) {
                return Err(MemoryError::InvalidSource(format!("{url}: missing host")));
            }
        }
        "file" => {}
        other => {
            return Err(MemoryError::InvalidSource(format!(
                "unsupported scheme {other:?}"
            )));
        }
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        url.set_path(&trimmed);
    }

    Ok(url)
}

/// Derive the fingerprint of a parsed source plus caller-supplied parameters
pub fn fingerprint_source(source: &SourceRef, params: &[(String, String)]) -> Fingerprint {
    let mut canonical = source.canonical();

    if !params.is_empty() {
        let mut params: Vec<(&str, &str)> =
            params.iter().map(|(k, v)| (k.trim(), v.trim())).collect();
        params.sort();
        let joined = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        canonical.push_str("\x1fparams:");
        canonical.push_str(&joined);
    }

    let digest = Sha256::digest(canonical.as_bytes());
    Fingerprint(hex::encode(digest))
}

/// Parse a raw source reference and derive its fingerprint
pub fn fingerprint(source_ref: &str, params: &[(String, String)]) -> Result<Fingerprint> {
    let source = SourceRef::parse(source_ref)?;
    Ok(fingerprint_source(&source, params))
}
