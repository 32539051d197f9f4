// Document ID Generator - ObjectId-style 96-bit identifiers rendered as 24 hex characters
// Layout: [unix_seconds:32][node:40][sequence:24]

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{AppError, AppResult};

static DOC_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("valid document id pattern"));

/// Identifier of a stored document. Always 24 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(String);

impl DocId {
    /// Parse a client-supplied identifier, rejecting anything that is not 24 hex characters.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if DOC_ID_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(AppError::Validation(format!("Invalid ID format: '{}'", raw)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Seconds since the Unix epoch embedded in the id.
    pub fn timestamp_secs(&self) -> u32 {
        u32::from_str_radix(&self.0[..8], 16).unwrap_or(0)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DocId::parse(&value)
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> Self {
        id.0
    }
}

impl std::str::FromStr for DocId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocId::parse(s)
    }
}

#[derive(Debug)]
pub struct IdGenerator {
    node: u64,
    sequence: AtomicU32,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Create a generator with a random 40-bit node identifier and random starting sequence.
    pub fn new() -> Self {
        let mut rng = rand::rng();
        Self {
            node: rng.random::<u64>() & 0xFF_FFFF_FFFF,
            sequence: AtomicU32::new(rng.random::<u32>() & 0xFF_FFFF),
        }
    }

    pub fn with_node(node: u64) -> Self {
        Self {
            node: node & 0xFF_FFFF_FFFF,
            sequence: AtomicU32::new(0),
        }
    }

    pub fn next_id(&self) -> DocId {
        let secs = chrono::Utc::now().timestamp().max(0) as u32;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) & 0xFF_FFFF;
        DocId(format!("{:08x}{:010x}{:06x}", secs, self.node, sequence))
    }

    pub fn node(&self) -> u64 {
        self.node
    }
}
