//! Work items and label normalization

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix shared by every item label
const LABEL_PREFIX: &str = "Item #";

/// A unit of work flowing through the pipeline
///
/// The identity is a 1-based sequence number. `attempt` is the retry
/// annotation carried in the label: `0` for a fresh item, `k` for the k-th
/// retry. Every attempt of the same logical item shares one
/// [`normalized key`](WorkItem::key).
///
/// Labels that don't follow the `Item #<id>` grammar are kept verbatim in
/// `raw` so they can still be tracked (they normalize to themselves).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    id: u64,
    attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

impl WorkItem {
    /// Create a fresh item with the given sequence number
    pub fn new(id: u64) -> Self {
        Self {
            id,
            attempt: 0,
            raw: None,
        }
    }

    /// Parse a label produced by [`WorkItem::label`]
    ///
    /// Accepts `Item #<id>` and `Item #<id> (retry <k>)`. Anything else is
    /// kept as an opaque label whose key is the label itself.
    pub fn parse(label: &str) -> Self {
        match parse_label(label) {
            Some((id, attempt)) => Self {
                id,
                attempt,
                raw: None,
            },
            None => Self {
                id: 0,
                attempt: 0,
                raw: Some(label.to_string()),
            },
        }
    }

    /// Sequence number of the logical item
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Retry annotation (0 for a fresh item)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Same logical item, relabelled for the given retry attempt
    pub fn retry(&self, attempt: u32) -> Self {
        Self {
            id: self.id,
            attempt,
            raw: self.raw.clone(),
        }
    }

    /// Display label, including any retry suffix
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Normalized key used for all retry bookkeeping
    pub fn key(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => format!("{LABEL_PREFIX}{}", self.id),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(raw) = &self.raw {
            return f.write_str(raw);
        }
        match self.attempt {
            0 => write!(f, "{LABEL_PREFIX}{}", self.id),
            n => write!(f, "{LABEL_PREFIX}{} (retry {n})", self.id),
        }
    }
}

/// Strip any retry suffix from a label
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(label: &str) -> String {
    WorkItem::parse(label).key()
}

fn parse_label(label: &str) -> Option<(u64, u32)> {
    let rest = label.strip_prefix(LABEL_PREFIX)?;
    let (id, suffix) = match rest.find(' ') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    };
    let id = id.parse().ok()?;

    if suffix.is_empty() {
        return Some((id, 0));
    }

    let attempt = suffix
        .strip_prefix(" (retry ")?
        .strip_suffix(')')?
        .parse()
        .ok()?;
    Some((id, attempt))
}
