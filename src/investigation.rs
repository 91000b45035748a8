//! Investigation identity and metadata.
//!
//! Every record in the system is scoped to an investigation; the
//! [`InvestigationId`] appears in the primary key of every store and as the
//! correlation key on every bus payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvestigationId(pub Uuid);

impl InvestigationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its string form (as carried on bus payloads).
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for InvestigationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An investigation: one objective and the run that pursues it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: InvestigationId,
    /// Natural-language objective the run decomposes and pursues.
    pub objective: String,
    pub started_at: DateTime<Utc>,
}

impl Investigation {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            id: InvestigationId::new(),
            objective: objective.into(),
            started_at: Utc::now(),
        }
    }
}
