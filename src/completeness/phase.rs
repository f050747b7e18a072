//! Phase derivation.
//!
//! The phase is never stored as an independent fact: it is recomputed from
//! the flags and counters on every write, so two records with equal inputs
//! always carry equal phases no matter how they got there.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ingestion phase, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing beyond the entity itself is known.
    Discovery,
    /// Positions (appointments, courts served) are loaded.
    Positions,
    /// Biographical details (education or affiliations) are loaded.
    Details,
    /// At least one opinion is loaded.
    Opinions,
    /// At least one docket is loaded.
    Dockets,
    /// Every flag is set and both opinion and docket counts are positive.
    Complete,
}

impl Phase {
    /// All phases in forward order.
    pub const ALL: [Self; 6] = [
        Self::Discovery,
        Self::Positions,
        Self::Details,
        Self::Opinions,
        Self::Dockets,
        Self::Complete,
    ];

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Positions => "positions",
            Self::Details => "details",
            Self::Opinions => "opinions",
            Self::Dockets => "dockets",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown phase: {s}"))
    }
}

/// Boolean readiness flags, one per ingestion sub-phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadinessFlags {
    pub has_positions: bool,
    pub has_education: bool,
    pub has_political_affiliations: bool,
}

impl ReadinessFlags {
    /// Returns true when every flag is set.
    #[must_use]
    pub const fn all(&self) -> bool {
        self.has_positions && self.has_education && self.has_political_affiliations
    }
}

/// Cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub opinions_count: u64,
    pub dockets_count: u64,
    pub total_cases_count: u64,
}

/// Derived state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedState {
    pub phase: Phase,
    pub is_complete: bool,
    pub is_analytics_ready: bool,
}

/// Phase implied by a snapshot of flags and counters.
#[must_use]
pub const fn derive_phase(flags: &ReadinessFlags, counters: &ProgressCounters) -> Phase {
    if flags.all() && counters.opinions_count > 0 && counters.dockets_count > 0 {
        Phase::Complete
    } else if counters.dockets_count > 0 {
        Phase::Dockets
    } else if counters.opinions_count > 0 {
        Phase::Opinions
    } else if flags.has_education || flags.has_political_affiliations {
        Phase::Details
    } else if flags.has_positions {
        Phase::Positions
    } else {
        Phase::Discovery
    }
}

/// Full derived state. Analytics readiness depends only on the case count,
/// never on the phase.
#[must_use]
pub const fn derive(
    flags: &ReadinessFlags,
    counters: &ProgressCounters,
    ready_threshold: u64,
) -> DerivedState {
    let phase = derive_phase(flags, counters);
    DerivedState {
        phase,
        is_complete: matches!(phase, Phase::Complete),
        is_analytics_ready: counters.total_cases_count >= ready_threshold,
    }
}
