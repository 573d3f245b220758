use serde::{Deserialize, Serialize};

/// Complexity tier a request is classified into
///
/// The total order `Simple < Medium < Complex < Reasoning` is load-bearing:
/// minimum-tier overrides (structured output, oversized input) only ever
/// raise a tier, never lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Simple,
    Medium,
    Complex,
    Reasoning,
}

impl Tier {
    /// All tiers in ascending order
    pub const ALL: [Self; 4] = [Self::Simple, Self::Medium, Self::Complex, Self::Reasoning];

    /// Raise to `floor` if currently below it
    pub fn at_least(self, floor: Self) -> Self {
        self.max(floor)
    }

    /// Short lowercase name used in reasoning strings and logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::Reasoning => "reasoning",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
