use serde::Serialize;

/// Routing profile selected by the requested model name
///
/// `free|eco|auto|premium` are the only profile names; an agentic
/// sub-table of `auto` engages via the classifier's agentic sub-score,
/// never via an explicit profile name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProfile {
    Free,
    Eco,
    Auto,
    Premium,
}

impl RoutingProfile {
    /// Parse a resolved model name as a profile, if it is one
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "free" => Some(Self::Free),
            "eco" => Some(Self::Eco),
            "auto" => Some(Self::Auto),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Eco => "eco",
            Self::Auto => "auto",
            Self::Premium => "premium",
        }
    }
}

impl std::fmt::Display for RoutingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
