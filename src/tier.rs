//! Cost/quality tiers for agent execution.
//!
//! A tier is a coarse cost class: `Cheap` < `Capable` < `Premium`, increasing
//! in both unit cost and expected output quality. Tier fallback and the
//! meta-orchestrator's cost estimates both run on these three values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cost/quality class for an agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Fast, low-cost execution. First choice for tier fallback.
    Cheap,
    /// Mid-range execution quality.
    Capable,
    /// Highest quality, highest cost. Last resort for tier fallback.
    Premium,
}

impl Tier {
    /// All tiers in strict escalation order.
    pub const ALL: [Tier; 3] = [Tier::Cheap, Tier::Capable, Tier::Premium];

    /// Flat unit cost for one invocation at this tier.
    pub fn unit_cost(&self) -> f64 {
        match self {
            Tier::Cheap => 1.0,
            Tier::Capable => 3.0,
            Tier::Premium => 10.0,
        }
    }

    /// The next tier up, or `None` when already at `Premium`.
    ///
    /// Escalation is strictly one-directional; there is no de-escalation.
    pub fn escalate(&self) -> Option<Tier> {
        match self {
            Tier::Cheap => Some(Tier::Capable),
            Tier::Capable => Some(Tier::Premium),
            Tier::Premium => None,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Cheap
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Cheap => write!(f, "cheap"),
            Tier::Capable => write!(f, "capable"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cheap" => Ok(Tier::Cheap),
            "capable" => Ok(Tier::Capable),
            "premium" => Ok(Tier::Premium),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Cheap < Tier::Capable);
        assert!(Tier::Capable < Tier::Premium);
    }

    #[test]
    fn test_tier_escalation_chain() {
        assert_eq!(Tier::Cheap.escalate(), Some(Tier::Capable));
        assert_eq!(Tier::Capable.escalate(), Some(Tier::Premium));
        assert_eq!(Tier::Premium.escalate(), None);
    }

    #[test]
    fn test_tier_unit_costs() {
        assert_eq!(Tier::Cheap.unit_cost(), 1.0);
        assert_eq!(Tier::Capable.unit_cost(), 3.0);
        assert_eq!(Tier::Premium.unit_cost(), 10.0);
    }

    #[test]
    fn test_tier_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(tier.to_string().parse::<Tier>(), Ok(tier));
        }
    }
}
