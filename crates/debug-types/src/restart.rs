use serde::{Deserialize, Serialize};

/// Escalation path chosen by Tier 3 (strategic restart) once quick-fix and
/// full-debug attempts for an error category have been exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    RegenerateCode,
    RedesignPlan,
    ModifyRequest,
}

impl RestartStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegenerateCode => "regenerate_code",
            Self::RedesignPlan => "redesign_plan",
            Self::ModifyRequest => "modify_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regenerate_code" => Some(Self::RegenerateCode),
            "redesign_plan" => Some(Self::RedesignPlan),
            "modify_request" => Some(Self::ModifyRequest),
            _ => None,
        }
    }
}

impl std::fmt::Display for RestartStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        for strategy in [
            RestartStrategy::RegenerateCode,
            RestartStrategy::RedesignPlan,
            RestartStrategy::ModifyRequest,
        ] {
            assert_eq!(RestartStrategy::parse(strategy.as_str()), Some(strategy));
        }
    }
}
