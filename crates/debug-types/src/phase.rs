use serde::{Deserialize, Serialize};

/// A stage in the debugging episode state machine, recorded on each
/// `DebugAttempt` so the orchestrator and scratchpad can reconstruct
/// how an episode escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebuggingPhase {
    Analysis,
    QuickFix,
    FullDebug,
    StrategicRestart,
}

impl DebuggingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::QuickFix => "quick_fix",
            Self::FullDebug => "full_debug",
            Self::StrategicRestart => "strategic_restart",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(Self::Analysis),
            "quick_fix" => Some(Self::QuickFix),
            "full_debug" => Some(Self::FullDebug),
            "strategic_restart" => Some(Self::StrategicRestart),
            _ => None,
        }
    }
}

impl std::fmt::Display for DebuggingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        for phase in [
            DebuggingPhase::Analysis,
            DebuggingPhase::QuickFix,
            DebuggingPhase::FullDebug,
            DebuggingPhase::StrategicRestart,
        ] {
            assert_eq!(DebuggingPhase::parse(phase.as_str()), Some(phase));
        }
    }
}
