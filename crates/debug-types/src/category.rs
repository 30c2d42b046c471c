use serde::{Deserialize, Serialize};

/// Error taxonomy used by the pattern-based classifier and the pattern
/// store's naive-Bayes fallback. Variants line up 1:1 with the regex
/// table in `debug_core::classifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Type,
    Import,
    Attribute,
    Name,
    Index,
    Value,
    Runtime,
    Memory,
    Permission,
    Assertion,
    Network,
    Database,
    Unknown,
}

impl ErrorCategory {
    /// All categories in the stable order used when iterating the regex
    /// table and when the pattern store needs a canonical category list.
    pub const ALL: [ErrorCategory; 14] = [
        Self::Syntax,
        Self::Type,
        Self::Import,
        Self::Attribute,
        Self::Name,
        Self::Index,
        Self::Value,
        Self::Runtime,
        Self::Memory,
        Self::Permission,
        Self::Assertion,
        Self::Network,
        Self::Database,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Type => "type",
            Self::Import => "import",
            Self::Attribute => "attribute",
            Self::Name => "name",
            Self::Index => "index",
            Self::Value => "value",
            Self::Runtime => "runtime",
            Self::Memory => "memory",
            Self::Permission => "permission",
            Self::Assertion => "assertion",
            Self::Network => "network",
            Self::Database => "database",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "syntax" => Some(Self::Syntax),
            "type" => Some(Self::Type),
            "import" => Some(Self::Import),
            "attribute" => Some(Self::Attribute),
            "name" => Some(Self::Name),
            "index" => Some(Self::Index),
            "value" => Some(Self::Value),
            "runtime" => Some(Self::Runtime),
            "memory" => Some(Self::Memory),
            "permission" => Some(Self::Permission),
            "assertion" => Some(Self::Assertion),
            "network" => Some(Self::Network),
            "database" => Some(Self::Database),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl Default for ErrorCategory {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
