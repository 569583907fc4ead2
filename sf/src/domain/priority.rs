//! Priority levels for stories and tasks

use serde::{Deserialize, Serialize};

/// Priority level carried by stories and tasks
///
/// Anything the model emits outside high/medium/low is kept verbatim in
/// `Unknown` so validation can report it instead of silently coercing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
    Unknown(String),
}

impl Priority {
    /// True for the three recognised levels
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown(s),
        }
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.to_string()
    }
}
