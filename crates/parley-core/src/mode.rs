//! Interaction modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Interaction mode of a conversation session.
///
/// Exactly one mode is active at a time. `Hybrid` keeps both the guided
/// and the agentic sub-states alive and routes work between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Scripted, phase-by-phase requirement gathering
    #[default]
    Guided,
    /// Autonomous task execution with optional approval gating
    Agentic,
    /// Guided and agentic sub-systems both active
    Hybrid,
}

impl Mode {
    /// All modes, in declaration order.
    pub const ALL: [Mode; 3] = [Mode::Guided, Mode::Agentic, Mode::Hybrid];

    /// Lowercase name, as used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Guided => "guided",
            Mode::Agentic => "agentic",
            Mode::Hybrid => "hybrid",
        }
    }

    /// Whether the guided sub-state is active in this mode.
    pub fn includes_guided(&self) -> bool {
        matches!(self, Mode::Guided | Mode::Hybrid)
    }

    /// Whether the agentic sub-state is active in this mode.
    pub fn includes_agentic(&self) -> bool {
        matches!(self, Mode::Agentic | Mode::Hybrid)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guided" => Ok(Mode::Guided),
            "agentic" => Ok(Mode::Agentic),
            "hybrid" => Ok(Mode::Hybrid),
            other => Err(format!(
                "Unknown mode '{}'. Valid values: guided, agentic, hybrid",
                other
            )),
        }
    }
}
