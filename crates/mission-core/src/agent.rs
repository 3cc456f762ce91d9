use serde::{Deserialize, Serialize};

/// Human-legible activity status shown for each agent.
///
/// `Blocked` and `Done` cannot be derived from signals; they only arrive
/// through manual overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Thinking,
    RunningTool,
    Blocked,
    Done,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Thinking => "thinking",
            Self::RunningTool => "running_tool",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }

    /// Statuses only an operator can set.
    pub fn is_manual_only(self) -> bool {
        matches!(self, Self::Blocked | Self::Done)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of the last accepted update to an agent record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    #[default]
    Bootstrap,
    Poll,
    Events,
    Manual,
}

/// The published record for one roster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub status: AgentStatus,
    pub task: String,
    #[serde(default)]
    pub model: String,
    /// Milliseconds since the Unix epoch of the last accepted change.
    pub updated_at: u64,
    pub source: UpdateSource,
}

impl Agent {
    /// Startup record: idle, sourced from bootstrap.
    pub fn bootstrap(now_ms: u64) -> Self {
        Self {
            status: AgentStatus::Idle,
            task: "Waiting".to_string(),
            model: String::new(),
            updated_at: now_ms,
            source: UpdateSource::Bootstrap,
        }
    }

    /// True when status, task or model differ from `other`.
    pub fn differs_from(&self, other: &Agent) -> bool {
        self.status != other.status || self.task != other.task || self.model != other.model
    }
}

/// Maximum length accepted for free-text patch fields.
pub const DEFAULT_MAX_FIELD_LEN: usize = 256;

/// Partial agent update supplied by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentPatch {
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    Empty,
    TooLong { field: &'static str, max: usize },
    ControlChars { field: &'static str },
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "patch must set at least one of status, task, model"),
            Self::TooLong { field, max } => write!(f, "{field} exceeds {max} chars"),
            Self::ControlChars { field } => write!(f, "{field} contains control characters"),
        }
    }
}

impl std::error::Error for PatchError {}

impl AgentPatch {
    pub fn validate(&self, max_field_len: usize) -> Result<(), PatchError> {
        if self.status.is_none() && self.task.is_none() && self.model.is_none() {
            return Err(PatchError::Empty);
        }
        for (field, value) in [("task", &self.task), ("model", &self.model)] {
            let Some(value) = value else { continue };
            if value.len() > max_field_len {
                return Err(PatchError::TooLong {
                    field,
                    max: max_field_len,
                });
            }
            if value.chars().any(char::is_control) {
                return Err(PatchError::ControlChars { field });
            }
        }
        Ok(())
    }

    /// Apply the patch on top of `current`, producing the next record.
    pub fn apply_to(&self, current: &Agent, now_ms: u64) -> Agent {
        Agent {
            status: self.status.unwrap_or(current.status),
            task: self.task.clone().unwrap_or_else(|| current.task.clone()),
            model: self.model.clone().unwrap_or_else(|| current.model.clone()),
            updated_at: now_ms,
            source: UpdateSource::Manual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    Empty,
    InvalidName(String),
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "roster must contain at least one agent"),
            Self::InvalidName(name) => write!(f, "invalid agent name: {name:?}"),
        }
    }
}

impl std::error::Error for RosterError {}

/// The fixed, ordered list of tracked agent identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    names: Vec<String>,
}

impl Roster {
    /// Build a roster, trimming names and dropping duplicates (first wins).
    pub fn new<I, S>(names: I) -> Result<Self, RosterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || name.len() > 64 || name.chars().any(|c| c.is_control()) {
                return Err(RosterError::InvalidName(name.to_string()));
            }
            if out.iter().any(|n| n == name) {
                tracing::warn!(agent = name, "Duplicate roster entry ignored");
                continue;
            }
            out.push(name.to_string());
        }
        if out.is_empty() {
            return Err(RosterError::Empty);
        }
        Ok(Self { names: out })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
