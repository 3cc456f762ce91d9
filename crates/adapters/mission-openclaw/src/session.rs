use serde::Deserialize;

use crate::error::SourceError;

/// `updatedAt` as reported upstream: epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SessionTimestamp {
    Millis(u64),
    Text(String),
}

impl SessionTimestamp {
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok()),
        }
    }
}

/// One entry from the session-listing command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, alias = "id", alias = "session_id")]
    pub session_id: Option<String>,
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<SessionTimestamp>,
    #[serde(default, alias = "age_ms", alias = "age")]
    pub age_ms: Option<u64>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Session {
    /// Age relative to `now_ms`; a direct `ageMs` wins over `updatedAt`.
    pub fn age_at(&self, now_ms: u64) -> Option<u64> {
        self.age_ms.or_else(|| {
            self.updated_at
                .as_ref()
                .and_then(SessionTimestamp::as_millis)
                .map(|updated| now_ms.saturating_sub(updated))
        })
    }

    /// Short task label for the board.
    pub fn label(&self) -> Option<String> {
        self.key
            .clone()
            .or_else(|| self.kind.clone())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionsOutput {
    List(Vec<Session>),
    Wrapped { sessions: Vec<Session> },
}

/// Parse the command's stdout. Blank output means no sessions.
pub fn parse_sessions(stdout: &str) -> Result<Vec<Session>, SourceError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: SessionsOutput = serde_json::from_str(trimmed).map_err(SourceError::Parse)?;
    Ok(match parsed {
        SessionsOutput::List(sessions) | SessionsOutput::Wrapped { sessions } => sessions,
    })
}

/// The most recently touched session and its age. Sessions with no usable
/// timestamp are skipped.
pub fn latest_session(sessions: &[Session], now_ms: u64) -> Option<(&Session, u64)> {
    sessions
        .iter()
        .filter_map(|s| s.age_at(now_ms).map(|age| (s, age)))
        .min_by_key(|(_, age)| *age)
}
