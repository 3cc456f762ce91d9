//! Classification of streamed log records into activity signals.
//!
//! All substring and token matching against log text lives here.

use serde::Deserialize;

use mission_core::observation::RawSignal;

/// Fields pulled out of a recognized line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFields {
    /// Explicit `agent=` / `agentId=` tag.
    pub agent: Option<String>,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub tool: Option<String>,
}

/// What a single log line says about agent activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSignal {
    RunStart(LineFields),
    RunEnd(LineFields),
    ToolCall(LineFields),
    Unrecognized,
}

impl LogSignal {
    pub fn raw_signal(&self) -> Option<RawSignal> {
        match self {
            Self::RunStart(_) => Some(RawSignal::RunStart),
            Self::RunEnd(_) => Some(RawSignal::RunEnd),
            Self::ToolCall(_) => Some(RawSignal::ToolCall),
            Self::Unrecognized => None,
        }
    }

    pub fn fields(&self) -> Option<&LineFields> {
        match self {
            Self::RunStart(f) | Self::RunEnd(f) | Self::ToolCall(f) => Some(f),
            Self::Unrecognized => None,
        }
    }
}

const TOOL_PATTERNS: &[&str] = &["tool start", "tool_start", "tool call", "tool_call"];
const RUN_END_PATTERNS: &[&str] = &[
    "run done",
    "run end",
    "run_end",
    "run complete",
    "run finished",
];
const RUN_START_PATTERNS: &[&str] = &["run start", "run_start"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default, alias = "agent")]
    agent_id: Option<String>,
}

/// Parse one JSON line. Returns `None` for malformed lines or records
/// without a `message` string.
pub fn classify_line(line: &str) -> Option<LogSignal> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let record: LogRecord = serde_json::from_str(line).ok()?;
    let mut signal = classify_message(&record.message);
    if let LogSignal::RunStart(f) | LogSignal::RunEnd(f) | LogSignal::ToolCall(f) = &mut signal {
        if f.session_id.is_none() {
            f.session_id = record.session_id.filter(|s| !s.is_empty());
        }
        if f.agent.is_none() {
            f.agent = record.agent_id.filter(|s| !s.is_empty());
        }
    }
    Some(signal)
}

/// Classify a log message by its recognizable substrings. Tool patterns are
/// checked first since tool lines also mention the enclosing run.
pub fn classify_message(message: &str) -> LogSignal {
    let lower = message.to_ascii_lowercase();
    let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    let build = || LineFields {
        agent: token_value(message, "agent").or_else(|| token_value(message, "agentId")),
        session_id: token_value(message, "sessionId"),
        model: token_value(message, "model"),
        tool: token_value(message, "tool"),
    };

    if has(TOOL_PATTERNS) {
        LogSignal::ToolCall(build())
    } else if has(RUN_END_PATTERNS) {
        LogSignal::RunEnd(build())
    } else if has(RUN_START_PATTERNS) {
        LogSignal::RunStart(build())
    } else {
        LogSignal::Unrecognized
    }
}

/// Value of a `key=value` token, where `key` starts a word and the value
/// runs to the next whitespace or delimiter. Surrounding quotes are stripped.
pub fn token_value(message: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=");
    let mut from = 0;
    while let Some(pos) = message[from..].find(&needle) {
        let start = from + pos;
        let at_boundary = message[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        let value_start = start + needle.len();
        if at_boundary {
            let rest = &message[value_start..];
            let end = rest
                .find(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ')' | ']' | '}'))
                .unwrap_or(rest.len());
            let value = rest[..end].trim_matches(|c| c == '"' || c == '\'');
            return (!value.is_empty()).then(|| value.to_string());
        }
        from = value_start;
    }
    None
}
