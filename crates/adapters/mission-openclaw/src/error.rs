use std::time::Duration;

/// Failures talking to the upstream CLI. All of them are transient: the
/// poller degrades the agent to "no session" and the tail restarts.
#[derive(Debug)]
pub enum SourceError {
    EmptyCommand,
    Spawn(std::io::Error),
    Io(std::io::Error),
    Timeout(Duration),
    ExitStatus { code: Option<i32>, stderr: String },
    Parse(serde_json::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCommand => write!(f, "command is empty"),
            Self::Spawn(e) => write!(f, "failed to spawn command: {e}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Timeout(d) => write!(f, "command timed out after {}ms", d.as_millis()),
            Self::ExitStatus { code, stderr } => match code {
                Some(c) => write!(f, "command exited with status {c}: {stderr}"),
                None => write!(f, "command terminated by signal: {stderr}"),
            },
            Self::Parse(e) => write!(f, "unparseable output: {e}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) | Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}
