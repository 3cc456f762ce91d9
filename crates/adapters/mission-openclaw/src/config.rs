use serde::Deserialize;

/// Placeholder in `sessions_command` replaced by the agent's store path.
pub const STORE_PLACEHOLDER: &str = "{store}";

/// Placeholder in `store_template` replaced by the agent name.
pub const AGENT_PLACEHOLDER: &str = "{agent}";

/// Configuration for the OpenClaw-backed signal sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenClawConfig {
    /// Session-listing command as argv; `{store}` expands per agent.
    pub sessions_command: Vec<String>,
    /// Per-agent session store location; `{agent}` expands to the name and a
    /// leading `~/` to `$HOME`.
    pub store_template: String,
    /// Long-lived log tail command as argv, emitting one JSON object per line.
    pub logs_command: Vec<String>,
    pub poll_interval_ms: u64,
    /// Session commands slower than this count as "no session" for the tick.
    pub poll_timeout_ms: u64,
    /// Delay before restarting the log tail after it exits.
    pub restart_backoff_ms: u64,
    /// Agent credited with log lines that name no known agent or session.
    pub fallback_agent: String,
}

impl Default for OpenClawConfig {
    fn default() -> Self {
        Self {
            sessions_command: ["openclaw", "sessions", "--json", "--store", STORE_PLACEHOLDER]
                .map(String::from)
                .to_vec(),
            store_template: "~/.openclaw/agents/{agent}/sessions/sessions.json".to_string(),
            logs_command: ["openclaw", "logs", "--follow", "--json"]
                .map(String::from)
                .to_vec(),
            poll_interval_ms: 2000,
            poll_timeout_ms: 1500,
            restart_backoff_ms: 1500,
            fallback_agent: "main".to_string(),
        }
    }
}

impl OpenClawConfig {
    /// Resolve the store path for one agent.
    pub fn store_for(&self, agent: &str) -> String {
        let path = self.store_template.replace(AGENT_PLACEHOLDER, agent);
        match (path.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) if !home.is_empty() => {
                format!("{}/{rest}", home.trim_end_matches('/'))
            },
            _ => path,
        }
    }

    /// Session-listing argv for one agent with placeholders expanded.
    pub fn sessions_argv(&self, agent: &str) -> Vec<String> {
        let store = self.store_for(agent);
        self.sessions_command
            .iter()
            .map(|arg| arg.replace(STORE_PLACEHOLDER, &store))
            .collect()
    }

    /// Point both commands at a different binary (e.g. `OPENCLAW_BIN`).
    pub fn with_binary(mut self, bin: &str) -> Self {
        if let Some(first) = self.sessions_command.first_mut() {
            *first = bin.to_string();
        }
        if let Some(first) = self.logs_command.first_mut() {
            *first = bin.to_string();
        }
        self
    }
}

/// Configuration for the development demo ticker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub interval_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { interval_ms: 8000 }
    }
}
