use serde::Deserialize;

use mission_core::agent::{DEFAULT_MAX_FIELD_LEN, Roster, RosterError};
use mission_core::derive::StatusWindows;
use mission_core::smoothing::DEFAULT_THINKING_PROMOTION;
use mission_openclaw::{DemoConfig, OpenClawConfig};

use crate::engine::EngineSettings;

/// Config file read from the working directory unless `MISSION_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "mission-control.toml";

/// Top-level server configuration, loaded from `mission-control.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    /// Agents shown on the board, in display order.
    pub roster: Vec<String>,
    pub status: StatusConfig,
    pub limits: LimitsConfig,
    pub source: SourceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8787".to_string(),
            web_root: "web".to_string(),
            roster: ["main", "dev-bot", "research-bot", "ops-bot"]
                .map(String::from)
                .to_vec(),
            status: StatusConfig::default(),
            limits: LimitsConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

/// Status derivation and smoothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub busy_window_ms: u64,
    pub thinking_window_ms: u64,
    /// Consecutive poll readings needed before `thinking` is published.
    pub thinking_promotion: u32,
    /// How long an operator-set `blocked` or `done` shadows poll updates.
    /// Zero disables.
    pub manual_hold_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        let windows = StatusWindows::default();
        Self {
            busy_window_ms: windows.busy_window_ms,
            thinking_window_ms: windows.thinking_window_ms,
            thinking_promotion: DEFAULT_THINKING_PROMOTION,
            manual_hold_ms: 60_000,
        }
    }
}

impl StatusConfig {
    pub fn windows(&self) -> StatusWindows {
        StatusWindows {
            busy_window_ms: self.busy_window_ms,
            thinking_window_ms: self.thinking_window_ms,
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_stored_events: usize,
    pub broadcast_capacity: usize,
    /// Depth of the engine's command and observation queues.
    pub engine_queue: usize,
    pub max_ws_connections: usize,
    pub max_sse_subscribers: usize,
    /// Longest accepted `task` or `model` in a manual override.
    pub max_field_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_stored_events: 200,
            broadcast_capacity: 1024,
            engine_queue: 1024,
            max_ws_connections: 200,
            max_sse_subscribers: 100,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SourceKind {
    #[default]
    #[serde(rename = "openclaw")]
    OpenClaw,
    #[serde(rename = "demo")]
    Demo,
    /// No signal sources; only manual overrides change state.
    #[serde(rename = "none")]
    Disabled,
}

impl std::str::FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openclaw" => Ok(Self::OpenClaw),
            "demo" => Ok(Self::Demo),
            "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

/// Which signal source feeds the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub openclaw: OpenClawConfig,
    pub demo: DemoConfig,
}

/// Accepted bounds for `limits.max_stored_events`.
pub const STORED_EVENTS_RANGE: std::ops::RangeInclusive<usize> = 200..=400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidListenAddr(String),
    Roster(RosterError),
    /// `busy_window_ms` must be below `thinking_window_ms`.
    WindowOrder { busy: u64, thinking: u64 },
    /// A value that must be positive is zero.
    Zero(&'static str),
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
    /// A command line with no program.
    EmptyCommand(&'static str),
    UnknownSource(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListenAddr(addr) => {
                write!(f, "listen_addr {addr:?} is not a valid socket address")
            },
            Self::Roster(e) => write!(f, "invalid roster: {e}"),
            Self::WindowOrder { busy, thinking } => write!(
                f,
                "status.busy_window_ms ({busy}) must be less than status.thinking_window_ms ({thinking})"
            ),
            Self::Zero(field) => write!(f, "{field} must be > 0"),
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} ({value}) must be between {min} and {max}"),
            Self::EmptyCommand(field) => write!(f, "{field} must name a program"),
            Self::UnknownSource(kind) => {
                write!(f, "unknown source kind {kind:?} (expected openclaw, demo or none)")
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Roster(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RosterError> for ConfigError {
    fn from(e: RosterError) -> Self {
        Self::Roster(e)
    }
}

impl ServerConfig {
    /// Check everything startup depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }
        self.roster()?;

        if !self.status.windows().is_ordered() {
            return Err(ConfigError::WindowOrder {
                busy: self.status.busy_window_ms,
                thinking: self.status.thinking_window_ms,
            });
        }
        if self.status.thinking_promotion == 0 {
            return Err(ConfigError::Zero("status.thinking_promotion"));
        }

        if !STORED_EVENTS_RANGE.contains(&self.limits.max_stored_events) {
            return Err(ConfigError::OutOfRange {
                field: "limits.max_stored_events",
                value: self.limits.max_stored_events,
                min: *STORED_EVENTS_RANGE.start(),
                max: *STORED_EVENTS_RANGE.end(),
            });
        }

        let limits = [
            ("limits.broadcast_capacity", self.limits.broadcast_capacity),
            ("limits.engine_queue", self.limits.engine_queue),
            ("limits.max_ws_connections", self.limits.max_ws_connections),
            ("limits.max_sse_subscribers", self.limits.max_sse_subscribers),
            ("limits.max_field_len", self.limits.max_field_len),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*field));
        }

        match self.source.kind {
            SourceKind::OpenClaw => {
                let oc = &self.source.openclaw;
                if oc.poll_interval_ms == 0 {
                    return Err(ConfigError::Zero("source.openclaw.poll_interval_ms"));
                }
                if oc.poll_timeout_ms == 0 {
                    return Err(ConfigError::Zero("source.openclaw.poll_timeout_ms"));
                }
                if oc.sessions_command.is_empty() {
                    return Err(ConfigError::EmptyCommand("source.openclaw.sessions_command"));
                }
                if oc.logs_command.is_empty() {
                    return Err(ConfigError::EmptyCommand("source.openclaw.logs_command"));
                }
                if !self.roster.iter().any(|n| n.trim() == oc.fallback_agent) {
                    tracing::warn!(
                        fallback = %oc.fallback_agent,
                        "fallback_agent is not in the roster; unattributed log lines will be dropped"
                    );
                }
            },
            SourceKind::Demo => {
                if self.source.demo.interval_ms == 0 {
                    return Err(ConfigError::Zero("source.demo.interval_ms"));
                }
            },
            SourceKind::Disabled => {},
        }
        Ok(())
    }

    /// The validated roster.
    pub fn roster(&self) -> Result<Roster, ConfigError> {
        Ok(Roster::new(self.roster.iter().map(String::as_str))?)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            windows: self.status.windows(),
            thinking_promotion: self.status.thinking_promotion,
            manual_hold_ms: self.status.manual_hold_ms,
            max_stored_events: self.limits.max_stored_events,
            broadcast_capacity: self.limits.broadcast_capacity,
            queue_depth: self.limits.engine_queue,
        }
    }

    /// Load config from `mission-control.toml` (or `MISSION_CONFIG`) if it
    /// exists, then apply env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("MISSION_CONFIG")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(%path, "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(%path, "Failed to parse config: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(%path, "No config file found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var("MISSION_LISTEN_ADDR") {
            self.listen_addr = addr;
        } else if let Some(port) = var("PORT")
            && let Ok(port) = port.trim().parse::<u16>()
        {
            let host = self
                .listen_addr
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host);
            self.listen_addr = format!("{host}:{port}");
        }
        if let Some(root) = var("MISSION_WEB_ROOT") {
            self.web_root = root;
        }
        if let Some(roster) = var("MISSION_ROSTER") {
            self.roster = roster
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(kind) = var("MISSION_SOURCE") {
            self.source.kind = kind.parse()?;
        }
        if let Some(val) = var("MISSION_MAX_STORED_EVENTS")
            && let Ok(n) = val.trim().parse::<usize>()
        {
            self.limits.max_stored_events = n;
        }
        if let Some(bin) = var("OPENCLAW_BIN") {
            self.source.openclaw = self.source.openclaw.clone().with_binary(&bin);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8787");
        assert_eq!(cfg.web_root, "web");
        assert_eq!(cfg.roster, vec!["main", "dev-bot", "research-bot", "ops-bot"]);
        assert_eq!(cfg.source.kind, SourceKind::OpenClaw);
        assert_eq!(cfg.status.busy_window_ms, 25_000);
        assert_eq!(cfg.status.thinking_window_ms, 90_000);
        assert_eq!(cfg.status.thinking_promotion, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_limits_config() {
        let cfg = LimitsConfig::default();
        assert_eq!(cfg.max_stored_events, 200);
        assert_eq!(cfg.broadcast_capacity, 1024);
        assert_eq!(cfg.engine_queue, 1024);
        assert_eq!(cfg.max_ws_connections, 200);
        assert_eq!(cfg.max_sse_subscribers, 100);
        assert_eq!(cfg.max_field_len, 256);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"
web_root = "/var/www"
roster = ["alpha", "beta"]

[status]
busy_window_ms = 10000
thinking_window_ms = 60000
thinking_promotion = 3

[limits]
max_stored_events = 300

[source]
kind = "demo"

[source.demo]
interval_ms = 1000

[source.openclaw]
poll_interval_ms = 5000
fallback_agent = "alpha"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.roster, vec!["alpha", "beta"]);
        assert_eq!(cfg.status.windows().busy_window_ms, 10_000);
        assert_eq!(cfg.status.thinking_promotion, 3);
        assert_eq!(cfg.status.manual_hold_ms, 60_000);
        assert_eq!(cfg.limits.max_stored_events, 300);
        assert_eq!(cfg.limits.broadcast_capacity, 1024);
        assert_eq!(cfg.source.kind, SourceKind::Demo);
        assert_eq!(cfg.source.demo.interval_ms, 1000);
        assert_eq!(cfg.source.openclaw.poll_interval_ms, 5000);
        assert_eq!(cfg.source.openclaw.poll_timeout_ms, 1500);
        assert_eq!(cfg.source.openclaw.fallback_agent, "alpha");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: ServerConfig = toml::from_str(r#"listen_addr = "0.0.0.0:1""#).unwrap();
        assert_eq!(cfg.limits.max_ws_connections, 200);
        assert_eq!(cfg.roster.len(), 4);
        assert_eq!(cfg.source.demo.interval_ms, 8000);
    }

    #[test]
    fn source_kind_none_parses() {
        let cfg: ServerConfig = toml::from_str("[source]\nkind = \"none\"").unwrap();
        assert_eq!(cfg.source.kind, SourceKind::Disabled);
        assert!(toml::from_str::<ServerConfig>("[source]\nkind = \"bogus\"").is_err());
    }

    #[test]
    fn validate_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidListenAddr(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_roster() {
        let cfg = ServerConfig {
            roster: Vec::new(),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Roster(RosterError::Empty)));
    }

    #[test]
    fn validate_rejects_unordered_windows() {
        let mut cfg = ServerConfig::default();
        cfg.status.busy_window_ms = 90_000;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WindowOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = ServerConfig::default();
        cfg.status.thinking_promotion = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Zero("status.thinking_promotion"))
        );

        let mut cfg = ServerConfig::default();
        cfg.limits.max_sse_subscribers = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Zero("limits.max_sse_subscribers"))
        );

        let mut cfg = ServerConfig::default();
        cfg.source.openclaw.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());
        cfg.source.kind = SourceKind::Disabled;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_bounds_stored_events() {
        for (n, ok) in [(199, false), (200, true), (400, true), (401, false)] {
            let mut cfg = ServerConfig::default();
            cfg.limits.max_stored_events = n;
            assert_eq!(cfg.validate().is_ok(), ok, "max_stored_events = {n}");
        }
        let mut cfg = ServerConfig::default();
        cfg.limits.max_stored_events = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("between 200 and 400"), "{err}");
    }

    #[test]
    fn validate_rejects_empty_commands() {
        let mut cfg = ServerConfig::default();
        cfg.source.openclaw.logs_command.clear();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err, ConfigError::EmptyCommand("source.openclaw.logs_command"));
        assert_eq!(
            err.to_string(),
            "source.openclaw.logs_command must name a program"
        );

        let mut cfg = ServerConfig::default();
        cfg.source.openclaw.sessions_command.clear();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyCommand("source.openclaw.sessions_command"))
        );
    }

    #[test]
    fn env_overrides() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env(env(&[
            ("MISSION_LISTEN_ADDR", "127.0.0.1:1234"),
            ("MISSION_WEB_ROOT", "public"),
            ("MISSION_ROSTER", " a, b ,,c "),
            ("MISSION_SOURCE", "demo"),
            ("MISSION_MAX_STORED_EVENTS", "10"),
            ("OPENCLAW_BIN", "/opt/openclaw"),
        ]))
        .unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:1234");
        assert_eq!(cfg.web_root, "public");
        assert_eq!(cfg.roster, vec!["a", "b", "c"]);
        assert_eq!(cfg.source.kind, SourceKind::Demo);
        assert_eq!(cfg.limits.max_stored_events, 10);
        assert_eq!(cfg.source.openclaw.sessions_command[0], "/opt/openclaw");
        assert_eq!(cfg.source.openclaw.logs_command[0], "/opt/openclaw");
    }

    #[test]
    fn port_replaces_only_the_port() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env(env(&[("PORT", "9999")])).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9999");

        let mut cfg = ServerConfig::default();
        cfg.apply_env(env(&[("PORT", "9999"), ("MISSION_LISTEN_ADDR", "127.0.0.1:1")]))
            .unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:1");
    }

    #[test]
    fn empty_and_bad_env_values_are_ignored_or_rejected() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env(env(&[("MISSION_WEB_ROOT", ""), ("MISSION_MAX_STORED_EVENTS", "lots")]))
            .unwrap();
        assert_eq!(cfg.web_root, "web");
        assert_eq!(cfg.limits.max_stored_events, 200);

        assert_eq!(
            cfg.apply_env(env(&[("MISSION_SOURCE", "carrier-pigeon")])),
            Err(ConfigError::UnknownSource("carrier-pigeon".to_string()))
        );
    }

    #[test]
    fn engine_settings_follow_config() {
        let mut cfg = ServerConfig::default();
        cfg.status.manual_hold_ms = 0;
        cfg.limits.max_stored_events = 7;
        let settings = cfg.engine_settings();
        assert_eq!(settings.manual_hold_ms, 0);
        assert_eq!(settings.max_stored_events, 7);
        assert_eq!(settings.windows, StatusWindows::default());
    }
}
