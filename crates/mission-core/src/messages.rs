use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::agent::Agent;
use crate::events::ActivityEvent;

/// Agent records keyed by name, serialized as a JSON object in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentMap(pub Vec<(String, Agent)>);

impl AgentMap {
    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for AgentMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, agent) in &self.0 {
            map.serialize_entry(name, agent)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AgentMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AgentMapVisitor;

        impl<'de> Visitor<'de> for AgentMapVisitor {
            type Value = AgentMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of agent name to agent record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AgentMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, agent)) = access.next_entry::<String, Agent>()? {
                    entries.push((name, agent));
                }
                Ok(AgentMap(entries))
            }
        }

        deserializer.deserialize_map(AgentMapVisitor)
    }
}

/// Full state: every agent plus the retained events, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub agents: AgentMap,
    pub events: Vec<ActivityEvent>,
}

/// Messages pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "state.snapshot")]
    StateSnapshot(StateSnapshot),
    #[serde(rename = "agent.updated")]
    AgentUpdated(ActivityEvent),
}

impl ServerMessage {
    /// Wire name, also used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateSnapshot(_) => "state.snapshot",
            Self::AgentUpdated(_) => "agent.updated",
        }
    }
}

/// Encode a server message as a JSON text frame.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Decode a JSON text frame into a server message.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
