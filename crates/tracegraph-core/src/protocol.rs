//! Host → dashboard messages.
//!
//! One JSON object per message; the `type` field selects the variant. Field
//! names follow the host's wire format (`graphId`, `xGraphId`, ...). Channel ids
//! may arrive as strings or integers and are normalized to strings.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::sample::Timestamp;

/// Message types this dashboard understands.
pub const MESSAGE_TYPES: &[&str] = &[
    "configure",
    "data",
    "program-counter",
    "status",
    "init",
    "history",
];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no string `type` field")]
    MissingType,

    #[error("unsupported message type `{0}`")]
    UnsupportedType(String),

    #[error("`{kind}` message has no timestamp")]
    MissingTimestamp { kind: &'static str },
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Debuggee run state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Stopped,
    Terminated,
    Continued,
}

impl RunStatus {
    /// Whether charts should be advancing their time window.
    pub fn is_running(self) -> bool {
        self == Self::Continued
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Terminated => write!(f, "terminated"),
            Self::Continued => write!(f, "continued"),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphConfig {
    #[serde(rename = "realtime")]
    Realtime(RealtimeGraph),
    #[serde(rename = "x-y-plot")]
    XyPlot(XyGraph),
}

impl GraphConfig {
    pub fn label(&self) -> &str {
        match self {
            Self::Realtime(g) => &g.label,
            Self::XyPlot(g) => &g.label,
        }
    }

    /// Channels this graph reads from.
    pub fn channel_ids(&self) -> Vec<&str> {
        match self {
            Self::Realtime(g) => g.plots.iter().map(|p| p.graph_id.as_str()).collect(),
            Self::XyPlot(g) => vec![g.x_graph_id.as_str(), g.y_graph_id.as_str()],
        }
    }
}

/// Scrolling line chart over one or more channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeGraph {
    pub label: String,
    pub minimum: f64,
    pub maximum: f64,
    /// Visible window in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timespan: Option<f64>,
    #[serde(default)]
    pub plots: Vec<PlotConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotConfig {
    #[serde(deserialize_with = "channel_id")]
    pub graph_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub color: String,
}

/// Trajectory plot recombining the latest values of two channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XyGraph {
    pub label: String,
    #[serde(deserialize_with = "channel_id")]
    pub x_graph_id: String,
    #[serde(deserialize_with = "channel_id")]
    pub y_graph_id: String,
    pub x_minimum: f64,
    pub x_maximum: f64,
    pub y_minimum: f64,
    pub y_maximum: f64,
    #[serde(default)]
    pub initial_x: f64,
    #[serde(default)]
    pub initial_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timespan: Option<f64>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    Configure {
        #[serde(default)]
        graphs: Vec<GraphConfig>,
        #[serde(default)]
        status: RunStatus,
    },
    Data {
        #[serde(deserialize_with = "channel_id")]
        id: String,
        data: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Timestamp>,
    },
    ProgramCounter {
        function: String,
        counter: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Timestamp>,
    },
    Status {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Timestamp>,
    },
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Timestamp>,
    },
    /// Buffered messages replayed by the host after a (re)connect.
    History { messages: Vec<Message> },
}

impl Message {
    /// Parse one JSON message.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !MESSAGE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnsupportedType(kind.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of this message's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::Data { .. } => "data",
            Self::ProgramCounter { .. } => "program-counter",
            Self::Status { .. } => "status",
            Self::Init { .. } => "init",
            Self::History { .. } => "history",
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Data { timestamp, .. }
            | Self::ProgramCounter { timestamp, .. }
            | Self::Status { timestamp, .. }
            | Self::Init { timestamp } => *timestamp,
            Self::Configure { .. } | Self::History { .. } => None,
        }
    }
}

fn channel_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
