use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// The node palette. Unknown kind tokens are rejected at the boundary
/// instead of being defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Start,
    AudienceSplit,
    EventSplit,
    AbTest,
    Sms,
    Email,
    AiCall,
    ManualCall,
    Wait,
    End,
}

impl NodeKind {
    pub const ALL: [NodeKind; 10] = [
        NodeKind::Start,
        NodeKind::AudienceSplit,
        NodeKind::EventSplit,
        NodeKind::AbTest,
        NodeKind::Sms,
        NodeKind::Email,
        NodeKind::AiCall,
        NodeKind::ManualCall,
        NodeKind::Wait,
        NodeKind::End,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "start" => Some(Self::Start),
            "audience-split" => Some(Self::AudienceSplit),
            "event-split" => Some(Self::EventSplit),
            "ab-test" => Some(Self::AbTest),
            "sms" => Some(Self::Sms),
            "email" => Some(Self::Email),
            "ai-call" => Some(Self::AiCall),
            "manual-call" => Some(Self::ManualCall),
            "wait" => Some(Self::Wait),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::AudienceSplit => "audience-split",
            Self::EventSplit => "event-split",
            Self::AbTest => "ab-test",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::AiCall => "ai-call",
            Self::ManualCall => "manual-call",
            Self::Wait => "wait",
            Self::End => "end",
        }
    }
}

/// Post-creation configuration seam: a node may be visible and addressable
/// while its business configuration is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigState {
    Pending,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortGroup {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub id: String,
    pub group: PortGroup,
}

/// Type-specific payload stored on a node cell. `extra` keeps arbitrary
/// caller fields round-trippable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub kind: NodeKind,
    pub config: serde_json::Value,
    pub config_state: ConfigState,
    pub level: Option<u32>,
    pub level_index: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Canonical node record, as handed to the render host and the form UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub shape: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    pub data: NodePayload,
    pub ports: Vec<PortDescriptor>,
}

impl NodeDescriptor {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoint {
    pub cell: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePayload {
    pub branch_id: Option<String>,
    pub source_node_id: String,
    pub target_node_id: String,
    /// Preview edges belong to preset slots; they never count as real
    /// connections for duplicate detection.
    pub is_preview: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub id: String,
    pub source: EdgeEndpoint,
    pub target: EdgeEndpoint,
    pub label: Option<String>,
    pub data: EdgePayload,
}

impl EdgeDescriptor {
    /// Identity used for duplicate detection of real edges.
    pub fn triple(&self) -> (&str, &str, Option<&str>) {
        (
            self.data.source_node_id.as_str(),
            self.data.target_node_id.as_str(),
            self.data.branch_id.as_deref(),
        )
    }
}

/// Raw node command input. Everything is optional; preprocessing fills the
/// gaps from the kind template before validation runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeInput {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub label: Option<String>,
    pub config: Option<serde_json::Value>,
    /// Parent node for auto-placement; the new node lands one level below.
    pub parent: Option<String>,
    pub branch_index: Option<usize>,
    pub total_branches: Option<usize>,
    pub level: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeInput {
    pub fn of_kind(kind: NodeKind) -> Self {
        Self {
            kind: Some(kind.as_token().to_string()),
            ..Self::default()
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

/// Raw edge command input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeInput {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_port: Option<String>,
    #[serde(default)]
    pub target_port: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_preview: bool,
}

impl EdgeInput {
    pub fn between(source: &str, target: &str) -> Self {
        Self {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            source_port: None,
            target_port: None,
            branch_id: None,
            label: None,
            is_preview: false,
        }
    }

    pub fn with_branch(mut self, branch_id: &str) -> Self {
        self.branch_id = Some(branch_id.to_string());
        self
    }
}

/// Serializable flow document: the load/export surface and the CLI input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDocument {
    pub nodes: Vec<NodeInput>,
    pub edges: Vec<EdgeInput>,
}
