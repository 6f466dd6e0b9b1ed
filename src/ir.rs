use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Flow direction of the layered layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    LeftRight,
    TopDown,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "TD" | "TB" | "DOWN" | "down" => Some(Self::TopDown),
            "LR" | "RIGHT" | "right" => Some(Self::LeftRight),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::LeftRight)
    }
}

// ── Input tree ──────────────────────────────────────────────────────

/// Raw system description as delivered by the data endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemData {
    #[serde(default, deserialize_with = "lenient_list")]
    pub components: Vec<ComponentEntry>,
    /// Named infrastructure links (queues, datastores). Displayed by the UI,
    /// ignored by layout.
    #[serde(default, deserialize_with = "lenient_list")]
    pub connections: Vec<InfrastructureLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<serde_json::Value>,
}

impl SystemData {
    /// Parses a component tree from JSON, falling back to JSON5 for
    /// hand-written files with comments or trailing commas.
    pub fn from_json(input: &str) -> anyhow::Result<Self> {
        match serde_json::from_str(input) {
            Ok(data) => Ok(data),
            Err(json_err) => json5::from_str(input).map_err(|json5_err| {
                anyhow::anyhow!("invalid system data: {json_err} (json5: {json5_err})")
            }),
        }
    }
}

/// Reads a list field entry by entry. A value that is not a list reads as
/// empty, and an entry that does not parse is dropped, so one bad entry
/// never takes its owner down with it.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(error = %err, "skipping unreadable list entry");
                None
            }
        })
        .collect())
}

/// Text field that also takes numbers; anything else reads as empty.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => text,
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    })
}

/// One slot of a component list. Placeholder strings and objects of the
/// wrong shape are kept so the builder can skip them explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentEntry {
    Component(Component),
    Placeholder(String),
    Malformed(serde_json::Value),
}

impl ComponentEntry {
    /// Returns the component if it carries a usable id.
    pub fn as_component(&self) -> Option<&Component> {
        match self {
            ComponentEntry::Component(component) if !component.id.trim().is_empty() => {
                Some(component)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_list", alias = "attributes")]
    pub labels: Vec<Attribute>,
    #[serde(
        default,
        deserialize_with = "lenient_list",
        alias = "sub_components",
        alias = "subComponents"
    )]
    pub components: Vec<ComponentEntry>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub connections: Vec<ConnectionTarget>,
}

/// A key/expression pair. The expression is resolved by an external
/// evaluator; layout only counts attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default, alias = "key")]
    pub label: String,
    #[serde(default, alias = "expression")]
    pub evaluator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionTarget {
    PlainId(String),
    Rich(RichTarget),
    /// Neither an id nor an object; yields no edge.
    Malformed(Value),
}

/// A connection entry that carries its own identity and metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichTarget {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub labels: Vec<Attribute>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ConnectionTarget {
    pub fn target_id(&self) -> Option<&str> {
        let id = match self {
            ConnectionTarget::PlainId(id) => Some(id.as_str()),
            ConnectionTarget::Rich(rich) => rich.target.as_deref().or(rich.id.as_deref()),
            ConnectionTarget::Malformed(_) => None,
        };
        id.map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ConnectionTarget::PlainId(_) | ConnectionTarget::Malformed(_) => None,
            ConnectionTarget::Rich(rich) => rich
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureLink {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub labels: Vec<Attribute>,
}

// ── Flat graph ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Direct children ids in declaration order.
    Container { children: Vec<String> },
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Main,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub parent_id: Option<String>,
    pub depth: usize,
    pub kind: NodeKind,
    pub width: f32,
    pub height: f32,
}

impl Node {
    pub fn is_container(&self) -> bool {
        matches!(&self.kind, NodeKind::Container { children } if !children.is_empty())
    }

    pub fn class(&self) -> NodeClass {
        if self.depth == 0 {
            NodeClass::Main
        } else {
            NodeClass::Sub
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }
}
