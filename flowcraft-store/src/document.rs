//! # FlowCraft Store - flowchart documents
//!
//! The on-disk flowchart format and its conversion to and from the
//! validated [`Graph`] model.

use anyhow::{bail, Result};
use flowcraft_core::{
    Condition, Graph, Group, Link, LinkKind, Node, NodeKind, Position,
    Signature, Variables,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowchartDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub links: Vec<LinkDocument>,
    #[serde(default)]
    pub groups: Vec<GroupDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_file: Option<String>,
    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub input_values: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<DataVariable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVariable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDocument {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    pub id: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

/// Maps a document node type onto the engine's node kinds.
pub fn node_kind(node_type: &str) -> Option<NodeKind> {
    match node_type {
        "python_file" | "call_ai" => Some(NodeKind::Action),
        "if_node" => Some(NodeKind::Conditional),
        "input_node" => Some(NodeKind::Input),
        "data_save" => Some(NodeKind::Sink),
        _ => None,
    }
}

fn node_type(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Action => "python_file",
        NodeKind::Conditional => "if_node",
        NodeKind::Input => "input_node",
        NodeKind::Sink => "data_save",
    }
}

impl FlowchartDocument {
    /// Converts the document into a validated graph. Links leaving an
    /// `if_node` are conditional; every other link carries data.
    pub fn to_graph(&self) -> Result<Graph> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for doc in &self.nodes {
            let Some(kind) = node_kind(&doc.node_type) else {
                bail!("node {} has unsupported type '{}'", doc.id, doc.node_type);
            };
            let mut node = Node::new(doc.id.clone(), kind, doc.name.clone());
            node.position = Position { x: doc.x, y: doc.y };
            node.group_id = doc.group_id.clone();
            node.executable = doc.python_file.clone();
            node.declared_inputs = doc.input_values.clone();
            node.target_node_id = doc.target_node_id.clone();
            node.capture = doc
                .data_source
                .as_ref()
                .and_then(|ds| ds.variable.as_ref())
                .and_then(|v| v.name.clone());
            if !doc.parameters.is_empty() || !doc.returns.is_empty() {
                node.signature = Some(Signature {
                    parameters: doc.parameters.clone(),
                    returns: doc.returns.clone(),
                });
            }
            nodes.push(node);
        }

        let conditional_sources: std::collections::HashSet<&str> = self
            .nodes
            .iter()
            .filter(|n| node_kind(&n.node_type) == Some(NodeKind::Conditional))
            .map(|n| n.id.as_str())
            .collect();

        let links = self
            .links
            .iter()
            .map(|doc| {
                let kind = if conditional_sources.contains(doc.source.as_str()) {
                    LinkKind::Conditional
                } else {
                    LinkKind::Data
                };
                Link {
                    source_id: doc.source.clone(),
                    target_id: doc.target.clone(),
                    kind,
                    conditions: doc.conditions.clone(),
                }
            })
            .collect();

        let groups = self
            .groups
            .iter()
            .map(|g| Group {
                id: g.id.clone(),
                node_ids: g.node_ids.clone(),
            })
            .collect();

        Ok(Graph::new(nodes, links, groups)?)
    }

    pub fn from_graph(graph: &Graph) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|n| NodeDocument {
                id: n.id.clone(),
                node_type: node_type(n.kind).to_string(),
                name: n.name.clone(),
                x: n.position.x,
                y: n.position.y,
                group_id: n.group_id.clone(),
                python_file: n.executable.clone(),
                input_values: n.declared_inputs.clone(),
                target_node_id: n.target_node_id.clone(),
                data_source: n.capture.as_ref().map(|name| DataSource {
                    variable: Some(DataVariable {
                        name: Some(name.clone()),
                    }),
                }),
                parameters: n
                    .signature
                    .as_ref()
                    .map(|s| s.parameters.clone())
                    .unwrap_or_default(),
                returns: n
                    .signature
                    .as_ref()
                    .map(|s| s.returns.clone())
                    .unwrap_or_default(),
            })
            .collect();

        let links = graph
            .links()
            .iter()
            .map(|l| LinkDocument {
                source: l.source_id.clone(),
                target: l.target_id.clone(),
                link_type: None,
                conditions: l.conditions.clone(),
            })
            .collect();

        let groups = graph
            .groups()
            .iter()
            .map(|g| GroupDocument {
                id: g.id.clone(),
                node_ids: g.node_ids.clone(),
            })
            .collect();

        Self {
            name: None,
            nodes,
            links,
            groups,
        }
    }
}
