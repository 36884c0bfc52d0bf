//! # FlowCraft Core - graph model
//!
//! Nodes, links and groups as supplied by the document store. A [`Graph`]
//! is validated once on construction and treated as read-only for the
//! duration of a run.

use crate::error::{FlowError, FlowResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

/// Named variables, e.g. the arguments handed to an executable or the
/// variables visible to a conditional node.
pub type Variables = serde_json::Map<String, Value>;

/// Last returned value per node id.
pub type Bindings = BTreeMap<String, Value>;

/// Kind of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Invokes an external executable and returns a value
    Action,
    /// Routes control to outgoing branches based on conditions
    Conditional,
    /// Manually supplied values for an Action node
    Input,
    /// Passively captures an Action node's result
    Sink,
}

/// Layout coordinates. Only ever used as a deterministic tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Declared interface of an executable, when known.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Signature {
    /// Formal parameters, in declaration order
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Names of the returned variables
    #[serde(default)]
    pub returns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub position: Position,
    /// Opaque handle understood by the executor (Action nodes)
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub signature: Option<Signature>,
    /// Manually supplied values (Input nodes)
    #[serde(default)]
    pub declared_inputs: Variables,
    /// The Action node an Input node feeds, even without a link
    #[serde(default)]
    pub target_node_id: Option<String>,
    /// Variable captured by a Sink node
    #[serde(default)]
    pub capture: Option<String>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            group_id: None,
            position: Position::default(),
            executable: None,
            signature: None,
            declared_inputs: Variables::new(),
            target_node_id: None,
            capture: None,
        }
    }

    /// Input and Sink nodes never take part in dependency ordering.
    pub fn is_opportunistic(&self) -> bool {
        matches!(self.kind, NodeKind::Input | NodeKind::Sink)
    }

    /// Name used when a value from this node needs a variable name.
    pub fn variable_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("node_{}", self.id)
        } else {
            sanitize_name(&self.name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    #[default]
    Data,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Combiner {
    #[default]
    And,
    Or,
}

impl<'de> Deserialize<'de> for Combiner {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Combiner::parse(&raw))
    }
}

impl Combiner {
    /// Anything but `or` (case-insensitive) combines with `and`.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("or") {
            Combiner::Or
        } else {
            Combiner::And
        }
    }
}

/// Comparison applied by a single condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    LooseEq,
    StrictEq,
    Lt,
    Gt,
    Le,
    Ge,
    LenEq,
    LenLt,
    LenGt,
    /// Anything unrecognised; always evaluates to false
    Unknown(String),
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "==" => Operator::LooseEq,
            "===" => Operator::StrictEq,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            "len==" => Operator::LenEq,
            "len<" => Operator::LenLt,
            "len>" => Operator::LenGt,
            _ => Operator::Unknown(raw),
        }
    }
}

impl From<&str> for Operator {
    fn from(raw: &str) -> Self {
        Operator::from(raw.to_string())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::LooseEq => "==",
            Operator::StrictEq => "===",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::LenEq => "len==",
            Operator::LenLt => "len<",
            Operator::LenGt => "len>",
            Operator::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{variable, operator, value, combiner}` entry on a conditional link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: Operator,
    /// Raw comparison value; coerced against the bound variable's type
    #[serde(default)]
    pub value: String,
    /// Ignored on the first condition of a list
    #[serde(default)]
    pub combiner: Option<Combiner>,
}

impl Condition {
    pub fn new(
        variable: impl Into<String>,
        operator: impl Into<Operator>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            variable: variable.into(),
            operator: operator.into(),
            value: value.into(),
            combiner: None,
        }
    }

    pub fn combined_with(mut self, combiner: Combiner) -> Self {
        self.combiner = Some(combiner);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub kind: LinkKind,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Link {
    pub fn data(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_id: source.into(),
            target_id: target.into(),
            kind: LinkKind::Data,
            conditions: Vec::new(),
        }
    }

    pub fn conditional(
        source: impl Into<String>,
        target: impl Into<String>,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            source_id: source.into(),
            target_id: target.into(),
            kind: LinkKind::Conditional,
            conditions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

/// Validated, read-only view of nodes, links and groups.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    links: Vec<Link>,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
    membership: HashMap<String, String>,
}

impl Graph {
    pub fn new(
        nodes: Vec<Node>,
        links: Vec<Link>,
        groups: Vec<Group>,
    ) -> FlowResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(FlowError::InvalidGraph(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            if !node.position.x.is_finite() || !node.position.y.is_finite() {
                return Err(FlowError::InvalidGraph(format!(
                    "node {} has a non-finite position ({}, {})",
                    node.id, node.position.x, node.position.y
                )));
            }
        }

        for link in &links {
            for endpoint in [&link.source_id, &link.target_id] {
                if !index.contains_key(endpoint) {
                    return Err(FlowError::InvalidGraph(format!(
                        "link {} -> {} references unknown node {}",
                        link.source_id, link.target_id, endpoint
                    )));
                }
            }
        }

        let mut membership: HashMap<String, String> = HashMap::new();
        let mut assign = |node_id: &str, group_id: &str| -> FlowResult<()> {
            match membership.get(node_id) {
                Some(existing) if existing != group_id => {
                    Err(FlowError::InvalidGraph(format!(
                        "node {node_id} belongs to both group {existing} and group {group_id}"
                    )))
                }
                Some(_) => Ok(()),
                None => {
                    membership.insert(node_id.to_string(), group_id.to_string());
                    Ok(())
                }
            }
        };

        for group in &groups {
            for member in &group.node_ids {
                if !index.contains_key(member) {
                    return Err(FlowError::InvalidGraph(format!(
                        "group {} references unknown node {}",
                        group.id, member
                    )));
                }
                assign(member, &group.id)?;
            }
        }
        for node in &nodes {
            if let Some(group_id) = &node.group_id {
                assign(&node.id, group_id)?;
            }
        }

        Ok(Self {
            nodes,
            links,
            groups,
            index,
            membership,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn require_node(&self, id: &str) -> FlowResult<&Node> {
        self.node(id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))
    }

    /// Position of the node in the document, used for declaration ordering.
    pub fn declaration_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn incoming<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.target_id == id)
    }

    pub fn outgoing<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.source_id == id)
    }

    pub fn group_of(&self, id: &str) -> Option<&str> {
        self.membership.get(id).map(String::as_str)
    }

    /// A link between two scheduled nodes, i.e. neither endpoint is an
    /// Input or Sink node.
    pub fn is_control_link(&self, link: &Link) -> bool {
        let opportunistic = |id: &str| {
            self.node(id).map(Node::is_opportunistic).unwrap_or(true)
        };
        !opportunistic(&link.source_id) && !opportunistic(&link.target_id)
    }

    /// Input nodes feeding `action_id`, either by link or by target id.
    pub fn input_nodes_for(&self, action_id: &str) -> Vec<&Node> {
        let mut seen = HashSet::new();
        let linked = self
            .incoming(action_id)
            .filter_map(|l| self.node(&l.source_id))
            .filter(|n| n.kind == NodeKind::Input);
        let targeted = self.nodes.iter().filter(|n| {
            n.kind == NodeKind::Input
                && n.target_node_id.as_deref() == Some(action_id)
        });
        linked
            .chain(targeted)
            .filter(|n| seen.insert(n.id.clone()))
            .collect()
    }

    /// Sink nodes wired to `action_id` in either direction.
    pub fn sinks_for(&self, action_id: &str) -> Vec<&Node> {
        let mut seen = HashSet::new();
        self.links
            .iter()
            .filter_map(|l| {
                if l.source_id == action_id {
                    self.node(&l.target_id)
                } else if l.target_id == action_id {
                    self.node(&l.source_id)
                } else {
                    None
                }
            })
            .filter(|n| n.kind == NodeKind::Sink)
            .filter(|n| seen.insert(n.id.clone()))
            .collect()
    }
}

/// Lower-cases `name` and replaces anything outside `[a-z0-9_]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let re = INVALID.get_or_init(|| {
        Regex::new(r"[^a-z0-9_]").expect("static pattern is valid")
    });
    re.replace_all(&name.to_lowercase(), "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str) -> Node {
        Node::new(id, NodeKind::Action, id)
    }

    #[test]
    fn test_rejects_dangling_link() {
        let err = Graph::new(
            vec![action("a")],
            vec![Link::data("a", "missing")],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::InvalidGraph(_)));
    }

    #[test]
    fn test_rejects_non_finite_position() {
        for (x, y) in [(0.0, f64::INFINITY), (f64::NAN, 0.0), (0.0, f64::NEG_INFINITY)] {
            let mut node = action("a");
            node.position = Position { x, y };
            let err = Graph::new(vec![node], vec![], vec![]).unwrap_err();
            assert!(matches!(err, FlowError::InvalidGraph(_)));
        }
    }

    #[test]
    fn test_rejects_node_in_two_groups() {
        let groups = vec![
            Group {
                id: "g1".into(),
                node_ids: vec!["a".into()],
            },
            Group {
                id: "g2".into(),
                node_ids: vec!["a".into()],
            },
        ];
        let err = Graph::new(vec![action("a")], vec![], groups).unwrap_err();
        assert!(matches!(err, FlowError::InvalidGraph(_)));
    }

    #[test]
    fn test_group_membership_from_node_and_group() {
        let mut b = action("b");
        b.group_id = Some("g1".into());
        let groups = vec![Group {
            id: "g1".into(),
            node_ids: vec!["a".into()],
        }];
        let graph = Graph::new(vec![action("a"), b], vec![], groups).unwrap();
        assert_eq!(graph.group_of("a"), Some("g1"));
        assert_eq!(graph.group_of("b"), Some("g1"));
    }

    #[test]
    fn test_require_node() {
        let graph = Graph::new(vec![action("a")], vec![], vec![]).unwrap();
        assert_eq!(graph.require_node("a").unwrap().id, "a");
        assert_eq!(
            graph.require_node("b").unwrap_err(),
            FlowError::NodeNotFound("b".into())
        );
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(Operator::from(">="), Operator::Ge);
        assert_eq!(Operator::from("len=="), Operator::LenEq);
        assert_eq!(Operator::from("~="), Operator::Unknown("~=".into()));
        assert_eq!(Combiner::parse("OR"), Combiner::Or);
        assert_eq!(Combiner::parse("xor"), Combiner::And);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Load Data-1"), "load_data_1");
        assert_eq!(Node::new("7", NodeKind::Action, "").variable_name(), "node_7");
    }

    #[test]
    fn test_inputs_and_sinks_lookup() {
        let mut input = Node::new("in", NodeKind::Input, "inputs");
        input.target_node_id = Some("a".into());
        let sink = Node::new("s", NodeKind::Sink, "save");
        let graph = Graph::new(
            vec![action("a"), input, sink],
            vec![Link::data("a", "s")],
            vec![],
        )
        .unwrap();
        assert_eq!(graph.input_nodes_for("a").len(), 1);
        assert_eq!(graph.sinks_for("a")[0].id, "s");
    }
}
