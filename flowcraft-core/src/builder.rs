use crate::error::FlowResult;
use crate::graph::{
    Condition, Graph, Group, Link, Node, NodeKind, Position, Signature,
};
use serde_json::Value;

/// Builder for creating graphs with a fluent API.
///
/// Node modifiers (`at`, `executable`, `signature`, `value`, `in_group`)
/// apply to the most recently added node.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    links: Vec<Link>,
    groups: Vec<Group>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    fn modify_last(mut self, f: impl FnOnce(&mut Node)) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            f(node);
        }
        self
    }

    /// Adds an Action node whose executable defaults to `<id>.py`
    pub fn action(self, id: &str, name: &str) -> Self {
        let mut node = Node::new(id, NodeKind::Action, name);
        node.executable = Some(format!("{id}.py"));
        self.push(node)
    }

    pub fn conditional(self, id: &str, name: &str) -> Self {
        self.push(Node::new(id, NodeKind::Conditional, name))
    }

    /// Adds an Input node feeding `target`
    pub fn input(self, id: &str, name: &str, target: &str) -> Self {
        let mut node = Node::new(id, NodeKind::Input, name);
        node.target_node_id = Some(target.to_string());
        self.push(node)
    }

    pub fn sink(self, id: &str, name: &str, capture: Option<&str>) -> Self {
        let mut node = Node::new(id, NodeKind::Sink, name);
        node.capture = capture.map(str::to_string);
        self.push(node)
    }

    pub fn at(self, x: f64, y: f64) -> Self {
        self.modify_last(|n| n.position = Position { x, y })
    }

    pub fn executable(self, executable: &str) -> Self {
        self.modify_last(|n| n.executable = Some(executable.to_string()))
    }

    pub fn signature(self, parameters: &[&str], returns: &[&str]) -> Self {
        let signature = Signature {
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            returns: returns.iter().map(|r| r.to_string()).collect(),
        };
        self.modify_last(|n| n.signature = Some(signature))
    }

    /// Sets a declared value on the last Input node
    pub fn value(self, key: &str, value: Value) -> Self {
        self.modify_last(|n| {
            n.declared_inputs.insert(key.to_string(), value);
        })
    }

    pub fn in_group(self, group_id: &str) -> Self {
        self.modify_last(|n| n.group_id = Some(group_id.to_string()))
    }

    pub fn data_link(mut self, source: &str, target: &str) -> Self {
        self.links.push(Link::data(source, target));
        self
    }

    pub fn conditional_link(
        mut self,
        source: &str,
        target: &str,
        conditions: Vec<Condition>,
    ) -> Self {
        self.links.push(Link::conditional(source, target, conditions));
        self
    }

    pub fn group(mut self, id: &str, members: &[&str]) -> Self {
        self.groups.push(Group {
            id: id.to_string(),
            node_ids: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    /// Validates and builds the graph
    pub fn build(self) -> FlowResult<Graph> {
        Graph::new(self.nodes, self.links, self.groups)
    }
}
