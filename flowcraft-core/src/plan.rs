//! # FlowCraft Core - execution plan
//!
//! Group-aware topological ordering of the scheduled nodes of a graph.

use crate::error::{FlowError, FlowResult};
use crate::graph::{Graph, Node};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Flat, ordered list of node ids to run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub order: Vec<String>,
    pub metadata: PlanMetadata,
}

#[derive(Debug, Clone)]
pub struct PlanMetadata {
    pub plan_id: String,
    pub created_at: std::time::SystemTime,
    pub total_nodes: usize,
}

impl ExecutionPlan {
    pub fn new(order: Vec<String>) -> Self {
        let metadata = PlanMetadata {
            plan_id: uuid::Uuid::new_v4().to_string(),
            created_at: std::time::SystemTime::now(),
            total_nodes: order.len(),
        };
        Self { order, metadata }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn position_of(&self, node_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == node_id)
    }

    /// Splits the order into the part before `node_id` and the part
    /// starting at it.
    pub fn split_at(&self, node_id: &str) -> FlowResult<(&[String], &[String])> {
        let index = self
            .position_of(node_id)
            .ok_or_else(|| FlowError::NotInPlan(node_id.to_string()))?;
        Ok(self.order.split_at(index))
    }
}

/// How ties between simultaneously ready nodes are broken.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Topmost row first (within the layout tolerance), then left to right
    #[default]
    Layout,
    /// Document order, for graphs without meaningful coordinates
    Declaration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub tie_break: TieBreak,
    /// Nodes whose y differs by less than this share a row
    pub layout_tolerance: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::Layout,
            layout_tolerance: 10.0,
        }
    }
}

/// Anything that can turn a graph into an execution plan.
pub trait FlowPlanner {
    fn plan(&self, graph: &Graph) -> FlowResult<ExecutionPlan>;
}

#[derive(Debug, Clone, Default)]
pub struct OrderPlanner {
    config: PlannerConfig,
}

impl OrderPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Nodes that take part in ordering, in declaration order, together
    /// with the predecessors of each.
    fn dependency_graph<'g>(
        &self,
        graph: &'g Graph,
    ) -> (Vec<&'g Node>, HashMap<&'g str, Vec<&'g str>>) {
        let control_links: Vec<_> = graph
            .links()
            .iter()
            .filter(|l| graph.is_control_link(l))
            .collect();

        let connected: HashSet<&str> = control_links
            .iter()
            .flat_map(|l| [l.source_id.as_str(), l.target_id.as_str()])
            .collect();

        let eligible: Vec<&Node> = graph
            .nodes()
            .iter()
            .filter(|n| connected.contains(n.id.as_str()))
            .collect();

        let mut predecessors: HashMap<&str, Vec<&str>> = eligible
            .iter()
            .map(|n| (n.id.as_str(), Vec::new()))
            .collect();
        for link in control_links {
            if let Some(preds) = predecessors.get_mut(link.target_id.as_str()) {
                preds.push(link.source_id.as_str());
            }
        }

        (eligible, predecessors)
    }

    fn by_x_then_id(a: &Node, b: &Node) -> Ordering {
        a.position
            .x
            .total_cmp(&b.position.x)
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Picks the next batch out of the ready set.
    fn select_batch<'g>(
        &self,
        graph: &Graph,
        ready: &[&'g Node],
        eligible: &[&'g Node],
        is_ready: &dyn Fn(&str) -> bool,
    ) -> Vec<&'g Node> {
        // groups whose every scheduled member is ready right now
        let ready_groups: HashSet<&str> = ready
            .iter()
            .filter_map(|n| graph.group_of(&n.id))
            .filter(|group| {
                eligible
                    .iter()
                    .filter(|m| graph.group_of(&m.id) == Some(*group))
                    .all(|m| is_ready(&m.id))
            })
            .collect();

        let mut batch: Vec<&Node> = if !ready_groups.is_empty() {
            ready
                .iter()
                .filter(|n| {
                    graph
                        .group_of(&n.id)
                        .map(|g| ready_groups.contains(g))
                        .unwrap_or(false)
                })
                .copied()
                .collect()
        } else {
            match self.config.tie_break {
                TieBreak::Layout => {
                    let top = ready
                        .iter()
                        .map(|n| n.position.y)
                        .min_by(f64::total_cmp)
                        .unwrap_or_default();
                    let level: Vec<&Node> = ready
                        .iter()
                        .filter(|n| {
                            (n.position.y - top).abs()
                                < self.config.layout_tolerance
                        })
                        .copied()
                        .collect();
                    // the ready set is never empty here; an empty level
                    // would stall the loop
                    if level.is_empty() {
                        ready.to_vec()
                    } else {
                        level
                    }
                }
                TieBreak::Declaration => ready.to_vec(),
            }
        };

        match self.config.tie_break {
            TieBreak::Layout => batch.sort_by(|a, b| Self::by_x_then_id(a, b)),
            TieBreak::Declaration => batch.sort_by_key(|n| {
                graph.declaration_index(&n.id).unwrap_or(usize::MAX)
            }),
        }
        batch
    }
}

impl FlowPlanner for OrderPlanner {
    fn plan(&self, graph: &Graph) -> FlowResult<ExecutionPlan> {
        let (eligible, predecessors) = self.dependency_graph(graph);
        let mut processed: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(eligible.len());

        while processed.len() < eligible.len() {
            let is_ready = |id: &str| {
                !processed.contains(id)
                    && predecessors
                        .get(id)
                        .map(|preds| preds.iter().all(|p| processed.contains(p)))
                        .unwrap_or(true)
            };

            let ready: Vec<&Node> = eligible
                .iter()
                .filter(|n| is_ready(&n.id))
                .copied()
                .collect();

            if ready.is_empty() {
                let remaining = eligible
                    .iter()
                    .filter(|n| !processed.contains(n.id.as_str()))
                    .map(|n| n.id.clone())
                    .collect::<Vec<_>>();
                tracing::warn!(remaining = ?remaining, "dependency cycle detected");
                return Err(FlowError::Cycle { remaining });
            }

            let batch = self.select_batch(graph, &ready, &eligible, &is_ready);
            for node in batch {
                order.push(node.id.clone());
                processed.insert(node.id.as_str());
            }
        }

        tracing::debug!(total_nodes = order.len(), "execution order planned");
        Ok(ExecutionPlan::new(order))
    }
}
