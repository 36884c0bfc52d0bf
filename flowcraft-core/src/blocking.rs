//! # FlowCraft Core - branch blocking
//!
//! Marks the nodes downstream of a branch that was not taken, stopping at
//! merge points that are still reachable through another path.

use crate::graph::Graph;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Blocks everything reachable from `false_targets` that has no surviving
/// alternate path, then unblocks each of `true_targets`.
pub fn propagate_block(
    graph: &Graph,
    blocked: &mut BTreeSet<String>,
    false_targets: &[String],
    true_targets: &[String],
) {
    for start in false_targets {
        block_from(graph, blocked, start);
    }

    for target in true_targets {
        if blocked.remove(target) {
            tracing::debug!(node = %target, "node unblocked by a taken branch");
        }
    }
}

fn block_from(graph: &Graph, blocked: &mut BTreeSet<String>, start: &str) {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        blocked.insert(current.clone());

        for link in graph
            .outgoing(&current)
            .filter(|l| graph.is_control_link(l))
        {
            let child = link.target_id.as_str();
            let has_alternate = graph
                .incoming(child)
                .filter(|l| graph.is_control_link(l))
                .filter(|l| l.source_id != current)
                .any(|l| {
                    !blocked.contains(&l.source_id)
                        && !visited.contains(&l.source_id)
                });

            if has_alternate {
                tracing::trace!(
                    node = %child,
                    "merge point still reachable, not blocking"
                );
            } else {
                queue.push_back(child.to_string());
            }
        }
    }

    tracing::debug!(start = %start, blocked = visited.len(), "branch blocked");
}
