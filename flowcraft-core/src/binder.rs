//! # FlowCraft Core - variable binder
//!
//! Maps the values returned by upstream nodes onto the parameters of an
//! Action node and collects the manual values of its Input nodes.

use crate::graph::{Bindings, Graph, Node, NodeKind, Variables};
use serde_json::Value;
use std::collections::HashSet;

/// Arguments for one executor call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatheredInputs {
    /// Values resolved from upstream results (and Input nodes)
    pub args: Variables,
    /// Non-empty values entered on associated Input nodes
    pub manual_inputs: Variables,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VariableBinder;

impl VariableBinder {
    pub fn new() -> Self {
        Self
    }

    /// Gathers the inputs of `node_id`. `supplementary` is consulted only
    /// when none of the node's upstream sources produced a value, e.g. the
    /// first node run after a resume.
    pub fn gather(
        &self,
        graph: &Graph,
        node_id: &str,
        bindings: &Bindings,
        supplementary: Option<&Variables>,
    ) -> GatheredInputs {
        let Some(node) = graph.node(node_id) else {
            return GatheredInputs::default();
        };
        let parameters: &[String] = node
            .signature
            .as_ref()
            .map(|s| s.parameters.as_slice())
            .unwrap_or(&[]);

        let mut args = Variables::new();
        let mut produced = false;

        for source_id in upstream_sources(graph, node_id) {
            let Some(value) = bindings.get(&source_id) else {
                continue;
            };
            produced = true;

            match value {
                Value::Object(fields) => {
                    for (name, field) in fields {
                        args.entry(name.clone()).or_insert_with(|| field.clone());
                    }
                }
                other => {
                    let name = match_parameter(
                        parameters,
                        &args,
                        graph.node(&source_id),
                        other,
                    );
                    args.entry(name).or_insert_with(|| other.clone());
                }
            }
        }

        if !produced {
            if let Some(extra) = supplementary {
                for (name, value) in extra {
                    if !parameters.is_empty() && !parameters.contains(name) {
                        continue;
                    }
                    args.entry(name.clone()).or_insert_with(|| value.clone());
                }
            }
        }

        let manual_inputs = self.manual_inputs(graph, node_id, &args);

        for parameter in parameters {
            if args.contains_key(parameter) {
                continue;
            }
            if let Some(value) = manual_inputs.get(parameter) {
                args.insert(parameter.clone(), value.clone());
            }
        }

        tracing::debug!(
            node = %node_id,
            args = args.len(),
            manual_inputs = manual_inputs.len(),
            "inputs gathered"
        );
        GatheredInputs {
            args,
            manual_inputs,
        }
    }

    /// Entered values of the node's Input nodes. Blank fields take the
    /// upstream argument of the same name, if there is one.
    fn manual_inputs(
        &self,
        graph: &Graph,
        node_id: &str,
        args: &Variables,
    ) -> Variables {
        let inputs = graph.input_nodes_for(node_id);
        let mut manual = Variables::new();

        for input in &inputs {
            for (name, value) in &input.declared_inputs {
                if !is_blank(value) {
                    manual.entry(name.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        for input in &inputs {
            for (name, value) in &input.declared_inputs {
                if is_blank(value) {
                    if let Some(upstream) = args.get(name) {
                        manual
                            .entry(name.clone())
                            .or_insert_with(|| upstream.clone());
                    }
                }
            }
        }
        manual
    }
}

/// Nodes whose results feed `node_id`, looking through conditional nodes
/// to their own sources.
fn upstream_sources(graph: &Graph, node_id: &str) -> Vec<String> {
    let mut sources = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<String> = vec![node_id.to_string()];
    let mut expanded = HashSet::new();

    while let Some(current) = stack.pop() {
        if !expanded.insert(current.clone()) {
            continue;
        }
        for link in graph.incoming(&current) {
            let Some(source) = graph.node(&link.source_id) else {
                continue;
            };
            match source.kind {
                NodeKind::Conditional => stack.push(source.id.clone()),
                NodeKind::Action => {
                    if seen.insert(source.id.clone()) {
                        sources.push(source.id.clone());
                    }
                }
                NodeKind::Input | NodeKind::Sink => {}
            }
        }
    }
    sources
}

/// Picks the parameter a scalar or array value from `source` binds to.
pub fn match_parameter(
    parameters: &[String],
    bound: &Variables,
    source: Option<&Node>,
    value: &Value,
) -> String {
    let unmet: Vec<&String> = parameters
        .iter()
        .filter(|p| !bound.contains_key(p.as_str()))
        .collect();

    if let [only] = unmet.as_slice() {
        return (*only).clone();
    }

    let heuristic = unmet.iter().find(|p| {
        match (p.to_lowercase().as_str(), value) {
            ("result", Value::Number(_)) => true,
            ("text", Value::String(_)) => true,
            ("items", Value::Array(_)) => true,
            ("data" | "value", _) => true,
            _ => false,
        }
    });
    if let Some(p) = heuristic.or_else(|| unmet.first()) {
        return (*p).clone();
    }

    fallback_name(source, value)
}

fn fallback_name(source: Option<&Node>, value: &Value) -> String {
    if let Some(node) = source {
        let name = node.variable_name();
        if !node.name.trim().is_empty() && name != "untitled" {
            return name;
        }
    }
    match value {
        Value::Number(_) => "result",
        Value::String(_) => "text",
        Value::Array(_) => "items",
        _ => "data",
    }
    .to_string()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use serde_json::json;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_unique_unmet_parameter() {
        let mut bound = Variables::new();
        bound.insert("a".into(), json!(1));
        let name = match_parameter(&params(&["a", "b"]), &bound, None, &json!(2));
        assert_eq!(name, "b");
    }

    #[test]
    fn test_match_by_name_heuristics() {
        let p = params(&["items", "text", "result"]);
        let bound = Variables::new();
        assert_eq!(match_parameter(&p, &bound, None, &json!(4)), "result");
        assert_eq!(match_parameter(&p, &bound, None, &json!("hi")), "text");
        assert_eq!(match_parameter(&p, &bound, None, &json!([1])), "items");
    }

    #[test]
    fn test_match_first_unmet_then_fallback() {
        let p = params(&["alpha", "beta"]);
        assert_eq!(
            match_parameter(&p, &Variables::new(), None, &json!(true)),
            "alpha"
        );

        let loader = Node::new("n1", NodeKind::Action, "CSV Loader");
        assert_eq!(
            match_parameter(&[], &Variables::new(), Some(&loader), &json!([])),
            "csv_loader"
        );
        let untitled = Node::new("n2", NodeKind::Action, "Untitled");
        assert_eq!(
            match_parameter(&[], &Variables::new(), Some(&untitled), &json!(3)),
            "result"
        );
    }

    #[test]
    fn test_records_merge_first_writer_wins() {
        let graph = GraphBuilder::new()
            .action("a", "A")
            .action("b", "B")
            .action("c", "C")
            .data_link("a", "c")
            .data_link("b", "c")
            .build()
            .unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("a".into(), json!({"count": 3, "x": 1}));
        bindings.insert("b".into(), json!({"count": 7}));

        let gathered = VariableBinder::new().gather(&graph, "c", &bindings, None);
        assert_eq!(gathered.args.get("count"), Some(&json!(3)));
        assert_eq!(gathered.args.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_conditional_sources_are_transparent() {
        let graph = GraphBuilder::new()
            .action("a", "Producer")
            .conditional("if", "If")
            .action("c", "Consumer")
            .signature(&["value"], &[])
            .data_link("a", "if")
            .conditional_link("if", "c", vec![])
            .build()
            .unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("a".into(), json!(42));

        let gathered = VariableBinder::new().gather(&graph, "c", &bindings, None);
        assert_eq!(gathered.args.get("value"), Some(&json!(42)));
    }

    #[test]
    fn test_input_nodes_fill_unresolved_parameters() {
        let graph = GraphBuilder::new()
            .action("a", "A")
            .action("c", "C")
            .signature(&["data", "threshold", "label"], &[])
            .input("in", "Settings", "c")
            .value("threshold", json!(5))
            .value("label", json!(""))
            .value("data", json!("typed by hand"))
            .data_link("a", "c")
            .build()
            .unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("a".into(), json!({"data": [1, 2], "label": "auto"}));

        let gathered = VariableBinder::new().gather(&graph, "c", &bindings, None);
        // upstream wins for args, the entered value is still reported
        assert_eq!(gathered.args.get("data"), Some(&json!([1, 2])));
        assert_eq!(gathered.args.get("threshold"), Some(&json!(5)));
        assert_eq!(gathered.manual_inputs.get("data"), Some(&json!("typed by hand")));
        // blank field picked up the upstream value
        assert_eq!(gathered.manual_inputs.get("label"), Some(&json!("auto")));
    }

    #[test]
    fn test_supplementary_only_without_upstream_values() {
        let graph = GraphBuilder::new()
            .action("a", "A")
            .action("b", "B")
            .signature(&["count"], &[])
            .data_link("a", "b")
            .build()
            .unwrap();

        let mut extra = Variables::new();
        extra.insert("count".into(), json!(9));
        extra.insert("unrelated".into(), json!(true));

        let empty = Bindings::new();
        let gathered =
            VariableBinder::new().gather(&graph, "b", &empty, Some(&extra));
        assert_eq!(gathered.args.len(), 1);
        assert_eq!(gathered.args.get("count"), Some(&json!(9)));

        let mut bindings = Bindings::new();
        bindings.insert("a".into(), json!({"count": 1}));
        let gathered =
            VariableBinder::new().gather(&graph, "b", &bindings, Some(&extra));
        assert_eq!(gathered.args.get("count"), Some(&json!(1)));
    }
}
