//! # FlowCraft Core - condition evaluator
//!
//! Resolves the outgoing branches of a conditional node against the values
//! its upstream nodes returned. Evaluation never fails: anything that cannot
//! be compared resolves to `false` and is noted in the trace.

use crate::graph::{
    Bindings, Combiner, Condition, Graph, Node, Operator, Variables,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one condition, kept for observability only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTrace {
    pub variable: String,
    pub operator: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combiner: Option<Combiner>,
    /// The bound value the condition was evaluated against
    #[serde(default)]
    pub left: Option<Value>,
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything seen while evaluating one outgoing link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTrace {
    pub source: String,
    pub target: String,
    pub variables: Variables,
    pub conditions: Vec<ConditionTrace>,
    pub outcome: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchDecision {
    pub true_targets: Vec<String>,
    pub false_targets: Vec<String>,
    pub traces: Vec<LinkTrace>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Variables visible to `node_id`, built from the returned values of
    /// its upstream nodes. Record fields are merged (last writer wins);
    /// any other value is named after its source.
    pub fn collect_variables(
        &self,
        graph: &Graph,
        node_id: &str,
        bindings: &Bindings,
    ) -> Variables {
        let mut variables = Variables::new();
        for link in graph.incoming(node_id) {
            let Some(value) = bindings.get(&link.source_id) else {
                continue;
            };
            match value {
                Value::Object(fields) => {
                    for (name, field) in fields {
                        variables.insert(name.clone(), field.clone());
                    }
                }
                other => {
                    let name = graph
                        .node(&link.source_id)
                        .map(single_return_name)
                        .unwrap_or_else(|| format!("node_{}", link.source_id));
                    variables.insert(name, other.clone());
                }
            }
        }
        variables
    }

    pub fn evaluate(
        &self,
        graph: &Graph,
        node_id: &str,
        bindings: &Bindings,
    ) -> BranchDecision {
        let variables = self.collect_variables(graph, node_id, bindings);
        let mut decision = BranchDecision::default();

        for link in graph.outgoing(node_id) {
            let conditions: Vec<ConditionTrace> = link
                .conditions
                .iter()
                .map(|c| evaluate_condition(c, &variables))
                .collect();

            let outcome = fold(&conditions);
            tracing::debug!(
                source = %link.source_id,
                target = %link.target_id,
                outcome,
                "branch evaluated"
            );

            if outcome {
                decision.true_targets.push(link.target_id.clone());
            } else {
                decision.false_targets.push(link.target_id.clone());
            }
            decision.traces.push(LinkTrace {
                source: link.source_id.clone(),
                target: link.target_id.clone(),
                variables: variables.clone(),
                conditions,
                outcome,
            });
        }

        decision
    }
}

fn single_return_name(node: &Node) -> String {
    match node.signature.as_ref().map(|s| s.returns.as_slice()) {
        Some([only]) if !only.trim().is_empty() => only.clone(),
        _ => node.variable_name(),
    }
}

/// An empty list is false. Every condition has already been evaluated, so
/// folding never short-circuits anything observable.
fn fold(conditions: &[ConditionTrace]) -> bool {
    let Some((first, rest)) = conditions.split_first() else {
        return false;
    };
    rest.iter().fold(first.result, |acc, c| {
        match c.combiner.unwrap_or_default() {
            Combiner::And => acc && c.result,
            Combiner::Or => acc || c.result,
        }
    })
}

fn evaluate_condition(
    condition: &Condition,
    variables: &Variables,
) -> ConditionTrace {
    let mut trace = ConditionTrace {
        variable: condition.variable.clone(),
        operator: condition.operator.to_string(),
        value: condition.value.clone(),
        combiner: condition.combiner,
        left: None,
        result: false,
        error: None,
    };

    let Some(left) = variables.get(&condition.variable) else {
        trace.error =
            Some(format!("variable '{}' is not bound", condition.variable));
        return trace;
    };
    trace.left = Some(left.clone());

    let right = coerce(&condition.value, left);
    let result = match &condition.operator {
        Operator::LooseEq => loose_eq(left, &right),
        Operator::StrictEq => strict_eq(left, &right),
        Operator::Lt => compare(left, &right, |a, b| a < b),
        Operator::Gt => compare(left, &right, |a, b| a > b),
        Operator::Le => compare(left, &right, |a, b| a <= b),
        Operator::Ge => compare(left, &right, |a, b| a >= b),
        Operator::LenEq => compare_len(left, &condition.value, |a, b| a == b),
        Operator::LenLt => compare_len(left, &condition.value, |a, b| a < b),
        Operator::LenGt => compare_len(left, &condition.value, |a, b| a > b),
        Operator::Unknown(raw) => {
            trace.error = Some(format!("unsupported operator '{raw}'"));
            false
        }
    };
    trace.result = result;
    trace
}

/// Converts the raw comparison value to the type of the bound variable.
fn coerce(raw: &str, left: &Value) -> Value {
    match left {
        Value::Number(_) => parse_number(raw)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Value::Bool(_) => match raw.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Value::Null if raw.trim() == "null" => Value::Null,
        _ => Value::String(raw.to_string()),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (
            Value::Number(_) | Value::Bool(_) | Value::String(_),
            Value::Number(_) | Value::Bool(_) | Value::String(_),
        ) => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => left == right,
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn length_of(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) => Some(items.len() as f64),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn compare_len(left: &Value, raw: &str, op: impl Fn(f64, f64) -> bool) -> bool {
    match (length_of(left), parse_number(raw)) {
        (Some(len), Some(expected)) => op(len, expected),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn check(cond: Condition, variables: Value) -> ConditionTrace {
        evaluate_condition(&cond, &vars(variables))
    }

    #[test]
    fn test_numeric_coercion() {
        assert!(check(Condition::new("x", ">", "5"), json!({"x": 10})).result);
        assert!(!check(Condition::new("x", ">", "5"), json!({"x": 3})).result);
        assert!(check(Condition::new("x", "<=", "3.0"), json!({"x": 3})).result);
        assert!(check(Condition::new("x", "==", "7"), json!({"x": 7.0})).result);
        assert!(check(Condition::new("x", "===", "7"), json!({"x": 7})).result);
        assert!(!check(Condition::new("x", ">", "abc"), json!({"x": 7})).result);
    }

    #[test]
    fn test_boolean_and_string_coercion() {
        assert!(check(Condition::new("ok", "==", "true"), json!({"ok": true})).result);
        assert!(!check(Condition::new("ok", "===", "yes"), json!({"ok": true})).result);
        assert!(check(Condition::new("s", "==", "abc"), json!({"s": "abc"})).result);
        assert!(check(Condition::new("s", "==", "5"), json!({"s": "5"})).result);
        assert!(check(Condition::new("s", ">", "4"), json!({"s": "5"})).result);
        assert!(check(Condition::new("n", "==", "null"), json!({"n": null})).result);
    }

    #[test]
    fn test_length_operators() {
        let v = json!({"items": [1, 2, 3], "name": "héllo", "cfg": {"a": 1}});
        assert!(check(Condition::new("items", "len==", "3"), v.clone()).result);
        assert!(check(Condition::new("items", "len>", "2"), v.clone()).result);
        assert!(check(Condition::new("name", "len==", "5"), v.clone()).result);
        assert!(check(Condition::new("name", "len<", "6"), v.clone()).result);
        assert!(!check(Condition::new("cfg", "len==", "1"), v).result);
    }

    #[test]
    fn test_unbound_variable_and_unknown_operator() {
        let unbound = check(Condition::new("y", "==", "1"), json!({"x": 1}));
        assert!(!unbound.result);
        assert!(unbound.error.is_some());

        let unknown = check(Condition::new("x", "~=", "1"), json!({"x": 1}));
        assert!(!unknown.result);
        assert!(unknown.error.unwrap().contains("~="));
    }

    #[test]
    fn test_fold_without_short_circuit() {
        let traces: Vec<ConditionTrace> = [
            Condition::new("x", ">", "5"),
            Condition::new("missing", "==", "1").combined_with(Combiner::Or),
            Condition::new("x", "<", "100"),
        ]
        .iter()
        .map(|c| evaluate_condition(c, &vars(json!({"x": 10}))))
        .collect();

        // every condition is recorded, including the unbound one
        assert_eq!(traces.len(), 3);
        assert!(traces[1].error.is_some());
        assert!(fold(&traces));
        assert!(!fold(&[]));
    }

    #[test]
    fn test_or_rescues_false_start() {
        let traces: Vec<ConditionTrace> = [
            Condition::new("x", "<", "5"),
            Condition::new("x", "==", "10").combined_with(Combiner::Or),
        ]
        .iter()
        .map(|c| evaluate_condition(c, &vars(json!({"x": 10}))))
        .collect();
        assert!(fold(&traces));
    }

    #[test]
    fn test_evaluate_partitions_targets() {
        let graph = GraphBuilder::new()
            .action("b", "B")
            .conditional("if", "If")
            .action("c", "C")
            .action("d", "D")
            .data_link("b", "if")
            .conditional_link("if", "c", vec![Condition::new("count", ">", "5")])
            .conditional_link("if", "d", vec![])
            .build()
            .unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("b".into(), json!({"count": 7}));

        let decision = ConditionEvaluator::new().evaluate(&graph, "if", &bindings);
        assert_eq!(decision.true_targets, vec!["c"]);
        assert_eq!(decision.false_targets, vec!["d"]);
        assert_eq!(decision.traces.len(), 2);
        assert_eq!(decision.traces[0].variables.get("count"), Some(&json!(7)));
        assert!(decision.traces[1].conditions.is_empty());
    }

    #[test]
    fn test_scalar_named_after_return_or_source() {
        let graph = GraphBuilder::new()
            .action("a", "Score Model")
            .action("b", "Loader")
            .signature(&[], &["rows"])
            .conditional("if", "If")
            .data_link("a", "if")
            .data_link("b", "if")
            .build()
            .unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("a".into(), json!(0.9));
        bindings.insert("b".into(), json!([1, 2]));

        let variables =
            ConditionEvaluator::new().collect_variables(&graph, "if", &bindings);
        assert_eq!(variables.get("score_model"), Some(&json!(0.9)));
        assert_eq!(variables.get("rows"), Some(&json!([1, 2])));
    }
}
