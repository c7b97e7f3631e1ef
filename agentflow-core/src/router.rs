//! Conditional routing of workflow steps
//!
//! A step condition is a single comparison `"<var> <op> <value>"` with
//! `op` one of `<`, `>`, `<=`, `>=`, `==`, `!=`. Both sides are compared as
//! numbers when they parse as numbers, otherwise as strings. When the
//! condition holds the step runs on its declared agent; when it does not and
//! the agent declares a registered fallback, the fallback runs instead.

use crate::registry::AgentRegistry;
use crate::template::WorkflowStep;
use crate::{Error, Result, Variables};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Comparison operators, two-character forms listed first so they win the scan
const OPERATORS: [(&str, CompareOp); 6] = [
    ("<=", CompareOp::Le),
    (">=", CompareOp::Ge),
    ("==", CompareOp::Eq),
    ("!=", CompareOp::Ne),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
        }
    }
}

/// A parsed `<var> <op> <value>` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub variable: String,
    pub op: CompareOp,
    pub literal: String,
}

impl Condition {
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let (position, symbol, op) = OPERATORS
            .iter()
            .filter_map(|(symbol, op)| expression.find(symbol).map(|pos| (pos, *symbol, *op)))
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())))
            .ok_or_else(|| {
                Error::validation(format!("Condition '{}' has no comparison operator", expression))
            })?;

        let variable = expression[..position].trim();
        let literal = expression[position + symbol.len()..].trim();
        if variable.is_empty() || literal.is_empty() {
            return Err(Error::validation(format!(
                "Condition '{}' must have the form '<var> <op> <value>'",
                expression
            )));
        }

        Ok(Self {
            variable: variable.to_string(),
            op,
            literal: strip_quotes(literal).to_string(),
        })
    }

    /// Evaluate against the variable space; a missing variable never holds
    pub fn evaluate(&self, variables: &Variables) -> bool {
        let Some(value) = variables.get(&self.variable) else {
            return false;
        };

        let left = value_as_text(value);
        let ordering = match (left.trim().parse::<f64>(), self.literal.parse::<f64>()) {
            (Ok(l), Ok(r)) => match l.partial_cmp(&r) {
                Some(ordering) => ordering,
                None => return false,
            },
            _ => left.as_str().cmp(self.literal.as_str()),
        };

        self.op.holds(ordering)
    }
}

fn strip_quotes(literal: &str) -> &str {
    for quote in ['"', '\''] {
        if literal.len() >= 2 && literal.starts_with(quote) && literal.ends_with(quote) {
            return &literal[1..literal.len() - 1];
        }
    }
    literal
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate a raw condition string, failing open on malformed input
pub fn evaluate_condition(expression: &str, variables: &Variables) -> bool {
    match Condition::parse(expression) {
        Ok(condition) => condition.evaluate(variables),
        Err(e) => {
            warn!(condition = %expression, error = %e, "Unparsable step condition, treating as true");
            true
        }
    }
}

/// Pick the agent that should run `step`
pub fn route(step: &WorkflowStep, variables: &Variables, registry: &AgentRegistry) -> String {
    let Some(condition) = step.condition.as_deref() else {
        return step.agent_id.clone();
    };

    if evaluate_condition(condition, variables) {
        return step.agent_id.clone();
    }

    let fallback = registry
        .metadata(&step.agent_id)
        .and_then(|meta| meta.fallback_agent_id);

    match fallback {
        Some(fallback_id) if registry.contains(&fallback_id) => {
            debug!(
                step_id = %step.step_id,
                primary = %step.agent_id,
                fallback = %fallback_id,
                "Condition false, routing to fallback agent"
            );
            fallback_id
        }
        Some(fallback_id) => {
            warn!(
                step_id = %step.step_id,
                fallback = %fallback_id,
                "Fallback agent is not registered, keeping primary"
            );
            step.agent_id.clone()
        }
        None => step.agent_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentMetadata, StaticAgent};
    use serde_json::json;
    use std::sync::Arc;

    fn vars(pairs: &[(&str, Value)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn registry_with_fallback(register_fallback: bool) -> AgentRegistry {
        let registry = AgentRegistry::new();
        let primary = AgentMetadata::builder()
            .agent_id("auto_categorize")
            .fallback_agent_id("manual_review")
            .build()
            .unwrap();
        registry.register(Arc::new(StaticAgent::new(primary, Variables::new())));
        if register_fallback {
            let fallback = AgentMetadata::builder()
                .agent_id("manual_review")
                .build()
                .unwrap();
            registry.register(Arc::new(StaticAgent::new(fallback, Variables::new())));
        }
        registry
    }

    #[test]
    fn test_parse_condition() {
        let c = Condition::parse("confidence >= 0.9").unwrap();
        assert_eq!(c.variable, "confidence");
        assert_eq!(c.op, CompareOp::Ge);
        assert_eq!(c.literal, "0.9");

        let c = Condition::parse("format == 'pdf'").unwrap();
        assert_eq!(c.op, CompareOp::Eq);
        assert_eq!(c.literal, "pdf");

        assert!(Condition::parse("confidence").is_err());
        assert!(Condition::parse("< 3").is_err());
    }

    #[test]
    fn test_numeric_and_string_comparison() {
        let v = vars(&[
            ("confidence", json!(0.5)),
            ("amount", json!("1200")),
            ("currency", json!("EUR")),
        ]);

        assert!(evaluate_condition("confidence < 0.9", &v));
        assert!(!evaluate_condition("confidence > 0.9", &v));
        assert!(evaluate_condition("confidence <= 0.5", &v));
        assert!(evaluate_condition("amount >= 1000", &v));
        assert!(evaluate_condition("amount != 1000", &v));
        assert!(evaluate_condition("currency == EUR", &v));
        assert!(evaluate_condition("currency == \"EUR\"", &v));
        assert!(!evaluate_condition("currency == USD", &v));
        // "9" > "10" as strings, but not as numbers
        assert!(!evaluate_condition("amount < 9", &v));
    }

    #[test]
    fn test_missing_variable_is_false_and_malformed_is_true() {
        let v = Variables::new();
        assert!(!evaluate_condition("confidence < 0.9", &v));
        assert!(evaluate_condition("not a condition", &v));
    }

    #[test]
    fn test_route_without_condition_uses_primary() {
        let registry = registry_with_fallback(true);
        let step = WorkflowStep::new("categorize", "auto_categorize");
        assert_eq!(route(&step, &Variables::new(), &registry), "auto_categorize");
    }

    #[test]
    fn test_route_false_condition_uses_fallback() {
        let registry = registry_with_fallback(true);
        let step = WorkflowStep::new("categorize", "auto_categorize").condition("confidence >= 0.9");
        let v = vars(&[("confidence", json!(0.5))]);
        assert_eq!(route(&step, &v, &registry), "manual_review");

        let v = vars(&[("confidence", json!(0.95))]);
        assert_eq!(route(&step, &v, &registry), "auto_categorize");
    }

    #[test]
    fn test_route_true_condition_keeps_primary_despite_fallback() {
        let registry = registry_with_fallback(true);
        let step = WorkflowStep::new("categorize", "auto_categorize").condition("confidence < 0.9");
        let v = vars(&[("confidence", json!(0.5))]);
        assert_eq!(route(&step, &v, &registry), "auto_categorize");

        let v = vars(&[("confidence", json!(0.95))]);
        assert_eq!(route(&step, &v, &registry), "manual_review");
    }

    #[test]
    fn test_route_keeps_primary_without_registered_fallback() {
        let registry = registry_with_fallback(false);
        let step = WorkflowStep::new("categorize", "auto_categorize").condition("confidence >= 0.9");
        let v = vars(&[("confidence", json!(0.5))]);
        assert_eq!(route(&step, &v, &registry), "auto_categorize");
    }
}
