//! Workflow templates
//!
//! A template is an immutable, named directed graph of steps. Each step names
//! the agent it runs, how workflow variables map onto the agent's input keys,
//! how the agent's output keys map back into workflow variables, the steps it
//! depends on and an optional routing condition.

use crate::scheduler;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Prefix of input sources that read another step's raw output
pub const STEP_OUTPUT_PREFIX: &str = "step:";

/// A single node of a workflow template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub step_id: String,
    pub agent_id: String,
    /// workflow variable (or `step:<id>:<key>` path) -> agent input key
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    /// agent output key -> workflow variable
    #[serde(default)]
    pub output_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl WorkflowStep {
    pub fn new<S1: Into<String>, S2: Into<String>>(step_id: S1, agent_id: S2) -> Self {
        Self {
            step_id: step_id.into(),
            agent_id: agent_id.into(),
            input_mapping: BTreeMap::new(),
            output_mapping: BTreeMap::new(),
            dependencies: Vec::new(),
            condition: None,
        }
    }

    /// Map a workflow variable onto an agent input key
    pub fn input<S1: Into<String>, S2: Into<String>>(mut self, source: S1, input_key: S2) -> Self {
        self.input_mapping.insert(source.into(), input_key.into());
        self
    }

    /// Map an agent output key into a workflow variable
    pub fn output<S1: Into<String>, S2: Into<String>>(mut self, output_key: S1, variable: S2) -> Self {
        self.output_mapping.insert(output_key.into(), variable.into());
        self
    }

    pub fn depends_on<S: Into<String>>(mut self, step_id: S) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn condition<S: Into<String>>(mut self, condition: S) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// An immutable, named workflow graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTemplate {
    pub template_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Listing view of a template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSummary {
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub tags: Vec<String>,
    pub step_count: usize,
}

impl WorkflowTemplate {
    pub fn new<S1: Into<String>, S2: Into<String>>(template_id: S1, name: S2) -> Self {
        Self {
            template_id: template_id.into(),
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            version: default_version(),
            tags: Vec::new(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Distinct agents referenced by the template's steps
    pub fn agent_ids(&self) -> BTreeSet<String> {
        self.steps.iter().map(|s| s.agent_id.clone()).collect()
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            template_id: self.template_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            tags: self.tags.clone(),
            step_count: self.steps.len(),
        }
    }

    /// Check step identity and that dependencies name existing steps
    pub fn validate_structure(&self) -> Result<()> {
        if self.template_id.trim().is_empty() {
            return Err(Error::validation("Template id cannot be empty"));
        }
        if self.steps.is_empty() {
            return Err(Error::invalid_template(
                &self.template_id,
                "template has no steps",
            ));
        }

        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if step.step_id.trim().is_empty() || step.agent_id.trim().is_empty() {
                return Err(Error::invalid_template(
                    &self.template_id,
                    "step id and agent id are required",
                ));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(Error::invalid_template(
                    &self.template_id,
                    format!("duplicate step id '{}'", step.step_id),
                ));
            }
        }

        for step in &self.steps {
            for dependency in &step.dependencies {
                if dependency == &step.step_id {
                    return Err(Error::invalid_template(
                        &self.template_id,
                        format!("step '{}' depends on itself", step.step_id),
                    ));
                }
                if !seen.contains(dependency.as_str()) {
                    return Err(Error::invalid_template(
                        &self.template_id,
                        format!(
                            "step '{}' depends on unknown step '{}'",
                            step.step_id, dependency
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Full validation: structure plus acyclicity
    pub fn validate(&self) -> Result<()> {
        self.validate_structure()?;
        scheduler::batches(&self.steps)?;
        Ok(())
    }
}

/// Registry of named templates
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, Arc<WorkflowTemplate>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a template, replacing any previous version
    pub fn register(&self, template: WorkflowTemplate) -> Result<()> {
        template.validate()?;
        let template_id = template.template_id.clone();
        let previous = self
            .templates
            .write()
            .insert(template_id.clone(), Arc::new(template));
        if previous.is_some() {
            warn!(template_id = %template_id, "Template already registered, replacing");
        } else {
            info!(template_id = %template_id, "Registered workflow template");
        }
        Ok(())
    }

    pub fn get(&self, template_id: &str) -> Option<Arc<WorkflowTemplate>> {
        self.templates.read().get(template_id).cloned()
    }

    pub fn remove(&self, template_id: &str) -> bool {
        self.templates.write().remove(template_id).is_some()
    }

    pub fn list(&self) -> Vec<TemplateSummary> {
        let mut summaries: Vec<TemplateSummary> = self
            .templates
            .read()
            .values()
            .map(|t| t.summary())
            .collect();
        summaries.sort_by(|a, b| a.template_id.cmp(&b.template_id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn finance_template() -> WorkflowTemplate {
        WorkflowTemplate::new("invoice_processing", "Invoice processing")
            .with_step(WorkflowStep::new("ocr_extract", "ocr_extract").output("text", "raw_text"))
            .with_step(WorkflowStep::new("categorize", "categorize").depends_on("ocr_extract"))
            .with_step(WorkflowStep::new("calculate_vat", "calculate_vat").depends_on("ocr_extract"))
            .with_step(
                WorkflowStep::new("finance_analysis", "finance_analysis")
                    .depends_on("categorize")
                    .depends_on("calculate_vat"),
            )
    }

    #[test]
    fn test_valid_template() {
        let template = finance_template();
        assert!(template.validate().is_ok());
        assert_eq!(template.agent_ids().len(), 4);
        assert_eq!(template.summary().step_count, 4);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let template = WorkflowTemplate::new("t", "t")
            .with_step(WorkflowStep::new("a", "agent").depends_on("missing"));
        assert_matches!(template.validate(), Err(Error::InvalidTemplate { .. }));
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let template = WorkflowTemplate::new("t", "t")
            .with_step(WorkflowStep::new("a", "agent"))
            .with_step(WorkflowStep::new("a", "agent"));
        assert_matches!(template.validate(), Err(Error::InvalidTemplate { .. }));
    }

    #[test]
    fn test_cycle_rejected() {
        let template = WorkflowTemplate::new("t", "t")
            .with_step(WorkflowStep::new("a", "agent").depends_on("b"))
            .with_step(WorkflowStep::new("b", "agent").depends_on("a"));
        assert_matches!(template.validate(), Err(Error::CycleDetected { .. }));
    }

    #[test]
    fn test_registry_replace_and_list() {
        let registry = TemplateRegistry::new();
        registry.register(finance_template()).unwrap();
        registry
            .register(finance_template().with_description("v2"))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("invoice_processing").unwrap().description, "v2");
        assert_eq!(registry.list()[0].template_id, "invoice_processing");
        assert!(registry.remove("invoice_processing"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_template_deserializes_with_defaults() {
        let json = r#"{
            "template_id": "t",
            "name": "T",
            "steps": [{"step_id": "a", "agent_id": "x"}]
        }"#;
        let template: WorkflowTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.version, "1.0.0");
        assert!(template.steps[0].dependencies.is_empty());
        assert!(template.steps[0].condition.is_none());
    }
}
