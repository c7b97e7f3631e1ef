//! Agent registry
//!
//! Holds live agent handles keyed by `agent_id` and answers the capability and
//! dependency queries the engine and the HTTP surface need. Registration is
//! expected at startup; lookups are read-mostly and never held across an
//! `.await`.

use crate::agent::{Agent, AgentMetadata};
use crate::template::WorkflowTemplate;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An agent whose declared dependency is absent from a proposed agent set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub agent_id: String,
    /// `None` when the agent itself is not registered
    pub missing: Option<String>,
}

impl std::fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.missing {
            Some(dep) => write!(f, "agent '{}' requires '{}'", self.agent_id, dep),
            None => write!(f, "agent '{}' is not registered", self.agent_id),
        }
    }
}

/// Registry of all agents known to an orchestrator
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent; a previous registration under the same id is replaced
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let agent_id = agent.agent_id().to_string();
        let previous = self.agents.write().insert(agent_id.clone(), agent);
        if previous.is_some() {
            warn!(agent_id = %agent_id, "Agent already registered, overwriting");
        } else {
            info!(agent_id = %agent_id, "Registered agent");
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn metadata(&self, agent_id: &str) -> Option<AgentMetadata> {
        self.agents
            .read()
            .get(agent_id)
            .map(|agent| agent.describe().clone())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.read().contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// List metadata, optionally filtered by agent type, sorted by id
    pub fn list(&self, agent_type: Option<&str>) -> Vec<AgentMetadata> {
        let mut listed: Vec<AgentMetadata> = self
            .agents
            .read()
            .values()
            .map(|agent| agent.describe())
            .filter(|meta| agent_type.map_or(true, |t| meta.agent_type == t))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        listed
    }

    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentMetadata> {
        let mut found: Vec<AgentMetadata> = self
            .agents
            .read()
            .values()
            .map(|agent| agent.describe())
            .filter(|meta| meta.has_capability(capability))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        found
    }

    /// True when every agent is registered and all declared dependencies lie in the set
    pub fn validate_dependencies(&self, agent_ids: &BTreeSet<String>) -> bool {
        self.validate_dependencies_detailed(agent_ids).is_empty()
    }

    /// Agents a run of `template` may invoke
    ///
    /// The declared step agents, plus the registered fallback of every agent
    /// behind a conditional step.
    pub fn routable_agent_ids(&self, template: &WorkflowTemplate) -> BTreeSet<String> {
        let agents = self.agents.read();
        let mut ids = template.agent_ids();
        for step in template.steps.iter().filter(|s| s.condition.is_some()) {
            let fallback = agents
                .get(&step.agent_id)
                .and_then(|agent| agent.describe().fallback_agent_id.clone());
            if let Some(fallback) = fallback.filter(|id| agents.contains_key(id)) {
                ids.insert(fallback);
            }
        }
        ids
    }

    /// Same check as [`validate_dependencies`](Self::validate_dependencies), reporting each violation
    pub fn validate_dependencies_detailed(
        &self,
        agent_ids: &BTreeSet<String>,
    ) -> Vec<MissingDependency> {
        let agents = self.agents.read();
        let mut violations = Vec::new();

        for agent_id in agent_ids {
            let Some(agent) = agents.get(agent_id) else {
                violations.push(MissingDependency {
                    agent_id: agent_id.clone(),
                    missing: None,
                });
                continue;
            };
            for dependency in &agent.describe().dependencies {
                if !agent_ids.contains(dependency) {
                    violations.push(MissingDependency {
                        agent_id: agent_id.clone(),
                        missing: Some(dependency.clone()),
                    });
                }
            }
        }

        if !violations.is_empty() {
            debug!(count = violations.len(), "Agent dependency validation failed");
        }
        violations
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.agents.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("AgentRegistry").field("agents", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StaticAgent;
    use crate::Variables;

    fn agent(id: &str, agent_type: &str, deps: &[&str]) -> Arc<dyn Agent> {
        let mut builder = AgentMetadata::builder()
            .agent_id(id)
            .agent_type(agent_type)
            .capability(format!("{}-capability", agent_type));
        for dep in deps {
            builder = builder.dependency(*dep);
        }
        Arc::new(StaticAgent::new(builder.build().unwrap(), Variables::new()))
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());

        registry.register(agent("ocr_extract", "extraction", &[]));
        registry.register(agent("categorize", "finance", &["ocr_extract"]));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("ocr_extract").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list(Some("finance")).len(), 1);
        assert_eq!(registry.list(None).len(), 2);
        assert_eq!(
            registry.find_by_capability("extraction-capability")[0].agent_id,
            "ocr_extract"
        );
    }

    #[test]
    fn test_reregistration_overwrites() {
        let registry = AgentRegistry::new();
        registry.register(agent("ocr_extract", "extraction", &[]));
        registry.register(agent("ocr_extract", "vision", &[]));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.metadata("ocr_extract").unwrap().agent_type,
            "vision"
        );
    }

    #[test]
    fn test_validate_dependencies() {
        let registry = AgentRegistry::new();
        registry.register(agent("ocr_extract", "extraction", &[]));
        registry.register(agent("categorize", "finance", &["ocr_extract"]));

        assert!(registry.validate_dependencies(&set(&["ocr_extract", "categorize"])));
        assert!(!registry.validate_dependencies(&set(&["categorize"])));

        let violations = registry.validate_dependencies_detailed(&set(&["categorize", "ghost"]));
        assert_eq!(violations.len(), 2);
        assert!(violations.contains(&MissingDependency {
            agent_id: "categorize".to_string(),
            missing: Some("ocr_extract".to_string()),
        }));
        assert!(violations.contains(&MissingDependency {
            agent_id: "ghost".to_string(),
            missing: None,
        }));
    }

    #[test]
    fn test_routable_agents_include_conditional_fallbacks() {
        let registry = AgentRegistry::new();
        let primary = AgentMetadata::builder()
            .agent_id("categorize")
            .fallback_agent_id("manual_review")
            .build()
            .unwrap();
        registry.register(Arc::new(StaticAgent::new(primary, Variables::new())));
        registry.register(agent("manual_review", "review", &["ocr_extract"]));

        let plain = WorkflowTemplate::new("t", "t")
            .with_step(crate::template::WorkflowStep::new("c", "categorize"));
        assert_eq!(registry.routable_agent_ids(&plain), set(&["categorize"]));

        let conditional = WorkflowTemplate::new("t", "t").with_step(
            crate::template::WorkflowStep::new("c", "categorize").condition("confidence >= 0.8"),
        );
        let routable = registry.routable_agent_ids(&conditional);
        assert_eq!(routable, set(&["categorize", "manual_review"]));

        let violations = registry.validate_dependencies_detailed(&routable);
        assert_eq!(
            violations,
            vec![MissingDependency {
                agent_id: "manual_review".to_string(),
                missing: Some("ocr_extract".to_string()),
            }]
        );
    }
}
