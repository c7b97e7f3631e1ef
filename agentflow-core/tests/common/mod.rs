//! Shared fixtures for workflow integration tests

use agentflow_core::agent::{AgentMetadata, FnAgent};
use agentflow_core::{Agent, Orchestrator, Variables, WorkflowStep, WorkflowTemplate};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Start/end instants of every agent invocation, in call order
#[derive(Debug, Default)]
pub struct CallLog {
    entries: Mutex<Vec<(String, Instant, Instant)>>,
}

impl CallLog {
    pub fn record(&self, agent_id: &str, started: Instant) {
        self.entries
            .lock()
            .push((agent_id.to_string(), started, Instant::now()));
    }

    pub fn called(&self, agent_id: &str) -> bool {
        self.entries.lock().iter().any(|(id, _, _)| id == agent_id)
    }

    pub fn window(&self, agent_id: &str) -> Option<(Instant, Instant)> {
        self.entries
            .lock()
            .iter()
            .find(|(id, _, _)| id == agent_id)
            .map(|(_, start, end)| (*start, *end))
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }
}

fn metadata(id: &str, agent_type: &str, deps: &[&str]) -> AgentMetadata {
    let mut builder = AgentMetadata::builder()
        .agent_id(id)
        .agent_type(agent_type)
        .capability(id);
    for dep in deps {
        builder = builder.dependency(*dep);
    }
    builder.build().expect("valid metadata")
}

/// Agent that sleeps, records its call window and returns `handler(input)`
pub fn timed_agent<F>(
    log: &Arc<CallLog>,
    id: &str,
    agent_type: &str,
    deps: &[&str],
    delay: Duration,
    handler: F,
) -> Arc<dyn Agent>
where
    F: Fn(&Variables) -> Result<Variables, String> + Send + Sync + 'static,
{
    let log = Arc::clone(log);
    let agent_id = id.to_string();
    let handler = Arc::new(handler);
    Arc::new(FnAgent::new(
        metadata(id, agent_type, deps),
        move |input: Variables, _ctx| {
            let log = Arc::clone(&log);
            let agent_id = agent_id.clone();
            let handler = Arc::clone(&handler);
            async move {
                let started = Instant::now();
                tokio::time::sleep(delay).await;
                log.record(&agent_id, started);
                handler(&input).map_err(|message| {
                    agentflow_core::Error::agent_execution(agent_id.clone(), message)
                })
            }
        },
    ))
}

fn single(key: &str, value: serde_json::Value) -> Variables {
    let mut vars = Variables::new();
    vars.insert(key.to_string(), value);
    vars
}

/// Register the four invoice agents; `fail_vat` makes the VAT agent raise
pub fn register_finance_agents(orchestrator: &Orchestrator, log: &Arc<CallLog>, fail_vat: bool) {
    let delay = Duration::from_millis(50);

    orchestrator.register_agent(timed_agent(log, "ocr_extract", "extraction", &[], delay, |input| {
        let file = input
            .get("file")
            .and_then(|v| v.as_str())
            .unwrap_or("invoice.pdf")
            .to_string();
        let mut out = single("text", json!(format!("parsed {}", file)));
        out.insert("amount".to_string(), json!(1000.0));
        Ok(out)
    }));

    orchestrator.register_agent(timed_agent(
        log,
        "categorize",
        "finance",
        &["ocr_extract"],
        delay,
        |_input| Ok(single("category", json!("office_supplies"))),
    ));

    orchestrator.register_agent(timed_agent(
        log,
        "calculate_vat",
        "finance",
        &["ocr_extract"],
        delay,
        move |input| {
            if fail_vat {
                return Err("rate table unavailable".to_string());
            }
            let amount = input.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
            Ok(single("vat", json!(amount * 0.2)))
        },
    ));

    orchestrator.register_agent(timed_agent(
        log,
        "finance_analysis",
        "analysis",
        &["categorize", "calculate_vat"],
        Duration::from_millis(5),
        |input| {
            let vat = input.get("vat").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let category = input
                .get("category")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            Ok(single("summary", json!(format!("{}: vat {:.2}", category, vat))))
        },
    ));
}

pub fn invoice_template() -> WorkflowTemplate {
    WorkflowTemplate::new("invoice_processing", "Invoice processing")
        .with_step(
            WorkflowStep::new("ocr_extract", "ocr_extract")
                .input("file", "file")
                .output("text", "invoice_text")
                .output("amount", "amount"),
        )
        .with_step(
            WorkflowStep::new("categorize", "categorize")
                .depends_on("ocr_extract")
                .input("invoice_text", "text")
                .output("category", "category"),
        )
        .with_step(
            WorkflowStep::new("calculate_vat", "calculate_vat")
                .depends_on("ocr_extract")
                .input("amount", "amount")
                .output("vat", "vat"),
        )
        .with_step(
            WorkflowStep::new("finance_analysis", "finance_analysis")
                .depends_on("categorize")
                .depends_on("calculate_vat")
                .input("category", "category")
                .input("vat", "vat")
                .output("summary", "summary"),
        )
}
