//! Reference agents and built-in workflow templates
//!
//! The agents are deterministic stand-ins for the real capability providers
//! (OCR, VAT lookup, categorization, report rendering, email dispatch). They
//! make a fresh deployment usable end to end and give the HTTP layer a
//! predictable fixture.

use crate::copilot::KeywordRule;
use agentflow_core::agent::AgentMetadata;
use agentflow_core::{
    Agent, AgentContext, FnAgent, MessageType, Orchestrator, Variables, WorkflowStep,
    WorkflowTemplate,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub const INVOICE_PROCESSING: &str = "invoice_processing";
pub const VAT_CALCULATION: &str = "vat_calculation";
pub const MONTHLY_REPORT: &str = "monthly_report";

const DEFAULT_VAT_RATE: f64 = 0.2;
const DEFAULT_RECIPIENT: &str = "finance@example.com";
const REVIEW_CONFIDENCE: &str = "ocr_confidence >= 0.8";

/// Register every reference agent and built-in template
pub fn install(orchestrator: &Orchestrator) -> crate::Result<()> {
    for agent in reference_agents()? {
        orchestrator.register_agent(agent);
    }
    for template in builtin_templates() {
        orchestrator.register_template(template)?;
    }
    info!(
        agents = orchestrator.agents().len(),
        templates = orchestrator.templates().len(),
        "Installed built-in catalog"
    );
    Ok(())
}

/// Keyword rules for the copilot, in matching order
pub fn copilot_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(INVOICE_PROCESSING, &["invoice", "receipt", "bill", "expense"]),
        KeywordRule::new(VAT_CALCULATION, &["vat", "tax"]),
        KeywordRule::new(MONTHLY_REPORT, &["report", "summary", "statement"]),
    ]
}

pub fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![invoice_processing(), vat_calculation(), monthly_report()]
}

fn ocr_step() -> WorkflowStep {
    WorkflowStep::new("ocr_extract", "ocr_extract")
        .input("file", "file")
        .input("amount", "amount")
        .input("vendor", "vendor")
        .output("text", "invoice_text")
        .output("amount", "amount")
        .output("vendor", "vendor")
        .output("confidence", "ocr_confidence")
}

fn vat_step() -> WorkflowStep {
    WorkflowStep::new("calculate_vat", "calculate_vat")
        .depends_on("ocr_extract")
        .input("amount", "amount")
        .input("vat_rate", "rate")
        .output("vat_amount", "vat_amount")
        .output("gross_amount", "gross_amount")
}

fn invoice_processing() -> WorkflowTemplate {
    WorkflowTemplate::new(INVOICE_PROCESSING, "Invoice processing")
        .with_description("Extract an invoice, categorize it, compute VAT and summarize")
        .with_tag("finance")
        .with_step(ocr_step())
        .with_step(
            WorkflowStep::new("categorize", "categorize")
                .depends_on("ocr_extract")
                .condition(REVIEW_CONFIDENCE)
                .input("invoice_text", "text")
                .input("vendor", "vendor")
                .output("category", "category")
                .output("review_required", "review_required"),
        )
        .with_step(vat_step())
        .with_step(
            WorkflowStep::new("finance_analysis", "finance_analysis")
                .depends_on("categorize")
                .depends_on("calculate_vat")
                .input("category", "category")
                .input("amount", "amount")
                .input("vat_amount", "vat_amount")
                .output("summary", "summary")
                .output("total_due", "total_due"),
        )
}

fn vat_calculation() -> WorkflowTemplate {
    WorkflowTemplate::new(VAT_CALCULATION, "VAT calculation")
        .with_description("Extract an invoice amount and compute its VAT")
        .with_tag("finance")
        .with_step(ocr_step())
        .with_step(vat_step())
}

fn monthly_report() -> WorkflowTemplate {
    WorkflowTemplate::new(MONTHLY_REPORT, "Monthly report")
        .with_description("Render the period report and email it")
        .with_tag("reporting")
        .with_step(
            WorkflowStep::new("generate_report", "report_generator")
                .input("period", "period")
                .input("output_format", "format")
                .output("report_path", "report_path")
                .output("format", "report_format"),
        )
        .with_step(
            WorkflowStep::new("email_report", "email_sender")
                .depends_on("generate_report")
                .input("report_path", "attachment")
                .input("recipient", "recipient")
                .output("sent", "email_sent")
                .output("recipient", "email_recipient"),
        )
}

/// The deterministic agent set backing the built-in templates
pub fn reference_agents() -> agentflow_core::Result<Vec<Arc<dyn Agent>>> {
    let ocr = AgentMetadata::builder()
        .agent_id("ocr_extract")
        .agent_type("extraction")
        .name("OCR extraction")
        .description("Reads invoice text, vendor and amount from a document")
        .capability("ocr")
        .capability("document_extraction")
        .reliability(0.95)
        .cost_per_call(0.02)
        .avg_latency_ms(1200)
        .max_retries(2)
        .timeout_seconds(30)
        .build()?;

    let categorize = AgentMetadata::builder()
        .agent_id("categorize")
        .agent_type("finance")
        .name("Expense categorization")
        .capability("categorization")
        .dependency("ocr_extract")
        .fallback_agent_id("manual_review")
        .reliability(0.9)
        .cost_per_call(0.01)
        .avg_latency_ms(300)
        .build()?;

    let manual_review = AgentMetadata::builder()
        .agent_id("manual_review")
        .agent_type("finance")
        .name("Manual review queue")
        .description("Parks low-confidence documents for a human")
        .capability("categorization")
        .capability("human_review")
        .reliability(1.0)
        .build()?;

    let vat = AgentMetadata::builder()
        .agent_id("calculate_vat")
        .agent_type("finance")
        .name("VAT calculation")
        .capability("vat")
        .capability("tax_calculation")
        .dependency("ocr_extract")
        .reliability(0.99)
        .avg_latency_ms(50)
        .build()?;

    let analysis = AgentMetadata::builder()
        .agent_id("finance_analysis")
        .agent_type("analysis")
        .name("Finance analysis")
        .capability("analysis")
        .dependency("categorize")
        .dependency("calculate_vat")
        .reliability(0.97)
        .avg_latency_ms(400)
        .build()?;

    let report = AgentMetadata::builder()
        .agent_id("report_generator")
        .agent_type("reporting")
        .name("Report generator")
        .capability("reporting")
        .capability("export")
        .reliability(0.98)
        .avg_latency_ms(2000)
        .timeout_seconds(60)
        .build()?;

    let email = AgentMetadata::builder()
        .agent_id("email_sender")
        .agent_type("notification")
        .name("Email sender")
        .capability("email")
        .dependency("report_generator")
        .reliability(0.99)
        .max_retries(3)
        .build()?;

    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(
            FnAgent::new(ocr, |input: Variables, _ctx| async move { Ok(extract(&input)) })
                .with_required_inputs(["file"]),
        ),
        Arc::new(FnAgent::new(categorize, |input: Variables, _ctx| async move {
            Ok(categorize_expense(&input))
        })),
        Arc::new(FnAgent::new(manual_review, |_input: Variables, _ctx| async move {
            Ok(vars([
                ("category", json!("pending_review")),
                ("review_required", json!(true)),
            ]))
        })),
        Arc::new(
            FnAgent::new(vat, |input: Variables, _ctx| async move { compute_vat(&input) })
                .with_required_inputs(["amount"]),
        ),
        Arc::new(FnAgent::new(analysis, |input: Variables, _ctx| async move {
            Ok(analyse(&input))
        })),
        Arc::new(FnAgent::new(report, |input: Variables, _ctx| async move {
            render_report(&input)
        })),
        Arc::new(FnAgent::new(email, |input: Variables, ctx: AgentContext| async move {
            Ok(send_email(&input, &ctx))
        })),
    ];
    Ok(agents)
}

fn vars<const N: usize>(entries: [(&str, Value); N]) -> Variables {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn str_input<'a>(input: &'a Variables, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn extract(input: &Variables) -> Variables {
    let file = str_input(input, "file").unwrap_or_default();
    let stem = file
        .rsplit('/')
        .next()
        .and_then(|name| name.split('.').next())
        .unwrap_or_default();
    let vendor = str_input(input, "vendor")
        .map(str::to_string)
        .unwrap_or_else(|| stem.split(['-', '_']).next().unwrap_or_default().to_string());
    let amount = input.get("amount").and_then(Value::as_f64).unwrap_or(1250.0);

    let extension = file.rsplit('.').next().unwrap_or_default().to_lowercase();
    let confidence = match extension.as_str() {
        "pdf" => 0.95,
        "png" | "jpg" | "jpeg" => 0.72,
        _ => 0.9,
    };

    vars([
        ("text", json!(format!("Invoice {} issued by {}", file, vendor))),
        ("amount", json!(amount)),
        ("vendor", json!(vendor)),
        ("confidence", json!(confidence)),
    ])
}

fn categorize_expense(input: &Variables) -> Variables {
    let haystack = format!(
        "{} {}",
        str_input(input, "text").unwrap_or_default(),
        str_input(input, "vendor").unwrap_or_default()
    )
    .to_lowercase();

    let category = if ["software", "cloud", "saas"].iter().any(|k| haystack.contains(k)) {
        "software"
    } else if ["travel", "hotel", "airline"].iter().any(|k| haystack.contains(k)) {
        "travel"
    } else if ["office", "paper", "staples"].iter().any(|k| haystack.contains(k)) {
        "office_supplies"
    } else {
        "general"
    };

    vars([
        ("category", json!(category)),
        ("review_required", json!(false)),
    ])
}

fn compute_vat(input: &Variables) -> agentflow_core::Result<Variables> {
    let amount = input
        .get("amount")
        .and_then(Value::as_f64)
        .ok_or_else(|| agentflow_core::Error::agent_execution("calculate_vat", "amount is not a number"))?;
    if amount < 0.0 {
        return Err(agentflow_core::Error::agent_execution(
            "calculate_vat",
            format!("negative amount {}", amount),
        ));
    }
    let rate = input
        .get("rate")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_VAT_RATE);
    let vat_amount = round2(amount * rate);

    Ok(vars([
        ("vat_amount", json!(vat_amount)),
        ("gross_amount", json!(round2(amount + vat_amount))),
    ]))
}

fn analyse(input: &Variables) -> Variables {
    let category = str_input(input, "category").unwrap_or("general");
    let amount = input.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
    let vat_amount = input.get("vat_amount").and_then(Value::as_f64).unwrap_or(0.0);
    let total_due = round2(amount + vat_amount);

    vars([
        (
            "summary",
            json!(format!(
                "{} expense of {:.2} plus {:.2} VAT",
                category, amount, vat_amount
            )),
        ),
        ("total_due", json!(total_due)),
    ])
}

fn render_report(input: &Variables) -> agentflow_core::Result<Variables> {
    let period = str_input(input, "period").unwrap_or("current");
    let format = str_input(input, "format").unwrap_or("pdf").to_lowercase();
    let extension = match format.as_str() {
        "pdf" | "csv" | "json" | "xlsx" => format.clone(),
        "excel" => "xlsx".to_string(),
        other => {
            return Err(agentflow_core::Error::agent_execution(
                "report_generator",
                format!("unsupported report format '{}'", other),
            ))
        }
    };

    Ok(vars([
        ("report_path", json!(format!("reports/{}.{}", period, extension))),
        ("format", json!(extension)),
    ]))
}

fn send_email(input: &Variables, ctx: &AgentContext) -> Variables {
    let recipient = str_input(input, "recipient").unwrap_or(DEFAULT_RECIPIENT);
    let attachment = input.get("attachment").cloned().unwrap_or(Value::Null);

    if let Some(bus) = &ctx.bus {
        bus.send(
            "email_sender",
            None,
            MessageType::Notification,
            json!({
                "event": "email_sent",
                "execution_id": ctx.execution_id,
                "recipient": recipient,
                "attachment": attachment,
            }),
            None,
        );
    }

    vars([("sent", json!(true)), ("recipient", json!(recipient))])
}
