//! Batch scheduling of workflow steps
//!
//! Groups steps into waves of mutually independent steps. Every step of a wave
//! only depends on steps of earlier waves, so a wave can be dispatched
//! concurrently. A round that assigns nothing while steps remain means the
//! graph cannot be ordered (a cycle, or a dependency on an unknown step).

use crate::registry::AgentRegistry;
use crate::template::WorkflowStep;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::trace;

/// Topologically group steps into concurrently runnable batches
pub fn batches(steps: &[WorkflowStep]) -> Result<Vec<Vec<&WorkflowStep>>> {
    let mut assigned: HashSet<&str> = HashSet::with_capacity(steps.len());
    let mut remaining: Vec<&WorkflowStep> = steps.iter().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&WorkflowStep>, Vec<&WorkflowStep>) = remaining
            .into_iter()
            .partition(|step| {
                step.dependencies
                    .iter()
                    .all(|dep| assigned.contains(dep.as_str()))
            });

        if ready.is_empty() {
            return Err(Error::CycleDetected {
                unresolved: blocked.iter().map(|s| s.step_id.clone()).collect(),
            });
        }

        trace!(
            batch = waves.len(),
            steps = ?ready.iter().map(|s| s.step_id.as_str()).collect::<Vec<_>>(),
            "Scheduled batch"
        );

        assigned.extend(ready.iter().copied().map(|s| s.step_id.as_str()));
        waves.push(ready);
        remaining = blocked;
    }

    Ok(waves)
}

/// Order steps by agent preference: higher reliability and lower cost first
///
/// The sort is stable, so equally scored steps keep their template order.
/// Steps whose agent is not registered score zero.
pub fn prioritize<'a>(
    steps: &[&'a WorkflowStep],
    registry: &AgentRegistry,
) -> Vec<&'a WorkflowStep> {
    let mut scored: Vec<(f64, &'a WorkflowStep)> = steps
        .iter()
        .map(|step| {
            let score = registry
                .metadata(&step.agent_id)
                .map(|meta| meta.priority_score())
                .unwrap_or(0.0);
            (score, *step)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, step)| step).collect()
}
