//! Status conditions describing dependency resolution
//!
//! Resolution outcomes are surfaced on `ReportGenerationQuery` status as a
//! `DependenciesResolved` condition so operators can see every blocking
//! dependency without reading operator logs.

use crate::crd::{QueryCondition, ReportGenerationQueryStatus};
use crate::dependency::ResolvedDependencies;
use crate::error::{OperatorError, Result};
use chrono::Utc;

/// Condition type written for dependency resolution
pub const DEPENDENCIES_RESOLVED: &str = "DependenciesResolved";

/// Machine-readable reason for a resolution outcome
fn reason_for(error: &OperatorError) -> &'static str {
    match error {
        OperatorError::DependencyValidation(_) => "UninitializedDependencies",
        OperatorError::NotFound { .. } => "DependencyNotFound",
        OperatorError::CycleDetected { .. } | OperatorError::CyclicReference { .. } => {
            "DependencyCycle"
        }
        OperatorError::InvalidConfig(_) => "InvalidSpec",
        _ => "ResolutionError",
    }
}

/// Build the `DependenciesResolved` condition for a resolution outcome
pub fn dependencies_condition(result: &Result<ResolvedDependencies>) -> QueryCondition {
    let now = Utc::now().to_rfc3339();

    match result {
        Ok(resolved) => QueryCondition {
            r#type: DEPENDENCIES_RESOLVED.to_string(),
            status: "True".to_string(),
            reason: "DependenciesReady".to_string(),
            message: format!(
                "{} query, {} dynamic query, {} data source, {} report and {} scheduled report dependencies ready",
                resolved.queries.len(),
                resolved.dynamic_queries.len(),
                resolved.data_sources.len(),
                resolved.reports.len(),
                resolved.scheduled_reports.len()
            ),
            last_transition_time: now,
        },
        Err(e) => QueryCondition {
            r#type: DEPENDENCIES_RESOLVED.to_string(),
            status: "False".to_string(),
            reason: reason_for(e).to_string(),
            message: e.to_string(),
            last_transition_time: now,
        },
    }
}

/// Record a condition on a status, replacing any condition of the same type
///
/// The previous transition time is kept when the condition's status did not
/// change.
pub fn set_condition(status: &mut ReportGenerationQueryStatus, mut condition: QueryCondition) {
    match status
        .conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => status.conditions.push(condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{DependencyViolations, ViolationCategory};

    fn violations() -> OperatorError {
        let mut violations = DependencyViolations::default();
        violations.add(
            ViolationCategory::UninitializedDataSources,
            vec!["pod-cpu".to_string()],
        );
        OperatorError::DependencyValidation(violations)
    }

    #[test]
    fn test_ready_condition() {
        let condition = dependencies_condition(&Ok(ResolvedDependencies::default()));
        assert_eq!(condition.r#type, DEPENDENCIES_RESOLVED);
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason, "DependenciesReady");
    }

    #[test]
    fn test_failure_reasons() {
        let condition = dependencies_condition(&Err(violations()));
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, "UninitializedDependencies");
        assert!(condition.message.contains("pod-cpu"));

        let condition = dependencies_condition(&Err(OperatorError::not_found(
            "Report",
            "metering",
            "missing",
        )));
        assert_eq!(condition.reason, "DependencyNotFound");

        let condition = dependencies_condition(&Err(OperatorError::CycleDetected {
            depth: 100,
            name: "a".to_string(),
        }));
        assert_eq!(condition.reason, "DependencyCycle");

        let condition =
            dependencies_condition(&Err(OperatorError::QueryFailed("boom".to_string())));
        assert_eq!(condition.reason, "ResolutionError");
    }

    #[test]
    fn test_set_condition_replaces_same_type() {
        let mut status = ReportGenerationQueryStatus::default();

        let mut first = dependencies_condition(&Err(violations()));
        first.last_transition_time = "2024-01-01T00:00:00+00:00".to_string();
        set_condition(&mut status, first);

        // Same status keeps the original transition time
        set_condition(&mut status, dependencies_condition(&Err(violations())));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(
            status.conditions[0].last_transition_time,
            "2024-01-01T00:00:00+00:00"
        );

        // Status flip records a new transition
        set_condition(
            &mut status,
            dependencies_condition(&Ok(ResolvedDependencies::default())),
        );
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
        assert_ne!(
            status.conditions[0].last_transition_time,
            "2024-01-01T00:00:00+00:00"
        );
    }
}
