//! Dependency validation
//!
//! Turns a [`DependenciesStatus`] into either the set of ready dependencies
//! a report table may be built from, or a [`DependencyViolations`] listing
//! every dependency that blocks it.

use super::status::DependenciesStatus;
use crate::crd::{
    Materialized, ReportDataSource, ReportGenerationQuery, Report, ScheduledReport,
};
use crate::error::{OperatorError, Result};
use kube::ResourceExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Prefix of the rendered violation message
const VALIDATION_ERROR_PREFIX: &str = "ReportGenerationQuery dependency validation error";

/// Reason a dependency blocks its dependent query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationCategory {
    /// Ordinary query dependency with `spec.view.disabled=true`
    ViewDisabled,
    /// ReportDataSource without a table
    UninitializedDataSources,
    /// Ordinary query dependency without a view
    UninitializedQueries,
    /// Report without a table
    UninitializedReports,
    /// ScheduledReport without a table
    UninitializedScheduledReports,
}

impl ViolationCategory {
    /// Every category, in rendering order
    pub const ALL: [ViolationCategory; 5] = [
        ViolationCategory::ViewDisabled,
        ViolationCategory::UninitializedDataSources,
        ViolationCategory::UninitializedQueries,
        ViolationCategory::UninitializedReports,
        ViolationCategory::UninitializedScheduledReports,
    ];

    /// Human-readable label used when rendering the category
    pub fn label(self) -> &'static str {
        match self {
            ViolationCategory::ViewDisabled => {
                "invalid ReportGenerationQuery, references ReportGenerationQueries with spec.view.disabled=true"
            }
            ViolationCategory::UninitializedDataSources => {
                "ReportGenerationQuery has uninitialized ReportDataSource dependencies"
            }
            ViolationCategory::UninitializedQueries => {
                "ReportGenerationQuery has uninitialized ReportGenerationQuery dependencies"
            }
            ViolationCategory::UninitializedReports => {
                "ReportGenerationQuery has uninitialized Report dependencies"
            }
            ViolationCategory::UninitializedScheduledReports => {
                "ReportGenerationQuery has uninitialized ScheduledReport dependencies"
            }
        }
    }
}

/// Blocking dependencies of one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub category: ViolationCategory,
    pub names: Vec<String>,
}

/// Every blocking dependency of a query, grouped by category
///
/// Groups are kept in [`ViolationCategory::ALL`] order and empty groups are
/// never stored. `Display` renders the single operator-facing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyViolations {
    violations: Vec<Violation>,
}

impl DependencyViolations {
    /// Record the blocking dependencies of a category
    ///
    /// Empty name lists are ignored; names for an already recorded category
    /// are appended to it.
    pub fn add(&mut self, category: ViolationCategory, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        match self
            .violations
            .iter_mut()
            .find(|v| v.category == category)
        {
            Some(existing) => existing.names.extend(names),
            None => {
                self.violations.push(Violation { category, names });
                self.violations.sort_by_key(|v| v.category);
            }
        }
    }

    /// Whether no violations were recorded
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Recorded violations in rendering order
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    /// Names recorded for a category
    pub fn names(&self, category: ViolationCategory) -> &[String] {
        self.violations
            .iter()
            .find(|v| v.category == category)
            .map(|v| v.names.as_slice())
            .unwrap_or_default()
    }
}

impl fmt::Display for DependencyViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.category.label(), v.names.join(", ")))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}: {}", VALIDATION_ERROR_PREFIX, groups)
    }
}

/// Ready dependencies of a query
///
/// This is everything the report table provisioning step may read. Dynamic
/// queries are included regardless of readiness.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    pub queries: Vec<Arc<ReportGenerationQuery>>,
    pub dynamic_queries: Vec<Arc<ReportGenerationQuery>>,
    pub data_sources: Vec<Arc<ReportDataSource>>,
    pub reports: Vec<Arc<Report>>,
    pub scheduled_reports: Vec<Arc<ScheduledReport>>,
}

/// Name and readiness attribute of a resolved dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedResource {
    pub name: String,
    /// View name for queries, table name for everything else
    pub table: String,
}

/// Serializable view of [`ResolvedDependencies`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySummary {
    pub queries: Vec<ResolvedResource>,
    pub dynamic_queries: Vec<ResolvedResource>,
    pub data_sources: Vec<ResolvedResource>,
    pub reports: Vec<ResolvedResource>,
    pub scheduled_reports: Vec<ResolvedResource>,
}

fn summarize<K: kube::Resource + Materialized>(items: &[Arc<K>]) -> Vec<ResolvedResource> {
    items
        .iter()
        .map(|item| ResolvedResource {
            name: item.name_any(),
            table: item.readiness_attribute().to_string(),
        })
        .collect()
}

impl ResolvedDependencies {
    /// Names and readiness attributes of every resolved dependency
    pub fn summary(&self) -> DependencySummary {
        DependencySummary {
            queries: summarize(&self.queries),
            dynamic_queries: summarize(&self.dynamic_queries),
            data_sources: summarize(&self.data_sources),
            reports: summarize(&self.reports),
            scheduled_reports: summarize(&self.scheduled_reports),
        }
    }
}

fn names_of<K: kube::Resource>(items: &[Arc<K>]) -> Vec<String> {
    items.iter().map(|item| item.name_any()).collect()
}

/// Collect every blocking dependency in a status
pub fn dependency_violations(status: &DependenciesStatus) -> DependencyViolations {
    let (view_disabled, uninitialized): (Vec<_>, Vec<_>) = status
        .queries
        .uninitialized
        .iter()
        .partition(|query| query.view_disabled());

    let mut violations = DependencyViolations::default();
    violations.add(
        ViolationCategory::ViewDisabled,
        view_disabled.iter().map(|q| q.name_any()).collect(),
    );
    violations.add(
        ViolationCategory::UninitializedDataSources,
        names_of(&status.data_sources.uninitialized),
    );
    violations.add(
        ViolationCategory::UninitializedQueries,
        uninitialized.iter().map(|q| q.name_any()).collect(),
    );
    violations.add(
        ViolationCategory::UninitializedReports,
        names_of(&status.reports.uninitialized),
    );
    violations.add(
        ViolationCategory::UninitializedScheduledReports,
        names_of(&status.scheduled_reports.uninitialized),
    );
    violations
}

/// Accept a status only if every required dependency is ready
pub fn validate_dependencies_status(status: DependenciesStatus) -> Result<ResolvedDependencies> {
    if status.has_uninitialized() {
        let violations = dependency_violations(&status);
        warn!(violations = %violations, "Query dependencies are not ready");
        return Err(OperatorError::DependencyValidation(violations));
    }

    Ok(ResolvedDependencies {
        queries: status.queries.initialized,
        dynamic_queries: status.dynamic_queries,
        data_sources: status.data_sources.initialized,
        reports: status.reports.initialized,
        scheduled_reports: status.scheduled_reports.initialized,
    })
}
