//! ReportGenerationQuery dependency resolution
//!
//! Before a report table can be built from a query, every dependency the
//! query names has to exist and be materialized. Resolution runs in four
//! steps:
//!
//! 1. [`graph`] walks the query's ordinary and dynamic query references
//!    transitively, bounded by depth.
//! 2. [`fetch`] looks up the data sources, reports and scheduled reports the
//!    query lists directly.
//! 3. [`status`] partitions everything fetched by readiness.
//! 4. [`validate`] accepts the result only if nothing required is pending,
//!    otherwise it reports every blocking dependency at once.
//!
//! [`DependencyResolver`] runs all four steps for a root query.

pub mod fetch;
pub mod graph;
pub mod status;
pub mod validate;

pub use fetch::{dependent_data_sources, dependent_reports, dependent_scheduled_reports};
pub use graph::{
    dependent_generation_queries, dependent_queries, DependentQueries, ReferenceKind,
    TraversalOptions, MAX_DEPTH,
};
pub use status::{dependencies_status, DependenciesStatus, Partitioned};
pub use validate::{
    dependency_violations, validate_dependencies_status, DependencySummary, DependencyViolations,
    ResolvedDependencies, ResolvedResource, Violation, ViolationCategory,
};

use crate::crd::{validate_resource_spec, ReportGenerationQuery};
use crate::error::Result;
use crate::getter::Getters;
use kube::ResourceExt;
use tracing::{debug, instrument, warn};

/// Metrics for dependency resolution
#[derive(Clone)]
pub struct ResolverMetrics {
    /// Counter for resolution attempts
    pub resolutions: metrics::Counter,
    /// Counter for failed resolutions
    pub failures: metrics::Counter,
    /// Histogram for resolution duration
    pub duration: metrics::Histogram,
}

impl ResolverMetrics {
    /// Create new resolver metrics
    pub fn new() -> Self {
        Self {
            resolutions: metrics::counter!("metering_dependency_resolutions_total"),
            failures: metrics::counter!("metering_dependency_resolution_failures_total"),
            duration: metrics::histogram!("metering_dependency_resolution_duration_seconds"),
        }
    }
}

impl Default for ResolverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves and validates the dependencies of ReportGenerationQueries
pub struct DependencyResolver<'a> {
    getters: Getters<'a>,
    options: TraversalOptions,
    metrics: Option<ResolverMetrics>,
}

impl<'a> DependencyResolver<'a> {
    /// Create a resolver with the default depth bound and no metrics
    pub fn new(getters: Getters<'a>) -> Self {
        Self {
            getters,
            options: TraversalOptions::default(),
            metrics: None,
        }
    }

    /// Override traversal options
    pub fn with_options(mut self, options: TraversalOptions) -> Self {
        self.options = options;
        self
    }

    /// Record resolution metrics
    pub fn with_metrics(mut self, metrics: ResolverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Traversal options in effect
    pub fn options(&self) -> TraversalOptions {
        self.options
    }

    /// Resolve every dependency of `query`
    ///
    /// Returns the ready dependencies, or the first lookup failure, depth
    /// bound violation, or the aggregate of every dependency that is not
    /// ready. There is no partial result.
    #[instrument(skip(self, query), fields(name = %query.name_any(), namespace = query.namespace()))]
    pub fn resolve(&self, query: &ReportGenerationQuery) -> Result<ResolvedDependencies> {
        let start = std::time::Instant::now();

        if let Some(ref metrics) = self.metrics {
            metrics.resolutions.increment(1);
        }

        let result = validate_resource_spec("ReportGenerationQuery", &query.name_any(), &query.spec)
            .and_then(|_| dependencies_status(self.getters, query, self.options))
            .and_then(validate_dependencies_status);

        if let Some(ref metrics) = self.metrics {
            metrics.duration.record(start.elapsed().as_secs_f64());
        }

        match &result {
            Ok(resolved) => debug!(
                queries = resolved.queries.len(),
                dynamic_queries = resolved.dynamic_queries.len(),
                data_sources = resolved.data_sources.len(),
                reports = resolved.reports.len(),
                scheduled_reports = resolved.scheduled_reports.len(),
                "Resolved query dependencies"
            ),
            Err(e) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.failures.increment(1);
                }
                warn!(error = %e, "Query dependency resolution failed");
            }
        }

        result
    }
}
