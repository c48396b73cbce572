//! Readiness partitioning of fetched dependencies

use super::fetch::{dependent_data_sources, dependent_reports, dependent_scheduled_reports};
use super::graph::{dependent_generation_queries, DependentQueries, TraversalOptions};
use crate::crd::{Materialized, ReportDataSource, ReportGenerationQuery, Report, ScheduledReport};
use crate::error::Result;
use crate::getter::Getters;
use std::sync::Arc;
use tracing::debug;

/// Dependencies of one kind split by readiness, in encounter order
#[derive(Debug, Clone)]
pub struct Partitioned<K> {
    /// Dependencies with a populated readiness attribute
    pub initialized: Vec<Arc<K>>,
    /// Dependencies still waiting to be materialized
    pub uninitialized: Vec<Arc<K>>,
}

impl<K> Default for Partitioned<K> {
    fn default() -> Self {
        Self {
            initialized: Vec::new(),
            uninitialized: Vec::new(),
        }
    }
}

impl<K: Materialized> FromIterator<Arc<K>> for Partitioned<K> {
    fn from_iter<I: IntoIterator<Item = Arc<K>>>(iter: I) -> Self {
        let (initialized, uninitialized) = iter.into_iter().partition(|dep| dep.is_initialized());
        Self {
            initialized,
            uninitialized,
        }
    }
}

/// Readiness of every dependency of a query
///
/// Dynamic query dependencies are carried through as-is; they are usable
/// whether or not they have a view.
#[derive(Debug, Clone, Default)]
pub struct DependenciesStatus {
    pub queries: Partitioned<ReportGenerationQuery>,
    pub dynamic_queries: Vec<Arc<ReportGenerationQuery>>,
    pub data_sources: Partitioned<ReportDataSource>,
    pub reports: Partitioned<Report>,
    pub scheduled_reports: Partitioned<ScheduledReport>,
}

impl DependenciesStatus {
    /// Partition already fetched dependencies
    pub fn from_dependencies(
        queries: DependentQueries,
        data_sources: Vec<Arc<ReportDataSource>>,
        reports: Vec<Arc<Report>>,
        scheduled_reports: Vec<Arc<ScheduledReport>>,
    ) -> Self {
        Self {
            queries: queries.view.into_iter().collect(),
            dynamic_queries: queries.dynamic,
            data_sources: data_sources.into_iter().collect(),
            reports: reports.into_iter().collect(),
            scheduled_reports: scheduled_reports.into_iter().collect(),
        }
    }

    /// Whether any partitionable dependency is not ready
    pub fn has_uninitialized(&self) -> bool {
        !(self.queries.uninitialized.is_empty()
            && self.data_sources.uninitialized.is_empty()
            && self.reports.uninitialized.is_empty()
            && self.scheduled_reports.uninitialized.is_empty())
    }
}

/// Fetch every dependency of `query` and partition it by readiness
///
/// Queries are walked first, then data sources, reports and scheduled
/// reports are fetched in that order. Any lookup failure aborts the whole
/// operation.
pub fn dependencies_status(
    getters: Getters<'_>,
    query: &ReportGenerationQuery,
    options: TraversalOptions,
) -> Result<DependenciesStatus> {
    let queries = dependent_generation_queries(getters.queries, query, options)?;
    let data_sources = dependent_data_sources(getters.data_sources, query)?;
    let reports = dependent_reports(getters.reports, query)?;
    let scheduled_reports = dependent_scheduled_reports(getters.scheduled_reports, query)?;

    let status =
        DependenciesStatus::from_dependencies(queries, data_sources, reports, scheduled_reports);

    debug!(
        initialized_queries = status.queries.initialized.len(),
        uninitialized_queries = status.queries.uninitialized.len(),
        dynamic_queries = status.dynamic_queries.len(),
        initialized_data_sources = status.data_sources.initialized.len(),
        uninitialized_data_sources = status.data_sources.uninitialized.len(),
        initialized_reports = status.reports.initialized.len(),
        uninitialized_reports = status.reports.uninitialized.len(),
        initialized_scheduled_reports = status.scheduled_reports.initialized.len(),
        uninitialized_scheduled_reports = status.scheduled_reports.uninitialized.len(),
        "Partitioned query dependencies"
    );

    Ok(status)
}
