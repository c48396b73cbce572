//! Direct dependencies of a query that are not queries themselves
//!
//! Data sources, reports and scheduled reports never reference further
//! dependencies of their own, so only the names listed on the query are
//! fetched. Results keep list order, repeated names are fetched again, and
//! the first failed lookup aborts the fetch.

use crate::crd::{ReportDataSource, ReportGenerationQuery, Report, ScheduledReport};
use crate::error::Result;
use crate::getter::ResourceGetter;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::trace;

fn fetch_named<K>(
    getter: &dyn ResourceGetter<K>,
    namespace: &str,
    names: &[String],
) -> Result<Vec<Arc<K>>> {
    names
        .iter()
        .map(|name| {
            trace!(namespace, name = %name, "Fetching dependency");
            getter.get(namespace, name)
        })
        .collect()
}

fn query_namespace(query: &ReportGenerationQuery) -> String {
    query.namespace().unwrap_or_else(|| "default".to_string())
}

/// Fetch the ReportDataSources listed in `spec.reportDataSources`
pub fn dependent_data_sources(
    getter: &dyn ResourceGetter<ReportDataSource>,
    query: &ReportGenerationQuery,
) -> Result<Vec<Arc<ReportDataSource>>> {
    fetch_named(getter, &query_namespace(query), &query.spec.report_data_sources)
}

/// Fetch the Reports listed in `spec.reports`
pub fn dependent_reports(
    getter: &dyn ResourceGetter<Report>,
    query: &ReportGenerationQuery,
) -> Result<Vec<Arc<Report>>> {
    fetch_named(getter, &query_namespace(query), &query.spec.reports)
}

/// Fetch the ScheduledReports listed in `spec.scheduledReports`
pub fn dependent_scheduled_reports(
    getter: &dyn ResourceGetter<ScheduledReport>,
    query: &ReportGenerationQuery,
) -> Result<Vec<Arc<ScheduledReport>>> {
    fetch_named(getter, &query_namespace(query), &query.spec.scheduled_reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;
    use crate::fixtures::{data_source, query, report, scheduled_report, Fixture};
    use std::cell::RefCell;

    fn root() -> ReportGenerationQuery {
        let mut root = query("root", &[]);
        root.spec.report_data_sources = vec![
            "pod-memory".to_string(),
            "pod-cpu".to_string(),
            "pod-memory".to_string(),
        ];
        root.spec.reports = vec!["cpu-2024".to_string()];
        root.spec.scheduled_reports = vec!["cpu-daily".to_string()];
        root
    }

    fn fixture() -> Fixture {
        let mut fixture = Fixture::default();
        fixture.data_sources.insert(data_source("pod-cpu", "datasource_pod_cpu"));
        fixture.data_sources.insert(data_source("pod-memory", ""));
        fixture.reports.insert(report("cpu-2024", "report_cpu_2024"));
        fixture
            .scheduled_reports
            .insert(scheduled_report("cpu-daily", "scheduledreport_cpu_daily"));
        fixture
    }

    #[test]
    fn test_data_sources_keep_order_and_duplicates() {
        let fixture = fixture();
        let sources = dependent_data_sources(&fixture.data_sources, &root()).unwrap();
        let names: Vec<_> = sources.iter().map(|ds| ds.name_any()).collect();
        assert_eq!(names, vec!["pod-memory", "pod-cpu", "pod-memory"]);
    }

    #[test]
    fn test_reports_and_scheduled_reports() {
        let fixture = fixture();
        let root = root();

        let reports = dependent_reports(&fixture.reports, &root).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name_any(), "cpu-2024");

        let scheduled = dependent_scheduled_reports(&fixture.scheduled_reports, &root).unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].name_any(), "cpu-daily");
    }

    #[test]
    fn test_empty_lists_fetch_nothing() {
        let fixture = Fixture::default();
        let root = query("root", &[]);
        assert!(dependent_data_sources(&fixture.data_sources, &root)
            .unwrap()
            .is_empty());
        assert!(dependent_reports(&fixture.reports, &root).unwrap().is_empty());
        assert!(dependent_scheduled_reports(&fixture.scheduled_reports, &root)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_first_failure_stops_fetching() {
        let fixture = fixture();
        let mut root = root();
        root.spec.report_data_sources = vec![
            "pod-cpu".to_string(),
            "missing".to_string(),
            "pod-memory".to_string(),
        ];

        let fetched = RefCell::new(Vec::new());
        let getter = |namespace: &str, name: &str| -> Result<Arc<ReportDataSource>> {
            fetched.borrow_mut().push(name.to_string());
            fixture.data_sources.get(namespace, name)
        };

        let result = dependent_data_sources(&getter, &root);
        assert!(matches!(result, Err(OperatorError::NotFound { ref name, .. }) if name == "missing"));
        assert_eq!(fetched.into_inner(), vec!["pod-cpu", "missing"]);
    }
}
