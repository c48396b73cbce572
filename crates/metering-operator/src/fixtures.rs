//! In-memory resource fixtures for unit tests

use crate::crd::{
    Report, ReportDataSource, ReportDataSourceSpec, ReportDataSourceStatus, ReportGenerationQuery,
    ReportGenerationQuerySpec, ReportGenerationQueryStatus, ReportSpec, ReportStatus,
    ScheduledReport, ScheduledReportSpec, ScheduledReportStatus,
};
use crate::getter::{Getters, MemoryGetter};

pub const NAMESPACE: &str = "metering";

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// A query with ordinary dependencies and no view yet
pub fn query(name: &str, report_queries: &[&str]) -> ReportGenerationQuery {
    let mut query = ReportGenerationQuery::new(
        name,
        ReportGenerationQuerySpec {
            report_queries: names(report_queries),
            query: "SELECT 1".to_string(),
            ..Default::default()
        },
    );
    query.metadata.namespace = Some(NAMESPACE.to_string());
    query
}

/// A query with only dynamic dependencies
pub fn dynamic_query(name: &str, dynamic_report_queries: &[&str]) -> ReportGenerationQuery {
    let mut query = query(name, &[]);
    query.spec.dynamic_report_queries = names(dynamic_report_queries);
    query
}

/// Mark a query as backed by a view
pub fn with_view(mut query: ReportGenerationQuery, view_name: &str) -> ReportGenerationQuery {
    query.status = Some(ReportGenerationQueryStatus {
        view_name: view_name.to_string(),
        conditions: vec![],
    });
    query
}

/// Disable the view of a query
pub fn view_disabled(mut query: ReportGenerationQuery) -> ReportGenerationQuery {
    query.spec.view.disabled = true;
    query
}

pub fn data_source(name: &str, table_name: &str) -> ReportDataSource {
    let mut ds = ReportDataSource::new(name, ReportDataSourceSpec::default());
    ds.metadata.namespace = Some(NAMESPACE.to_string());
    ds.status = Some(ReportDataSourceStatus {
        table_name: table_name.to_string(),
        last_import_time: None,
    });
    ds
}

pub fn report(name: &str, table_name: &str) -> Report {
    let mut report = Report::new(
        name,
        ReportSpec {
            generation_query: "source-query".to_string(),
            ..Default::default()
        },
    );
    report.metadata.namespace = Some(NAMESPACE.to_string());
    report.status = Some(ReportStatus {
        table_name: table_name.to_string(),
        ..Default::default()
    });
    report
}

pub fn scheduled_report(name: &str, table_name: &str) -> ScheduledReport {
    let mut report = ScheduledReport::new(
        name,
        ScheduledReportSpec {
            generation_query: "source-query".to_string(),
            schedule: Default::default(),
        },
    );
    report.metadata.namespace = Some(NAMESPACE.to_string());
    report.status = Some(ScheduledReportStatus {
        table_name: table_name.to_string(),
        last_report_time: None,
    });
    report
}

/// One in-memory getter per resource kind
#[derive(Default)]
pub struct Fixture {
    pub queries: MemoryGetter<ReportGenerationQuery>,
    pub data_sources: MemoryGetter<ReportDataSource>,
    pub reports: MemoryGetter<Report>,
    pub scheduled_reports: MemoryGetter<ScheduledReport>,
}

impl Fixture {
    pub fn with_queries(queries: Vec<ReportGenerationQuery>) -> Self {
        Self {
            queries: queries.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn getters(&self) -> Getters<'_> {
        Getters {
            queries: &self.queries,
            data_sources: &self.data_sources,
            reports: &self.reports,
            scheduled_reports: &self.scheduled_reports,
        }
    }
}
