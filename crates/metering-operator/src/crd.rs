//! Custom Resource Definitions for the metering reporting resources
//!
//! This module defines the four resource kinds the dependency resolver reads:
//! `ReportGenerationQuery`, `ReportDataSource`, `Report` and `ScheduledReport`.
//! Each kind carries a readiness attribute in its status (a view name or a
//! backing table name) that external collaborators fill in once the resource
//! has been materialized.

use crate::error::OperatorError;
use crate::table::Column;
use kube::CustomResource;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::warn;
use validator::{Validate, ValidationError};

/// API group shared by every metering resource
pub const API_GROUP: &str = "metering.openshift.io";

/// API version shared by every metering resource
pub const API_VERSION: &str = "v1alpha1";

/// Regex for validating Kubernetes names (RFC 1123 subdomain)
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Validate a Kubernetes name (RFC 1123 subdomain)
fn validate_k8s_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new("empty_name").with_message("name must not be empty".into()));
    }
    if value.len() > 63 {
        return Err(
            ValidationError::new("name_too_long").with_message("name exceeds 63 characters".into())
        );
    }
    if !NAME_REGEX.is_match(value) {
        return Err(ValidationError::new("invalid_name").with_message(
            format!("'{}' is not a valid Kubernetes name (RFC 1123)", value).into(),
        ));
    }
    Ok(())
}

/// Validate every name in a reference list
fn validate_k8s_names(values: &[String]) -> Result<(), ValidationError> {
    values.iter().try_for_each(|value| validate_k8s_name(value))
}

/// Validate a resource spec, collecting every field error into one message
pub fn validate_resource_spec<S: Validate>(
    kind: &str,
    name: &str,
    spec: &S,
) -> crate::error::Result<()> {
    spec.validate().map_err(|errors| {
        let mut error_messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{}: {}", field, message)
                })
            })
            .collect();
        if error_messages.is_empty() {
            // Only nested errors, which field_errors() does not list
            error_messages.push(errors.to_string());
        }
        error_messages.sort();
        let error_msg = error_messages.join("; ");
        warn!(kind, name, errors = %error_msg, "Spec validation failed");
        OperatorError::InvalidConfig(format!("{} {}: {}", kind, name, error_msg))
    })
}

/// Readiness of a resource, derived solely from its readiness attribute
///
/// A resource is initialized once an external collaborator has recorded a
/// non-empty view or table name for it. Nothing else (timestamps,
/// generations, phases) is consulted.
pub trait Materialized {
    /// The view name or backing table name, empty while not materialized
    fn readiness_attribute(&self) -> &str;

    /// Whether the readiness attribute has been populated
    fn is_initialized(&self) -> bool {
        !self.readiness_attribute().is_empty()
    }
}

// ============================================================================
// ReportGenerationQuery CRD
// ============================================================================

/// ReportGenerationQuery custom resource definition
///
/// A named reporting query that may depend on other queries, data sources,
/// reports and scheduled reports in the same namespace. Once ready it is
/// backed by a view whose name is recorded in `status.viewName`.
///
/// # Example
///
/// ```yaml
/// apiVersion: metering.openshift.io/v1alpha1
/// kind: ReportGenerationQuery
/// metadata:
///   name: namespace-cpu-usage
/// spec:
///   reportQueries:
///     - pod-cpu-usage-raw
///   reportDataSources:
///     - pod-cpu-request
///   columns:
///     - name: namespace
///       type: string
///   query: |
///     SELECT namespace, sum(pod_usage_cpu_core_seconds) ...
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "metering.openshift.io",
    version = "v1alpha1",
    kind = "ReportGenerationQuery",
    plural = "reportgenerationqueries",
    shortname = "rgq",
    namespaced,
    status = "ReportGenerationQueryStatus",
    printcolumn = r#"{"name":"View", "type":"string", "jsonPath":".status.viewName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReportGenerationQuerySpec {
    /// ReportGenerationQueries this query reads through their views
    #[serde(default)]
    #[validate(custom(function = "validate_k8s_names"))]
    pub report_queries: Vec<String>,

    /// ReportGenerationQueries inlined at render time; never readiness-checked
    #[serde(default)]
    #[validate(custom(function = "validate_k8s_names"))]
    pub dynamic_report_queries: Vec<String>,

    /// ReportDataSources this query reads from
    #[serde(default)]
    #[validate(custom(function = "validate_k8s_names"))]
    pub report_data_sources: Vec<String>,

    /// Reports this query reads from
    #[serde(default)]
    #[validate(custom(function = "validate_k8s_names"))]
    pub reports: Vec<String>,

    /// ScheduledReports this query reads from
    #[serde(default)]
    #[validate(custom(function = "validate_k8s_names"))]
    pub scheduled_reports: Vec<String>,

    /// View settings
    #[serde(default)]
    pub view: ViewSpec,

    /// Output columns of the query
    #[serde(default)]
    #[validate(nested)]
    pub columns: Vec<Column>,

    /// SQL query text
    #[serde(default)]
    pub query: String,
}

/// View configuration of a ReportGenerationQuery
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    /// When true no view is ever created for this query
    #[serde(default)]
    pub disabled: bool,
}

/// Status of a ReportGenerationQuery resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportGenerationQueryStatus {
    /// Name of the view backing this query, empty until created
    #[serde(default)]
    pub view_name: String,

    /// Conditions for detailed status tracking
    #[serde(default)]
    pub conditions: Vec<QueryCondition>,
}

/// Condition for tracking ReportGenerationQuery status
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryCondition {
    /// Type of condition: DependenciesResolved
    pub r#type: String,

    /// Status: True, False, Unknown
    pub status: String,

    /// Machine-readable reason
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last transition time
    pub last_transition_time: String,
}

impl ReportGenerationQuery {
    /// Whether `spec.view.disabled` is set
    pub fn view_disabled(&self) -> bool {
        self.spec.view.disabled
    }
}

impl Materialized for ReportGenerationQuery {
    fn readiness_attribute(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.view_name.as_str())
            .unwrap_or_default()
    }
}

// ============================================================================
// ReportDataSource CRD
// ============================================================================

/// ReportDataSource custom resource definition
///
/// A source of raw usage data. Once its backing table exists the table
/// name is recorded in `status.tableName`.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "metering.openshift.io",
    version = "v1alpha1",
    kind = "ReportDataSource",
    plural = "reportdatasources",
    shortname = "rds",
    namespaced,
    status = "ReportDataSourceStatus",
    printcolumn = r#"{"name":"Table", "type":"string", "jsonPath":".status.tableName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReportDataSourceSpec {
    /// Prometheus metrics import configuration
    #[serde(default)]
    #[validate(nested)]
    pub promsum: Option<PromsumDataSourceSpec>,

    /// AWS billing report import configuration
    #[serde(default)]
    #[validate(nested)]
    pub aws_billing: Option<AwsBillingDataSourceSpec>,
}

/// Prometheus-backed data source
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PromsumDataSourceSpec {
    /// PromQL query whose results are imported
    #[validate(length(min = 1, message = "promsum query must not be empty"))]
    pub query: String,
}

/// AWS billing report data source
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AwsBillingDataSourceSpec {
    /// Bucket holding the billing reports
    #[validate(length(min = 3, max = 63, message = "bucket must be 3-63 characters"))]
    pub bucket: String,

    /// Key prefix of the billing reports
    #[serde(default)]
    pub prefix: String,

    /// Bucket region
    #[serde(default)]
    pub region: Option<String>,
}

/// Status of a ReportDataSource resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportDataSourceStatus {
    /// Backing table name, empty until created
    #[serde(default)]
    pub table_name: String,

    /// Last time data was imported
    #[serde(default)]
    pub last_import_time: Option<String>,
}

impl Materialized for ReportDataSource {
    fn readiness_attribute(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.table_name.as_str())
            .unwrap_or_default()
    }
}

// ============================================================================
// Report CRD
// ============================================================================

/// Report custom resource definition
///
/// A one-shot run of a ReportGenerationQuery over a reporting period.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "metering.openshift.io",
    version = "v1alpha1",
    kind = "Report",
    plural = "reports",
    namespaced,
    status = "ReportStatus",
    printcolumn = r#"{"name":"Query", "type":"string", "jsonPath":".spec.generationQuery"}"#,
    printcolumn = r#"{"name":"Table", "type":"string", "jsonPath":".status.tableName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReportSpec {
    /// Name of the ReportGenerationQuery this report runs
    #[validate(custom(function = "validate_k8s_name"))]
    pub generation_query: String,

    /// Start of the reporting period (RFC 3339)
    #[serde(default)]
    pub reporting_start: Option<String>,

    /// End of the reporting period (RFC 3339)
    #[serde(default)]
    pub reporting_end: Option<String>,

    /// Run without waiting for the reporting period to end
    #[serde(default)]
    pub run_immediately: bool,
}

/// Status of a Report resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    /// Current phase: Waiting, Started, Finished, Error
    #[serde(default)]
    pub phase: String,

    /// Backing table name, empty until generated
    #[serde(default)]
    pub table_name: String,

    /// Human-readable message about current state
    #[serde(default)]
    pub message: String,
}

impl Materialized for Report {
    fn readiness_attribute(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.table_name.as_str())
            .unwrap_or_default()
    }
}

// ============================================================================
// ScheduledReport CRD
// ============================================================================

/// ScheduledReport custom resource definition
///
/// A recurring run of a ReportGenerationQuery.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "metering.openshift.io",
    version = "v1alpha1",
    kind = "ScheduledReport",
    plural = "scheduledreports",
    namespaced,
    status = "ScheduledReportStatus",
    printcolumn = r#"{"name":"Query", "type":"string", "jsonPath":".spec.generationQuery"}"#,
    printcolumn = r#"{"name":"Period", "type":"string", "jsonPath":".spec.schedule.period"}"#,
    printcolumn = r#"{"name":"Table", "type":"string", "jsonPath":".status.tableName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReportSpec {
    /// Name of the ReportGenerationQuery this report runs
    #[validate(custom(function = "validate_k8s_name"))]
    pub generation_query: String,

    /// Schedule on which the report runs
    #[serde(default)]
    #[validate(nested)]
    pub schedule: ScheduleSpec,
}

/// Schedule of a ScheduledReport
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    /// Period: hourly, daily, weekly, monthly
    #[serde(default = "default_period")]
    #[validate(custom(function = "validate_period"))]
    pub period: String,
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            period: default_period(),
        }
    }
}

fn default_period() -> String {
    "daily".to_string()
}

fn validate_period(period: &str) -> Result<(), ValidationError> {
    match period {
        "hourly" | "daily" | "weekly" | "monthly" => Ok(()),
        _ => Err(ValidationError::new("invalid_period")
            .with_message("period must be: hourly, daily, weekly, or monthly".into())),
    }
}

/// Status of a ScheduledReport resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReportStatus {
    /// Backing table name, empty until the first run completes
    #[serde(default)]
    pub table_name: String,

    /// End of the last reporting period that was generated
    #[serde(default)]
    pub last_report_time: Option<String>,
}

impl Materialized for ScheduledReport {
    fn readiness_attribute(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.table_name.as_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_query_readiness_from_view_name() {
        let mut query = ReportGenerationQuery::new("pod-cpu", ReportGenerationQuerySpec::default());
        assert!(!query.is_initialized());

        query.status = Some(ReportGenerationQueryStatus::default());
        assert!(!query.is_initialized());

        query.status = Some(ReportGenerationQueryStatus {
            view_name: "view_pod_cpu".to_string(),
            conditions: vec![],
        });
        assert!(query.is_initialized());
        assert_eq!(query.readiness_attribute(), "view_pod_cpu");
    }

    #[test]
    fn test_table_backed_readiness() {
        let mut ds = ReportDataSource::new("pod-cpu-request", ReportDataSourceSpec::default());
        assert!(!ds.is_initialized());
        ds.status = Some(ReportDataSourceStatus {
            table_name: "datasource_pod_cpu_request".to_string(),
            last_import_time: None,
        });
        assert!(ds.is_initialized());

        let mut report = Report::new(
            "cpu-2024",
            ReportSpec {
                generation_query: "pod-cpu".to_string(),
                ..Default::default()
            },
        );
        assert!(!report.is_initialized());
        report.status = Some(ReportStatus {
            table_name: "report_cpu_2024".to_string(),
            ..Default::default()
        });
        assert!(report.is_initialized());

        let mut scheduled = ScheduledReport::new(
            "cpu-daily",
            ScheduledReportSpec {
                generation_query: "pod-cpu".to_string(),
                schedule: ScheduleSpec::default(),
            },
        );
        assert!(!scheduled.is_initialized());
        scheduled.status = Some(ScheduledReportStatus {
            table_name: "scheduledreport_cpu_daily".to_string(),
            last_report_time: None,
        });
        assert!(scheduled.is_initialized());
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let yaml = r#"
reportQueries: [pod-cpu-raw]
dynamicReportQueries: [pod-cpu-helpers]
reportDataSources: [pod-cpu-request]
scheduledReports: [cpu-daily]
view:
  disabled: true
columns:
  - name: namespace
    type: string
query: SELECT 1
"#;
        let spec: ReportGenerationQuerySpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.report_queries, vec!["pod-cpu-raw"]);
        assert_eq!(spec.dynamic_report_queries, vec!["pod-cpu-helpers"]);
        assert_eq!(spec.report_data_sources, vec!["pod-cpu-request"]);
        assert!(spec.reports.is_empty());
        assert_eq!(spec.scheduled_reports, vec!["cpu-daily"]);
        assert!(spec.view.disabled);
        assert_eq!(spec.columns[0].r#type, "string");
    }

    #[test]
    fn test_invalid_reference_name_rejected() {
        let spec = ReportGenerationQuerySpec {
            report_queries: vec!["Not_Valid".to_string()],
            ..Default::default()
        };
        let errors = spec.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("report_queries"));

        let spec = ReportGenerationQuerySpec {
            report_data_sources: data_sources_for_test(),
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_resource_spec_message() {
        let spec = ReportGenerationQuerySpec {
            reports: vec!["Bad_Name".to_string()],
            ..Default::default()
        };
        let err = validate_resource_spec("ReportGenerationQuery", "root", &spec).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ReportGenerationQuery root"));
        assert!(msg.contains("reports: 'Bad_Name' is not a valid Kubernetes name"));

        let spec = ReportGenerationQuerySpec {
            columns: vec![Column::new("", "string")],
            ..Default::default()
        };
        assert!(matches!(
            validate_resource_spec("ReportGenerationQuery", "root", &spec),
            Err(OperatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reference_lists_are_unbounded() {
        let spec = ReportGenerationQuerySpec {
            report_queries: (0..1000).map(|i| format!("query-{}", i)).collect(),
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }

    fn data_sources_for_test() -> Vec<String> {
        vec!["pod-cpu-request".to_string(), "node-capacity".to_string()]
    }

    #[test]
    fn test_schedule_period_validation() {
        let spec = ScheduledReportSpec {
            generation_query: "pod-cpu".to_string(),
            schedule: ScheduleSpec {
                period: "fortnightly".to_string(),
            },
        };
        assert!(spec.validate().is_err());

        let spec = ScheduledReportSpec {
            generation_query: "pod-cpu".to_string(),
            schedule: ScheduleSpec::default(),
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_crd_generation() {
        let crd = ReportGenerationQuery::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.names.kind, "ReportGenerationQuery");
        assert_eq!(crd.spec.names.plural, "reportgenerationqueries");
        assert_eq!(crd.spec.versions[0].name, API_VERSION);

        assert_eq!(ReportDataSource::crd().spec.names.kind, "ReportDataSource");
        assert_eq!(Report::crd().spec.names.kind, "Report");
        assert_eq!(ScheduledReport::crd().spec.names.kind, "ScheduledReport");
    }
}
