//! # Metering Operator
//!
//! Dependency resolution and readiness validation for metering reporting
//! resources.
//!
//! A `ReportGenerationQuery` may build on other queries, on
//! `ReportDataSource` tables, and on the output tables of `Report` and
//! `ScheduledReport` resources. Before a report table can be created from a
//! query, every one of those dependencies has to exist and be materialized.
//! This crate resolves that dependency set and decides whether the query is
//! ready to run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use metering_operator::prelude::*;
//!
//! let store = ManifestStore::from_yaml_str(&std::fs::read_to_string("manifests.yaml")?)?;
//! let query = store.query("default", "namespace-cpu-usage")?;
//!
//! let resolved = DependencyResolver::new(store.getters()).resolve(&query)?;
//! println!("{}", serde_json::to_string_pretty(&resolved.summary())?);
//! ```
//!
//! ## Resolution
//!
//! 1. **Walk**: follow `reportQueries` and `dynamicReportQueries` transitively,
//!    bounded at a depth of 100
//! 2. **Fetch**: look up the data sources, reports and scheduled reports the
//!    query names directly
//! 3. **Partition**: split every fetched dependency by readiness
//! 4. **Validate**: accept only when nothing required is pending, otherwise
//!    report every blocking dependency in one error
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types with validation
//! - [`dependency`] - Traversal, fetching, partitioning and validation
//! - [`getter`] - Resource lookup by namespace and name
//! - [`manifest`] - Loading resources from YAML manifests
//! - [`conditions`] - Status conditions for resolution outcomes
//! - [`table`] - Report table provisioning statements
//! - [`error`] - Error types for operator operations

pub mod conditions;
pub mod crd;
pub mod dependency;
pub mod error;
pub mod getter;
pub mod manifest;
pub mod table;

#[cfg(test)]
mod fixtures;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::conditions::{dependencies_condition, set_condition, DEPENDENCIES_RESOLVED};
    pub use crate::crd::{
        Materialized, QueryCondition, Report, ReportDataSource, ReportGenerationQuery,
        ReportGenerationQuerySpec, ReportGenerationQueryStatus, ScheduledReport,
    };
    pub use crate::dependency::{
        DependenciesStatus, DependencyResolver, DependencySummary, DependencyViolations,
        ResolvedDependencies, ResolverMetrics, TraversalOptions, ViolationCategory, MAX_DEPTH,
    };
    pub use crate::error::{OperatorError, Result};
    pub use crate::getter::{ApiGetter, Getters, MemoryGetter, ResourceGetter, StoreGetter};
    pub use crate::manifest::ManifestStore;
}
