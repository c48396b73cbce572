//! ReportGenerationQuery dependency traversal
//!
//! Queries reference other queries by name through two independent
//! channels: `reportQueries` (read through the dependency's view) and
//! `dynamicReportQueries` (inlined when the query is rendered). Each channel
//! is walked depth-first and accumulated separately.
//!
//! Chains are bounded by depth rather than by tracking visited nodes: a
//! reference cycle keeps descending until the bound is hit and is then
//! reported as [`OperatorError::CycleDetected`]. Acyclic chains deeper than
//! the bound fail the same way. [`TraversalOptions::detect_cycles`] adds an
//! exact check on top that fails as soon as a query is referenced from
//! inside its own descent path.

use crate::crd::ReportGenerationQuery;
use crate::error::{OperatorError, Result};
use crate::getter::ResourceGetter;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Maximum chain length below a root query
pub const MAX_DEPTH: usize = 100;

/// Which reference list of a query to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `spec.reportQueries`
    View,
    /// `spec.dynamicReportQueries`
    Dynamic,
}

impl ReferenceKind {
    fn references(self, query: &ReportGenerationQuery) -> &[String] {
        match self {
            ReferenceKind::View => &query.spec.report_queries,
            ReferenceKind::Dynamic => &query.spec.dynamic_report_queries,
        }
    }
}

/// Bounds applied while walking query references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalOptions {
    /// Depth at which the walk fails with `CycleDetected`
    pub max_depth: usize,
    /// Also fail on a reference back into the current descent path
    pub detect_cycles: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            detect_cycles: false,
        }
    }
}

/// Transitive query dependencies of a root query, per reference channel
#[derive(Debug, Clone, Default)]
pub struct DependentQueries {
    /// Reached through `reportQueries`
    pub view: Vec<Arc<ReportGenerationQuery>>,
    /// Reached through `dynamicReportQueries`
    pub dynamic: Vec<Arc<ReportGenerationQuery>>,
}

/// Walk both reference channels of `query`
///
/// The two walks use independent accumulators, so a query reachable through
/// both channels appears in both results.
pub fn dependent_generation_queries(
    getter: &dyn ResourceGetter<ReportGenerationQuery>,
    query: &ReportGenerationQuery,
    options: TraversalOptions,
) -> Result<DependentQueries> {
    let view = dependent_queries(getter, query, ReferenceKind::View, options)?;
    let dynamic = dependent_queries(getter, query, ReferenceKind::Dynamic, options)?;
    Ok(DependentQueries { view, dynamic })
}

/// Collect every query transitively reachable from `query` through one
/// reference channel
///
/// The root itself is only included if it is reachable from one of its own
/// dependencies. The result holds each query once, ordered by name.
pub fn dependent_queries(
    getter: &dyn ResourceGetter<ReportGenerationQuery>,
    query: &ReportGenerationQuery,
    kind: ReferenceKind,
    options: TraversalOptions,
) -> Result<Vec<Arc<ReportGenerationQuery>>> {
    let mut walk = Walk {
        getter,
        kind,
        options,
        accumulator: BTreeMap::new(),
        path: Vec::new(),
    };
    walk.visit(query, 0)?;
    Ok(walk.accumulator.into_values().collect())
}

struct Walk<'a> {
    getter: &'a dyn ResourceGetter<ReportGenerationQuery>,
    kind: ReferenceKind,
    options: TraversalOptions,
    accumulator: BTreeMap<String, Arc<ReportGenerationQuery>>,
    // Only maintained when detect_cycles is set
    path: Vec<String>,
}

impl Walk<'_> {
    fn visit(&mut self, query: &ReportGenerationQuery, depth: usize) -> Result<()> {
        let name = query.name_any();
        if depth >= self.options.max_depth {
            warn!(name = %name, depth, "Query dependency chain reached the depth bound");
            return Err(OperatorError::CycleDetected { depth, name });
        }

        let namespace = query.namespace().unwrap_or_else(|| "default".to_string());
        if self.options.detect_cycles {
            self.path.push(name);
        }

        for dependency in self.kind.references(query) {
            // Fully resolved on an earlier branch
            if self.accumulator.contains_key(dependency) {
                continue;
            }

            if self.options.detect_cycles && self.path.contains(dependency) {
                let mut path = self.path.clone();
                path.push(dependency.clone());
                warn!(path = ?path, "Cyclic query reference");
                return Err(OperatorError::CyclicReference { path });
            }

            trace!(dependency = %dependency, depth, kind = ?self.kind, "Fetching query dependency");
            let dependent = self.getter.get(&namespace, dependency)?;
            self.visit(&dependent, depth + 1)?;

            // Inserted only after its own dependencies resolved
            self.accumulator.insert(dependent.name_any(), dependent);
        }

        if self.options.detect_cycles {
            self.path.pop();
        }
        Ok(())
    }
}
