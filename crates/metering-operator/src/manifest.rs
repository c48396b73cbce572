//! Manifest loading
//!
//! Loads metering resources from multi-document YAML into in-memory getters
//! so dependencies can be resolved without a cluster.

use crate::crd::{
    validate_resource_spec, Report, ReportDataSource, ReportGenerationQuery, ScheduledReport,
};
use crate::error::{OperatorError, Result};
use crate::getter::{Getters, MemoryGetter, ResourceGetter};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

/// Resources loaded from manifests, one getter per kind
#[derive(Debug, Clone)]
pub struct ManifestStore {
    default_namespace: String,
    pub queries: MemoryGetter<ReportGenerationQuery>,
    pub data_sources: MemoryGetter<ReportDataSource>,
    pub reports: MemoryGetter<Report>,
    pub scheduled_reports: MemoryGetter<ScheduledReport>,
}

impl Default for ManifestStore {
    fn default() -> Self {
        Self::new("default")
    }
}

impl ManifestStore {
    /// Create an empty store; resources without a namespace are placed in
    /// `default_namespace`
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
            queries: MemoryGetter::new(),
            data_sources: MemoryGetter::new(),
            reports: MemoryGetter::new(),
            scheduled_reports: MemoryGetter::new(),
        }
    }

    /// Parse a YAML string into a store using the `default` namespace
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut store = Self::default();
        store.load_str(yaml)?;
        Ok(store)
    }

    /// Load every metering resource in a multi-document YAML string
    ///
    /// Returns the number of resources loaded. Documents of other kinds are
    /// skipped; invalid specs fail the whole load.
    pub fn load_str(&mut self, yaml: &str) -> Result<usize> {
        let mut loaded = 0;
        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            let kind = value
                .get("kind")
                .and_then(|k| k.as_str())
                .unwrap_or_default()
                .to_string();
            match kind.as_str() {
                "ReportGenerationQuery" => {
                    let obj = self.decode::<ReportGenerationQuery>(value)?;
                    self.queries.insert(obj);
                }
                "ReportDataSource" => {
                    let obj = self.decode::<ReportDataSource>(value)?;
                    self.data_sources.insert(obj);
                }
                "Report" => {
                    let obj = self.decode::<Report>(value)?;
                    self.reports.insert(obj);
                }
                "ScheduledReport" => {
                    let obj = self.decode::<ScheduledReport>(value)?;
                    self.scheduled_reports.insert(obj);
                }
                other => {
                    warn!(kind = %other, "Skipping unsupported manifest kind");
                    continue;
                }
            }
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Load a manifest file, or every `.yaml`/`.yml` file in a directory in
    /// name order
    pub fn load_path(&mut self, path: &Path) -> Result<usize> {
        if path.is_dir() {
            let mut files = std::fs::read_dir(path)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()?;
            files.retain(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
            });
            files.sort();

            let mut loaded = 0;
            for file in files {
                loaded += self.load_path(&file)?;
            }
            return Ok(loaded);
        }

        let contents = std::fs::read_to_string(path)?;
        let loaded = self.load_str(&contents)?;
        info!(path = %path.display(), resources = loaded, "Loaded manifests");
        Ok(loaded)
    }

    /// Look up a loaded ReportGenerationQuery
    pub fn query(&self, namespace: &str, name: &str) -> Result<Arc<ReportGenerationQuery>> {
        self.queries.get(namespace, name)
    }

    /// Getters over the loaded resources
    pub fn getters(&self) -> Getters<'_> {
        Getters {
            queries: &self.queries,
            data_sources: &self.data_sources,
            reports: &self.reports,
            scheduled_reports: &self.scheduled_reports,
        }
    }

    fn decode<K>(&self, value: serde_yaml::Value) -> Result<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + HasSpec,
    {
        let mut obj: K = serde_yaml::from_value(value)?;
        let kind = K::kind(&()).to_string();
        let name = obj.name_any();
        if name.is_empty() {
            return Err(OperatorError::InvalidConfig(format!(
                "{} manifest is missing metadata.name",
                kind
            )));
        }
        validate_resource_spec(&kind, &name, obj.spec())?;

        if obj.namespace().is_none() {
            obj.meta_mut().namespace = Some(self.default_namespace.clone());
        }
        debug!(kind = %kind, name = %name, namespace = ?obj.namespace(), "Decoded manifest");
        Ok(obj)
    }
}

/// Access to the validatable spec of a CRD object
pub trait HasSpec {
    type Spec: Validate;

    fn spec(&self) -> &Self::Spec;
}

macro_rules! impl_has_spec {
    ($($kind:ty => $spec:ty),* $(,)?) => {
        $(
            impl HasSpec for $kind {
                type Spec = $spec;

                fn spec(&self) -> &Self::Spec {
                    &self.spec
                }
            }
        )*
    };
}

impl_has_spec!(
    ReportGenerationQuery => crate::crd::ReportGenerationQuerySpec,
    ReportDataSource => crate::crd::ReportDataSourceSpec,
    Report => crate::crd::ReportSpec,
    ScheduledReport => crate::crd::ScheduledReportSpec,
);
