//! Metering dependency resolver
//!
//! Resolves the dependencies of a ReportGenerationQuery from YAML manifests
//! or a live cluster and reports whether the query is ready to run.

use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::Client;
use metering_operator::conditions::dependencies_condition;
use metering_operator::crd::{Report, ReportDataSource, ReportGenerationQuery, ScheduledReport};
use metering_operator::dependency::{DependencyResolver, ResolverMetrics, TraversalOptions};
use metering_operator::getter::{ApiGetter, Getters, ResourceGetter};
use metering_operator::manifest::ManifestStore;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Metering dependency resolver
#[derive(Parser, Debug)]
#[command(name = "metering-operator")]
#[command(about = "Resolve and validate ReportGenerationQuery dependencies")]
#[command(version)]
struct Args {
    /// Manifest files or directories to load resources from
    #[arg(long, env = "MANIFESTS", value_delimiter = ',')]
    manifests: Vec<PathBuf>,

    /// Namespace of the query and its dependencies
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Name of the ReportGenerationQuery to resolve
    #[arg(long, required_unless_present = "print_crd")]
    query: Option<String>,

    /// Maximum dependency depth before a cycle is assumed
    #[arg(long, env = "MAX_DEPENDENCY_DEPTH", default_value = "100")]
    max_depth: usize,

    /// Fail on the first repeated reference instead of waiting for the depth bound
    #[arg(long, env = "DETECT_CYCLES", default_value = "false")]
    detect_cycles: bool,

    /// Read resources from the Kubernetes API instead of manifests
    #[arg(long, env = "FROM_CLUSTER", default_value = "false")]
    from_cluster: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Print CRD YAML and exit
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // clap only allows a missing --query together with --print-crd
    let Some(query_name) = args.query.clone().filter(|_| !args.print_crd) else {
        print_crd()?;
        return Ok(());
    };

    init_logging(&args)?;

    let options = TraversalOptions {
        max_depth: args.max_depth,
        detect_cycles: args.detect_cycles,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %args.namespace,
        query = %query_name,
        max_depth = options.max_depth,
        detect_cycles = options.detect_cycles,
        "Resolving query dependencies"
    );

    if args.from_cluster {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;

        let queries = ApiGetter::<ReportGenerationQuery>::new(client.clone());
        let data_sources = ApiGetter::<ReportDataSource>::new(client.clone());
        let reports = ApiGetter::<Report>::new(client.clone());
        let scheduled_reports = ApiGetter::<ScheduledReport>::new(client);
        let getters = Getters {
            queries: &queries,
            data_sources: &data_sources,
            reports: &reports,
            scheduled_reports: &scheduled_reports,
        };

        resolve(getters, &args.namespace, &query_name, options)
    } else {
        if args.manifests.is_empty() {
            bail!("--manifests is required unless --from-cluster is set");
        }

        let mut store = ManifestStore::new(args.namespace.clone());
        for path in &args.manifests {
            store
                .load_path(path)
                .with_context(|| format!("Failed to load manifests from {}", path.display()))?;
        }

        resolve(store.getters(), &args.namespace, &query_name, options)
    }
}

/// Resolve one query and print its dependency summary as JSON
fn resolve(
    getters: Getters<'_>,
    namespace: &str,
    name: &str,
    options: TraversalOptions,
) -> Result<()> {
    let query = getters
        .queries
        .get(namespace, name)
        .context("Failed to read ReportGenerationQuery")?;

    let result = DependencyResolver::new(getters)
        .with_options(options)
        .with_metrics(ResolverMetrics::new())
        .resolve(&query);

    let condition = dependencies_condition(&result);
    match result {
        Ok(resolved) => {
            info!(reason = %condition.reason, message = %condition.message, "Dependencies resolved");
            println!("{}", serde_json::to_string_pretty(&resolved.summary())?);
            Ok(())
        }
        Err(e) => {
            error!(
                reason = %condition.reason,
                retryable = e.is_retryable(),
                retry_after_secs = e.requeue_delay().map(|d| d.as_secs()),
                "Dependencies not resolved"
            );
            Err(e).context(format!("ReportGenerationQuery {}/{}", namespace, name))
        }
    }
}

/// Initialize logging subsystem
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Print the CRD YAML for installation
fn print_crd() -> Result<()> {
    use kube::CustomResourceExt;

    let crds = [
        ReportGenerationQuery::crd(),
        ReportDataSource::crd(),
        Report::crd(),
        ScheduledReport::crd(),
    ];
    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    println!("{}", documents.join("---\n"));

    Ok(())
}
