//! Report table provisioning
//!
//! Builds and issues the DDL that backs a resolved report with a storage
//! table. Tables are always recreated: the existing table is dropped (and
//! purged) before the new definition is created, so repeated calls with the
//! same arguments converge on the same table.

use crate::error::{OperatorError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

/// Scheme used for object storage table locations
const S3_SCHEME: &str = "s3a://";

/// A column of a report table
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name
    #[validate(length(min = 1, max = 128, message = "column name must be 1-128 characters"))]
    pub name: String,

    /// Column type as understood by the SQL engine (e.g. `string`, `double`)
    #[validate(length(min = 1, message = "column type must not be empty"))]
    pub r#type: String,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, r#type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.into(),
        }
    }
}

/// Where a report table keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLocation {
    /// Object storage bucket and key prefix
    S3 { bucket: String, prefix: String },
    /// The SQL engine's default warehouse location
    Local,
}

/// Executes statements against the SQL engine
///
/// Implementations must either apply a statement fully or return an error.
pub trait Queryer {
    /// Execute a single statement
    fn query(&self, query: &str) -> Result<()>;
}

impl<F> Queryer for F
where
    F: Fn(&str) -> Result<()>,
{
    fn query(&self, query: &str) -> Result<()> {
        self(query)
    }
}

/// Quote an identifier with backticks, escaping embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Build the object storage location for a bucket and prefix
///
/// The location always ends in a slash so the engine treats it as a
/// directory.
pub fn s3_location(bucket: &str, prefix: &str) -> Result<String> {
    let bucket = bucket.trim_matches('/');
    if bucket.is_empty() {
        return Err(OperatorError::InvalidConfig(format!(
            "invalid s3 bucket: {:?}",
            bucket
        )));
    }

    let prefix = prefix.trim_matches('/');
    let mut location = format!("{}{}", S3_SCHEME, bucket);
    if !prefix.is_empty() {
        location.push('/');
        location.push_str(prefix);
    }
    location.push('/');
    Ok(location)
}

/// Build a `DROP TABLE` statement
pub fn drop_table_sql(table_name: &str, if_exists: bool, purge: bool) -> String {
    let mut sql = String::from("DROP TABLE ");
    if if_exists {
        sql.push_str("IF EXISTS ");
    }
    sql.push_str(&quote_identifier(table_name));
    if purge {
        sql.push_str(" PURGE");
    }
    sql
}

/// Build a `CREATE TABLE` statement
pub fn create_table_sql(
    table_name: &str,
    location: Option<&str>,
    columns: &[Column],
    ignore_exists: bool,
) -> String {
    let column_defs = columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.r#type))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = String::from("CREATE TABLE ");
    if ignore_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&quote_identifier(table_name));
    sql.push_str(&format!(" ({})", column_defs));
    if let Some(location) = location {
        sql.push_str(&format!(" LOCATION '{}'", location.replace('\'', "\\'")));
    }
    sql
}

/// Drop and recreate a report table
///
/// The location is validated before any statement runs. A failed drop
/// aborts before the create is attempted.
pub fn create_report_table(
    queryer: &dyn Queryer,
    table_name: &str,
    location: &TableLocation,
    columns: &[Column],
) -> Result<()> {
    if table_name.is_empty() {
        return Err(OperatorError::InvalidConfig(
            "report table name must not be empty".to_string(),
        ));
    }

    let (location, ignore_exists) = match location {
        TableLocation::S3 { bucket, prefix } => (Some(s3_location(bucket, prefix)?), false),
        TableLocation::Local => (None, true),
    };

    info!(
        table = %table_name,
        location = location.as_deref().unwrap_or("local"),
        columns = columns.len(),
        "Creating report table"
    );

    let drop = drop_table_sql(table_name, true, true);
    debug!(query = %drop, "Dropping report table");
    queryer.query(&drop)?;

    let create = create_table_sql(table_name, location.as_deref(), columns, ignore_exists);
    debug!(query = %create, "Creating report table");
    queryer.query(&create)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("namespace", "string"),
            Column::new("pod_usage_cpu_core_seconds", "double"),
        ]
    }

    #[test]
    fn test_s3_location() {
        assert_eq!(
            s3_location("metering", "reports/cpu").unwrap(),
            "s3a://metering/reports/cpu/"
        );
        assert_eq!(
            s3_location("metering/", "/reports/").unwrap(),
            "s3a://metering/reports/"
        );
        assert_eq!(s3_location("metering", "").unwrap(), "s3a://metering/");
        assert!(matches!(
            s3_location("", "reports"),
            Err(OperatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_quote_identifier_escapes_backticks() {
        assert_eq!(quote_identifier("report_cpu"), "`report_cpu`");
        assert_eq!(quote_identifier("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_drop_table_sql() {
        assert_eq!(
            drop_table_sql("report_cpu", true, true),
            "DROP TABLE IF EXISTS `report_cpu` PURGE"
        );
        assert_eq!(drop_table_sql("report_cpu", false, false), "DROP TABLE `report_cpu`");
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("report_cpu", Some("s3a://metering/cpu/"), &columns(), false);
        assert_eq!(
            sql,
            "CREATE TABLE `report_cpu` (`namespace` string, `pod_usage_cpu_core_seconds` double) \
             LOCATION 's3a://metering/cpu/'"
        );

        let sql = create_table_sql("report_cpu", None, &columns(), true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `report_cpu`"));
        assert!(!sql.contains("LOCATION"));
    }

    #[test]
    fn test_create_report_table_drops_then_creates() {
        let statements = RefCell::new(Vec::new());
        let queryer = |q: &str| -> Result<()> {
            statements.borrow_mut().push(q.to_string());
            Ok(())
        };

        let location = TableLocation::S3 {
            bucket: "metering".to_string(),
            prefix: "cpu".to_string(),
        };
        create_report_table(&queryer, "report_cpu", &location, &columns()).unwrap();

        let statements = statements.into_inner();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("DROP TABLE IF EXISTS"));
        assert!(statements[1].contains("LOCATION 's3a://metering/cpu/'"));
    }

    #[test]
    fn test_create_local_report_table() {
        let statements = RefCell::new(Vec::new());
        let queryer = |q: &str| -> Result<()> {
            statements.borrow_mut().push(q.to_string());
            Ok(())
        };

        create_report_table(&queryer, "report_cpu", &TableLocation::Local, &columns()).unwrap();

        let statements = statements.into_inner();
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS"));
    }

    #[test]
    fn test_failed_drop_skips_create() {
        let calls = RefCell::new(0);
        let queryer = |_: &str| -> Result<()> {
            *calls.borrow_mut() += 1;
            Err(OperatorError::QueryFailed("connection refused".to_string()))
        };

        let result = create_report_table(&queryer, "report_cpu", &TableLocation::Local, &columns());
        assert!(matches!(result, Err(OperatorError::QueryFailed(_))));
        assert_eq!(calls.into_inner(), 1);
    }

    #[test]
    fn test_invalid_bucket_issues_no_statements() {
        let calls = RefCell::new(0);
        let queryer = |_: &str| -> Result<()> {
            *calls.borrow_mut() += 1;
            Ok(())
        };

        let location = TableLocation::S3 {
            bucket: String::new(),
            prefix: "cpu".to_string(),
        };
        assert!(create_report_table(&queryer, "report_cpu", &location, &columns()).is_err());
        assert_eq!(calls.into_inner(), 0);
    }
}
