use crate::common::metrics;
use crate::common::record::{NormalizedRow, ScalarValue};
use crate::common::secrets::DbCredentials;
use crate::common::types::{PipelineError, PipelineResult};
use async_trait::async_trait;
use function_timer::time;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection};
use sqlx::query::Query;
use sqlx::{Connection, MySql};
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Destination for normalized rows.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Append one row to `table_name`, growing the table's columns as needed.
    /// A failure leaves no partial row behind and is never retried here.
    async fn append_row(&self, row: &NormalizedRow, table_name: &str) -> PipelineResult<()>;
}

pub struct MySqlSink {
    options: MySqlConnectOptions,
}

impl MySqlSink {
    pub fn new(credentials: &DbCredentials) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.username)
            .password(&credentials.password)
            .database(&credentials.dbname);

        Self { options }
    }

    #[time("db_append_row_duration")]
    async fn write_row(&self, row: &NormalizedRow, table_name: &str) -> PipelineResult<()> {
        // One connection per invocation, closed once the row is in
        let mut conn = MySqlConnection::connect_with(&self.options).await?;
        info!("Successfully connected to the database");

        sqlx::query(&create_table_sql(table_name, row))
            .execute(&mut conn)
            .await?;

        let existing: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(table_name)
        .fetch_all(&mut conn)
        .await?
        .into_iter()
        .map(|name| name.to_lowercase())
        .collect();

        for statement in add_missing_columns_sql(table_name, row, &existing) {
            info!("Extending table '{}': {}", table_name, statement);
            sqlx::query(&statement).execute(&mut conn).await?;
        }

        let insert = insert_sql(table_name, row);
        let mut tx = conn.begin().await?;
        bind_row(sqlx::query(&insert), row).execute(&mut *tx).await?;
        tx.commit().await?;

        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection cleanly: {}", e);
        }

        Ok(())
    }
}

#[async_trait]
impl RowSink for MySqlSink {
    async fn append_row(&self, row: &NormalizedRow, table_name: &str) -> PipelineResult<()> {
        validate_table_name(table_name)?;

        if row.is_empty() {
            warn!("Row has no scalar columns, nothing to insert into '{}'", table_name);
            return Ok(());
        }

        match self.write_row(row, table_name).await {
            Ok(()) => {
                metrics::increment_db_insert_success();
                info!("Row uploaded to table '{}'", table_name);
                Ok(())
            }
            Err(e) => {
                metrics::increment_db_insert_failure();
                error!("Failed to append row to table '{}': {}", table_name, e);
                Err(e)
            }
        }
    }
}

fn validate_table_name(table_name: &str) -> PipelineResult<()> {
    if table_name.trim().is_empty() {
        return Err(PipelineError::Sink("table name must not be empty".to_string()));
    }
    Ok(())
}

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn column_type(value: &ScalarValue) -> &'static str {
    match value {
        ScalarValue::Bool(_) => "BOOLEAN",
        ScalarValue::Integer(_) => "BIGINT",
        ScalarValue::Unsigned(_) => "BIGINT UNSIGNED",
        ScalarValue::Float(_) => "DOUBLE",
        ScalarValue::Text(_) | ScalarValue::Null => "TEXT",
    }
}

fn column_definition(name: &str, value: &ScalarValue) -> String {
    format!("{} {} NULL", quote_identifier(name), column_type(value))
}

pub fn create_table_sql(table_name: &str, row: &NormalizedRow) -> String {
    let columns = row
        .columns()
        .iter()
        .map(|(name, value)| column_definition(name, value))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        quote_identifier(table_name)
    )
}

/// `ALTER TABLE` statements for the row's columns absent from `existing`
/// (lowercased names, as MySQL column names are case-insensitive).
pub fn add_missing_columns_sql(
    table_name: &str,
    row: &NormalizedRow,
    existing: &HashSet<String>,
) -> Vec<String> {
    row.columns()
        .iter()
        .filter(|(name, _)| !existing.contains(&name.to_lowercase()))
        .map(|(name, value)| {
            format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_identifier(table_name),
                column_definition(name, value)
            )
        })
        .collect()
}

pub fn insert_sql(table_name: &str, row: &NormalizedRow) -> String {
    let columns = row
        .column_names()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; row.len()].join(", ");

    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_identifier(table_name)
    )
}

fn bind_row<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    row: &'q NormalizedRow,
) -> Query<'q, MySql, MySqlArguments> {
    for (_, value) in row.columns() {
        query = match value {
            ScalarValue::Null => query.bind(None::<String>),
            ScalarValue::Bool(b) => query.bind(*b),
            ScalarValue::Integer(i) => query.bind(*i),
            ScalarValue::Unsigned(u) => query.bind(*u),
            ScalarValue::Float(f) => query.bind(*f),
            ScalarValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::record::normalize;
    use serde_json::{Value, json};
    use sqlx::{Arguments, Execute};

    fn row(value: Value) -> NormalizedRow {
        match value {
            Value::Object(map) => normalize(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_identifiers_are_backtick_quoted() {
        assert_eq!(quote_identifier("activityId"), "`activityId`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_create_table_types_follow_values() {
        let row = row(json!({
            "activityId": 1,
            "activityName": "Ride",
            "distance": 10.5,
            "manualActivity": false,
            "description": null,
            "laps": [1]
        }));

        assert_eq!(
            create_table_sql("activities", &row),
            "CREATE TABLE IF NOT EXISTS `activities` (`activityId` BIGINT NULL, \
             `activityName` TEXT NULL, `distance` DOUBLE NULL, \
             `manualActivity` BOOLEAN NULL, `description` TEXT NULL)"
        );
    }

    #[test]
    fn test_case_variants_produce_a_single_column() {
        let row = row(json!({"maxHr": 181, "maxHR": 179}));

        assert_eq!(
            create_table_sql("activities", &row),
            "CREATE TABLE IF NOT EXISTS `activities` (`maxHr` BIGINT NULL)"
        );
        assert_eq!(
            insert_sql("activities", &row),
            "INSERT INTO `activities` (`maxHr`) VALUES (?)"
        );
    }

    #[test]
    fn test_only_missing_columns_are_added() {
        let row = row(json!({"activityId": 1, "Calories": 400, "steps": 12}));
        let existing: HashSet<String> = ["activityid".to_string(), "calories".to_string()]
            .into_iter()
            .collect();

        assert_eq!(
            add_missing_columns_sql("activities", &row, &existing),
            vec!["ALTER TABLE `activities` ADD COLUMN `steps` BIGINT NULL".to_string()]
        );
    }

    #[test]
    fn test_insert_has_one_placeholder_per_column() {
        let row = row(json!({"a": 1, "b": "x", "c": {"n": 1}}));
        assert_eq!(
            insert_sql("activities", &row),
            "INSERT INTO `activities` (`a`, `b`) VALUES (?, ?)"
        );
    }

    #[test]
    fn test_bound_arguments_match_insert_placeholders() {
        let row = row(json!({
            "activityId": 14205347812u64,
            "activityName": "Lake Loop?",
            "distance": 8046.72,
            "hasPolyline": true,
            "description": null,
            "ownerId": u64::MAX,
            "splits": [1, 2]
        }));
        let insert = insert_sql("activities", &row);

        let mut query = bind_row(sqlx::query(&insert), &row);

        assert_eq!(query.sql(), insert);
        let arguments = query.take_arguments().unwrap().unwrap();
        assert_eq!(arguments.len(), row.len());
        assert_eq!(arguments.len(), insert.matches('?').count());
    }

    #[test]
    fn test_empty_table_name_is_rejected() {
        assert!(matches!(
            validate_table_name("  "),
            Err(PipelineError::Sink(_))
        ));
        assert!(validate_table_name("activities").is_ok());
    }
}
