use std::sync::Arc;

use adsync::insights::{InsightLevel, InsightsQuery, fetch_insights};
use adsync::repository;
use chrono::{Duration, NaiveDate, Utc};
use console::style;
use sea_orm::DatabaseConnection;
use serde_json::Value;

use crate::commands::shared::{CommandResult, OutputFormat, build_engine, parse_connection_id};
use crate::config::Config;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InsightsArgs {
    /// Connection id whose token is used
    connection: String,

    /// Object to report on (ad account, campaign, ad set or ad id)
    object_id: String,

    /// First day (YYYY-MM-DD); defaults to 30 days ago
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD); defaults to today
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Aggregation level: account, campaign, adset or ad
    #[arg(short, long)]
    level: Option<InsightLevel>,

    /// Comma-separated metric fields
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

/// Render rows as a table with one column per key seen in any row.
fn rows_table(rows: &[Value]) -> tabled::Table {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Some(object) = row.as_object() {
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut builder = tabled::builder::Builder::default();
    builder.push_record(columns.iter().cloned());
    for row in rows {
        builder.push_record(columns.iter().map(|column| match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }));
    }

    let mut table = builder.build();
    table.with(tabled::settings::Style::rounded());
    table
}

pub(crate) async fn handle_insights(
    args: InsightsArgs,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> CommandResult {
    let connection = repository::connection::get(db, parse_connection_id(&args.connection)?).await?;
    let engine = build_engine(config, db, None).await?;
    let client = engine.orchestrator.client_for(&connection)?;

    let today = Utc::now().date_naive();
    let query = InsightsQuery {
        object_id: args.object_id,
        level: args.level,
        fields: args.fields,
        from: args.from.unwrap_or(today - Duration::days(30)),
        to: args.to.unwrap_or(today),
    };
    let report = fetch_insights(&client, &query, today).await?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report.rows)?);
        }
        OutputFormat::Table => {
            for adjustment in &report.range.adjustments {
                eprintln!(
                    "{} {} moved from {} to {} ({})",
                    style("note:").yellow(),
                    adjustment.bound,
                    adjustment.original,
                    adjustment.adjusted,
                    adjustment.reason
                );
            }
            println!(
                "{} {} to {}, {} row(s)",
                style(&query.object_id).bold(),
                report.range.from,
                report.range.to,
                report.rows.len()
            );
            if !report.rows.is_empty() {
                println!("{}", rows_table(&report.rows));
            }
        }
    }
    Ok(())
}
