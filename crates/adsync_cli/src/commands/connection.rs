//! Connection management: register, list and inspect connections.

use adsync::entity::connection::{Model as Connection, decode_last_synced};
use adsync::entity::sync_type::SyncType;
use adsync::repository::{self, NewConnection};
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use sea_orm::DatabaseConnection;

use crate::commands::shared::{CommandResult, OutputFormat, parse_connection_id, print_rows};

#[derive(Subcommand)]
pub(crate) enum ConnectionAction {
    /// Register a connection from an existing access token
    Add {
        /// Local user that owns the connection
        #[arg(short, long)]
        user: String,

        /// Human-readable label
        #[arg(short, long, default_value = "Default")]
        label: String,

        /// Access token (prefer the environment variable to keep it out of shell history)
        #[arg(long, env = "ADSYNC_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        /// Days until the token expires, if known
        #[arg(long)]
        expires_in_days: Option<i64>,
    },
    /// List connections
    List {
        /// Only connections of this user
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show one connection with stored counts and sync history
    Show {
        /// Connection id
        id: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct ConnectionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Token Expires")]
    expires: String,
    #[tabled(rename = "Last Synced")]
    last_synced: String,
}

impl ConnectionRow {
    fn from_model(connection: &Connection) -> Self {
        let last = decode_last_synced(&connection.last_synced)
            .values()
            .max()
            .copied();
        Self {
            id: connection.id.to_string(),
            user: connection.user_id.clone(),
            label: connection.label.clone(),
            expires: format_time(connection.token_expires_at.map(|t| t.with_timezone(&Utc))),
            last_synced: format_time(last),
        }
    }
}

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct LevelRow {
    #[tabled(rename = "Type")]
    sync_type: String,
    #[tabled(rename = "Stored")]
    stored: u64,
    #[tabled(rename = "Last Synced")]
    last_synced: String,
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub(crate) async fn handle_connection(action: ConnectionAction, db: &DatabaseConnection) -> CommandResult {
    match action {
        ConnectionAction::Add {
            user,
            label,
            token,
            expires_in_days,
        } => {
            let created = repository::connection::create(
                db,
                NewConnection {
                    user_id: user,
                    label,
                    access_token: token,
                    refresh_token: None,
                    token_expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
                },
            )
            .await?;
            println!("Created connection {}", created.id);
        }
        ConnectionAction::List { user, output } => {
            let connections = match user {
                Some(user) => repository::connection::list_for_user(db, &user).await?,
                None => repository::connection::list(db).await?,
            };
            let rows = connections.iter().map(ConnectionRow::from_model).collect();
            print_rows(rows, output)?;
        }
        ConnectionAction::Show { id, output } => {
            let connection = repository::connection::get(db, parse_connection_id(&id)?).await?;
            let counts = repository::hierarchy_counts(db, connection.id).await?;
            let last_synced = decode_last_synced(&connection.last_synced);

            if matches!(output, OutputFormat::Table) {
                print_rows(vec![ConnectionRow::from_model(&connection)], output)?;
            }
            let rows = SyncType::ALL
                .iter()
                .map(|&sync_type| LevelRow {
                    sync_type: sync_type.to_string(),
                    stored: counts.get(sync_type),
                    last_synced: format_time(last_synced.get(&sync_type).copied()),
                })
                .collect();
            print_rows(rows, output)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn row_shows_latest_sync_and_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let connection = Connection {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            label: "Main".to_string(),
            access_token: "tok".to_string(),
            refresh_token: None,
            token_expires_at: Some(now.fixed_offset()),
            token_renewed_at: None,
            last_synced: json!({
                "ad_accounts": "2026-10-18T08:00:00Z",
                "ads": "2026-10-19T09:30:00Z",
            }),
            created_at: now.fixed_offset(),
            updated_at: now.fixed_offset(),
        };

        let row = ConnectionRow::from_model(&connection);
        assert_eq!(row.expires, "2026-10-19 12:00:00 UTC");
        assert_eq!(row.last_synced, "2026-10-19 09:30:00 UTC");
    }

    #[test]
    fn missing_times_render_as_dash() {
        assert_eq!(format_time(None), "-");
    }
}
