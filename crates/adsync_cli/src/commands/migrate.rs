use adsync::db;
use adsync::migration::{Migrator, MigratorTrait};
use clap::Subcommand;

use crate::commands::shared::{CommandResult, OutputFormat, print_rows};

#[derive(Subcommand)]
pub(crate) enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct MigrationRow {
    #[tabled(rename = "Migration")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub(crate) async fn handle_migrate(action: MigrateAction, database_url: &str) -> CommandResult {
    let db = db::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            let pending = Migrator::get_pending_migrations(&db).await?.len();
            println!("Applying {} pending migration(s)...", pending);
            Migrator::up(&db, None).await?;
            println!("Migrations applied successfully.");
        }
        MigrateAction::Down => {
            println!("Rolling back last migration...");
            Migrator::down(&db, Some(1)).await?;
            println!("Rollback complete.");
        }
        MigrateAction::Status { output } => {
            let rows = Migrator::get_migration_with_status(&db)
                .await?
                .into_iter()
                .map(|m| MigrationRow {
                    name: m.name().to_string(),
                    status: m.status().to_string(),
                })
                .collect();
            print_rows(rows, output)?;
        }
        MigrateAction::Fresh => {
            println!("Dropping all tables and reapplying migrations...");
            Migrator::fresh(&db).await?;
            println!("Fresh migration complete.");
        }
    }

    Ok(())
}
