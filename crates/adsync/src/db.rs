//! Database connection utilities.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

/// Pragmas applied to every file-backed SQLite connection.
///
/// - `journal_mode=WAL` lets the trigger server read while workers write
/// - `busy_timeout=5000` waits on lock contention instead of failing
/// - `synchronous=NORMAL` is safe with WAL
/// - `foreign_keys=ON` makes the hierarchy cascades effective
const SQLITE_PRAGMAS: [&str; 4] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA foreign_keys=ON",
];

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    for pragma in SQLITE_PRAGMAS {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            pragma.to_string(),
        ))
        .await?;
    }
    Ok(())
}

fn is_sqlite_file(database_url: &str) -> bool {
    database_url.starts_with("sqlite://")
}

/// Establish a connection to the database.
///
/// SQLite file databases get WAL mode, a busy timeout and foreign key
/// enforcement applied on connect.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    if is_sqlite_file(database_url) {
        configure_sqlite(&db).await?;
    }

    Ok(db)
}

/// Establish a connection and run all pending migrations.
///
/// # Example
/// ```ignore
/// let db = adsync::connect_and_migrate("sqlite://adsync.db?mode=rwc").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
