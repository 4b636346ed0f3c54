use guestgate::engine::{Engine, EngineConfig, IssuancePolicy};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // File-backed so concurrent tests share one database across pool connections
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Engine over the test database with a fixed policy and optional window override.
pub fn engine_for(db: &TestDb, policy: IssuancePolicy, window_minutes: Option<i64>) -> Engine {
    Engine::new(
        db.connection().clone(),
        EngineConfig {
            policy,
            active_window_minutes: window_minutes,
        },
    )
}

/// Seed the voucher pool
pub async fn seed_vouchers(db: &DatabaseConnection, codes: &[&str]) {
    let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    guestgate::storage::import_vouchers(db, &codes)
        .await
        .expect("Failed to import vouchers");
}
