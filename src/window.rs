//! Resolution of the active window: how long a grant stays valid before the
//! device is issued a fresh credential.

use sea_orm::DatabaseConnection;

use crate::storage;

pub const DEFAULT_ACTIVE_WINDOW_MINUTES: u32 = 15;

/// Accepts only strictly positive values that fit in `u32`.
fn positive_minutes(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|m| *m > 0)
}

#[derive(Debug, Clone)]
pub struct ActiveWindow {
    override_minutes: Option<u32>,
}

impl ActiveWindow {
    /// `override_minutes` comes from settings/environment. Non-positive
    /// values are dropped with a warning.
    pub fn new(override_minutes: Option<i64>) -> Self {
        let override_minutes = match override_minutes {
            Some(raw) => {
                let valid = positive_minutes(raw);
                if valid.is_none() {
                    tracing::warn!(
                        value = raw,
                        "Ignoring active window override; expected a positive number of minutes"
                    );
                }
                valid
            }
            None => None,
        };
        Self { override_minutes }
    }

    pub fn override_minutes(&self) -> Option<u32> {
        self.override_minutes
    }

    /// Override, then persisted configuration, then the built-in default.
    /// A failed read of the configuration row degrades to the default.
    pub async fn resolve(&self, db: &DatabaseConnection) -> u32 {
        if let Some(minutes) = self.override_minutes {
            return minutes;
        }

        match storage::get_active_window_minutes(db).await {
            Ok(Some(raw)) => positive_minutes(raw).unwrap_or_else(|| {
                tracing::warn!(value = raw, "Persisted active window is not positive, using default");
                DEFAULT_ACTIVE_WINDOW_MINUTES
            }),
            Ok(None) => DEFAULT_ACTIVE_WINDOW_MINUTES,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read active window, using default");
                DEFAULT_ACTIVE_WINDOW_MINUTES
            }
        }
    }

    /// Writes the override into the configuration row at startup, or seeds
    /// the row with the default when absent.
    pub async fn reconcile(&self, db: &DatabaseConnection) -> Result<(), crate::errors::GateError> {
        match self.override_minutes {
            Some(minutes) => storage::set_active_window_minutes(db, i64::from(minutes)).await,
            None => storage::ensure_configuration(db, i64::from(DEFAULT_ACTIVE_WINDOW_MINUTES)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Database};
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    async fn test_db() -> (DatabaseConnection, NamedTempFile) {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());
        let db = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
        (db, temp_file)
    }

    #[test]
    fn test_override_validation() {
        assert_eq!(ActiveWindow::new(Some(30)).override_minutes(), Some(30));
        assert_eq!(ActiveWindow::new(Some(0)).override_minutes(), None);
        assert_eq!(ActiveWindow::new(Some(-5)).override_minutes(), None);
        assert_eq!(ActiveWindow::new(None).override_minutes(), None);
    }

    #[tokio::test]
    async fn test_resolve_precedence() {
        let (db, _file) = test_db().await;

        // Nothing persisted
        assert_eq!(ActiveWindow::new(None).resolve(&db).await, DEFAULT_ACTIVE_WINDOW_MINUTES);

        storage::set_active_window_minutes(&db, 45).await.unwrap();
        assert_eq!(ActiveWindow::new(None).resolve(&db).await, 45);

        // Override wins over the persisted row
        assert_eq!(ActiveWindow::new(Some(5)).resolve(&db).await, 5);

        // Non-positive persisted value falls back to the default
        storage::set_active_window_minutes(&db, 0).await.unwrap();
        assert_eq!(ActiveWindow::new(None).resolve(&db).await, DEFAULT_ACTIVE_WINDOW_MINUTES);
    }

    #[tokio::test]
    async fn test_resolve_degrades_on_read_failure() {
        let (db, _file) = test_db().await;
        db.execute_unprepared("DROP TABLE configurations")
            .await
            .unwrap();

        assert_eq!(ActiveWindow::new(None).resolve(&db).await, DEFAULT_ACTIVE_WINDOW_MINUTES);
    }

    #[tokio::test]
    async fn test_reconcile() {
        let (db, _file) = test_db().await;

        ActiveWindow::new(None).reconcile(&db).await.unwrap();
        assert_eq!(storage::get_active_window_minutes(&db).await.unwrap(), Some(15));

        ActiveWindow::new(Some(60)).reconcile(&db).await.unwrap();
        assert_eq!(storage::get_active_window_minutes(&db).await.unwrap(), Some(60));

        // Without an override an existing row is kept
        ActiveWindow::new(None).reconcile(&db).await.unwrap();
        assert_eq!(storage::get_active_window_minutes(&db).await.unwrap(), Some(60));
    }
}
