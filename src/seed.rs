//! Startup bootstrap: configuration row, default login, voucher import.
//! Every step is idempotent and nothing existing is cleared.

use std::path::Path;

use sea_orm::DatabaseConnection;

use crate::engine::{Engine, IssuancePolicy};
use crate::errors::GateError;
use crate::storage;

/// Reads a voucher list: one code per line, blank lines ignored.
pub fn parse_voucher_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn import_voucher_file(db: &DatabaseConnection, path: &Path) -> Result<u64, GateError> {
    let contents = tokio::fs::read_to_string(path).await?;
    let codes = parse_voucher_list(&contents);
    if codes.is_empty() {
        tracing::warn!(path = %path.display(), "Voucher file contains no codes");
        return Ok(0);
    }

    let inserted = storage::import_vouchers(db, &codes).await?;
    tracing::info!(
        path = %path.display(),
        read = codes.len(),
        inserted,
        "Imported vouchers"
    );
    Ok(inserted)
}

/// Prepares the store for the engine's policy.
pub async fn bootstrap(engine: &Engine, voucher_file: Option<&Path>) -> Result<(), GateError> {
    let db = engine.db();

    engine.window().reconcile(db).await?;

    if let Some(path) = voucher_file {
        import_voucher_file(db, path).await?;
    }

    match engine.policy() {
        IssuancePolicy::DefaultLogin { username, password } => {
            if storage::get_or_create_default_login(db, username, password)
                .await?
                .is_none()
            {
                tracing::warn!(username = %username, "Default login exists but is inactive");
            }
        }
        IssuancePolicy::VoucherPool => {
            let available = storage::count_available_vouchers(db).await?;
            if available == 0 {
                tracing::warn!("Voucher pool is empty; every request will be refused");
            } else {
                tracing::info!(available, "Voucher pool ready");
            }
        }
        IssuancePolicy::NamedLogin => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voucher_list() {
        let codes = parse_voucher_list("ABC123\r\n\n  DEF456  \n\t\nGHI789");
        assert_eq!(codes, vec!["ABC123", "DEF456", "GHI789"]);
        assert!(parse_voucher_list("\n \n").is_empty());
    }
}
